// pipeflow/src/stages/io.rs

//! Sources and sinks used at the ends of a pipeline.

use crate::core::context::RunContext;
use crate::core::frame::Frame;
use crate::core::stage::Stage;
use crate::core::stream::Stream;
use crate::error::{PipeError, PipeResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{event, Level};

/// Reads `reader` to the end as UTF-8 text.
pub(crate) async fn read_text(origin: &str, mut reader: impl AsyncRead + Unpin) -> PipeResult<String> {
  let mut bytes = Vec::new();
  reader.read_to_end(&mut bytes).await?;
  event!(Level::DEBUG, origin, bytes = bytes.len(), "Read input.");
  PipeError::utf8(origin, bytes)
}

/// Reads all of standard input and writes it as a single string value.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinSource;

#[async_trait]
impl Stage for StdinSource {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let input = read_text("standard input", tokio::io::stdin()).await?;
    stream.write(input).await
  }

  fn name(&self) -> &str {
    "stdin"
  }
}

/// Writes the text of every value to a writer, each followed by a newline.
pub struct EchoSink {
  writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl EchoSink {
  pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
    Self {
      writer: tokio::sync::Mutex::new(Box::new(writer)),
    }
  }

  pub fn stdout() -> Self {
    Self::new(tokio::io::stdout())
  }
}

#[async_trait]
impl Stage for EchoSink {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let mut writer = self.writer.lock().await;
    loop {
      let frame = stream.read().await?;
      let mut line = frame.as_text();
      line.push('\n');
      writer.write_all(line.as_bytes()).await?;
      writer.flush().await?;
    }
  }

  fn name(&self) -> &str {
    "echo"
  }
}

/// Writes a fixed list of values.
#[derive(Debug, Clone, Default)]
pub struct ValuesSource {
  values: Vec<Value>,
}

impl ValuesSource {
  pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
    Self {
      values: values.into_iter().collect(),
    }
  }
}

#[async_trait]
impl Stage for ValuesSource {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    for value in &self.values {
      stream.write(value.clone()).await?;
    }
    Ok(())
  }

  fn name(&self) -> &str {
    "values"
  }
}

/// Collects every frame it reads into memory shared by all clones.
#[derive(Debug, Clone, Default)]
pub struct CollectSink {
  frames: Arc<Mutex<Vec<Arc<Frame>>>>,
}

impl CollectSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn values(&self) -> Vec<Value> {
    self.frames.lock().iter().map(|f| f.object().clone()).collect()
  }

  pub fn frames(&self) -> Vec<Arc<Frame>> {
    self.frames.lock().clone()
  }

  pub fn len(&self) -> usize {
    self.frames.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.lock().is_empty()
  }
}

#[async_trait]
impl Stage for CollectSink {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      match stream.read().await {
        Ok(frame) => self.frames.lock().push(frame),
        Err(PipeError::EndOfData) => return Ok(()),
        Err(e) => return Err(e),
      }
    }
  }

  fn name(&self) -> &str {
    "collect"
  }
}
