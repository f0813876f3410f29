// pipeflow/src/pipeline/fork.rs

//! The fork executor: runs a nested stage list once per incoming frame and
//! reduces everything it emits into a single value.

use crate::core::context::RunContext;
use crate::core::frame::Frame;
use crate::core::stage::{Runnable, Stage};
use crate::core::stream::Stream;
use crate::error::{PipeError, PipeResult};
use crate::pipeline::execution::run;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{event, Level};

/// Runs `stages` as a private pipeline for every frame read.
///
/// The values a nested run emits are written downstream as one array, derived
/// from the frame that started the run. A run that emits nothing writes nothing.
pub struct ForkStage {
  stages: Vec<Runnable>,
}

impl ForkStage {
  pub fn new(stages: Vec<Runnable>) -> Self {
    Self { stages }
  }

  pub fn stages(&self) -> &[Runnable] {
    &self.stages
  }
}

#[async_trait]
impl Stage for ForkStage {
  async fn run(&self, ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;

      let mut modules = Vec::with_capacity(self.stages.len() + 2);
      modules.push(Runnable::new(FrameSource {
        frame: Arc::clone(&frame),
      }));
      modules.extend(self.stages.iter().cloned());
      modules.push(Runnable::new(BufferSink {
        to: stream.with(Arc::clone(&frame)),
      }));

      event!(Level::DEBUG, frame = %frame, "Running fork.");
      run(ctx, modules).await.map_err(PipeError::Run)?;

      if stream.downstream_closed() {
        return Err(PipeError::EndOfData);
      }
    }
  }

  fn name(&self) -> &str {
    "fork"
  }
}

/// Emits exactly one object: the object of the frame that started the fork.
struct FrameSource {
  frame: Arc<Frame>,
}

#[async_trait]
impl Stage for FrameSource {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    stream
      .with(Arc::clone(&self.frame))
      .write_shared(self.frame.shared_object())
      .await
  }

  fn name(&self) -> &str {
    "fork.source"
  }
}

/// Collects everything the nested pipeline emits and writes it to `to` as one array.
struct BufferSink {
  to: Stream,
}

#[async_trait]
impl Stage for BufferSink {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let mut values = Vec::new();
    loop {
      match stream.read().await {
        Ok(frame) => values.push(frame.object().clone()),
        Err(PipeError::EndOfData) => break,
        Err(e) => return Err(e),
      }
    }
    if values.is_empty() {
      event!(Level::DEBUG, "Fork produced no output.");
      return Ok(());
    }
    self.to.write(Value::Array(values)).await
  }

  fn name(&self) -> &str {
    "fork.collect"
  }
}
