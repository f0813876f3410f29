// pipeflow/src/stages/json.rs

use crate::args::Args;
use crate::core::context::RunContext;
use crate::core::stage::Stage;
use crate::core::stream::Stream;
use crate::error::PipeResult;
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{Deserializer, Value};

/// Parses string values as a sequence of JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecodeStage;

impl JsonDecodeStage {
  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    args.expect_at_most(0)?;
    Ok(Self)
  }
}

#[async_trait]
impl Stage for JsonDecodeStage {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      let Value::String(text) = frame.object() else {
        stream.write_shared(frame.shared_object()).await?;
        continue;
      };

      let mut decoded = 0usize;
      for document in Deserializer::from_str(text).into_iter::<Value>() {
        stream.write(document?).await?;
        decoded += 1;
      }
      if decoded == 0 {
        return Err(anyhow!("json: no data in stream").into());
      }
    }
  }

  fn name(&self) -> &str {
    "json.decode"
  }
}

/// Writes every value as compact JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncodeStage;

impl JsonEncodeStage {
  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    args.expect_at_most(0)?;
    Ok(Self)
  }
}

#[async_trait]
impl Stage for JsonEncodeStage {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      let encoded = serde_json::to_string(frame.object())?;
      stream.write(encoded).await?;
    }
  }

  fn name(&self) -> &str {
    "json.encode"
  }
}
