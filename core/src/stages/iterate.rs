// pipeflow/src/stages/iterate.rs

//! Stages that reshape the sequence of values rather than the values themselves.

use crate::args::Args;
use crate::core::context::RunContext;
use crate::core::stage::Stage;
use crate::core::stream::Stream;
use crate::error::PipeResult;
use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{event, Level};

fn count_arg(args: &Args, stage: &str) -> anyhow::Result<u64> {
  args.expect_at_most(1)?;
  let n = args.int(0, "count")?;
  if n < 0 {
    bail!("{}: count must not be negative (given {})", stage, n);
  }
  Ok(n as u64)
}

/// Writes array items one by one.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlattenStage;

impl FlattenStage {
  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    args.expect_at_most(0)?;
    Ok(Self)
  }
}

#[async_trait]
impl Stage for FlattenStage {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      match frame.object() {
        Value::Array(items) => {
          for item in items {
            stream.write(item.clone()).await?;
          }
        }
        _ => stream.write_shared(frame.shared_object()).await?,
      }
    }
  }

  fn name(&self) -> &str {
    "flatten"
  }
}

#[derive(Debug, Clone, Copy)]
pub struct LimitStage {
  count: u64,
}

impl LimitStage {
  pub fn new(count: u64) -> Self {
    Self { count }
  }

  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    Ok(Self::new(count_arg(args, "limit")?))
  }
}

#[async_trait]
impl Stage for LimitStage {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    for _ in 0..self.count {
      let frame = stream.read().await?;
      stream.write_shared(frame.shared_object()).await?;
    }
    // Returning closes the stream, so upstream sees end-of-data on its next write.
    event!(Level::DEBUG, count = self.count, "Limit reached.");
    Ok(())
  }

  fn name(&self) -> &str {
    "limit"
  }
}

#[derive(Debug, Clone, Copy)]
pub struct SkipStage {
  count: u64,
}

impl SkipStage {
  pub fn new(count: u64) -> Self {
    Self { count }
  }

  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    Ok(Self::new(count_arg(args, "skip")?))
  }
}

#[async_trait]
impl Stage for SkipStage {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let mut seen = 0u64;
    loop {
      let frame = stream.read().await?;
      seen += 1;
      if seen <= self.count {
        continue;
      }
      stream.write_shared(frame.shared_object()).await?;
    }
  }

  fn name(&self) -> &str {
    "skip"
  }
}
