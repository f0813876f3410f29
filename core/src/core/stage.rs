// pipeflow/src/core/stage.rs

//! Defines the `Stage` contract and the `Runnable` unit the orchestrator schedules.

use crate::core::context::RunContext;
use crate::core::frame::Tag;
use crate::core::stream::Stream;
use crate::error::PipeResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// A unit of pipeline work.
///
/// `run` reads from and writes to `stream` until it is done. Returning
/// `Err(PipeError::EndOfData)` (typically by propagating a read or write with `?`)
/// is a normal way to stop. Any other error fails the run and cancels the
/// remaining stages cooperatively.
#[async_trait]
pub trait Stage: Send + Sync {
  async fn run(&self, ctx: &RunContext, stream: &mut Stream) -> PipeResult<()>;

  /// Identity used in logs and failure reports.
  fn name(&self) -> &str {
    std::any::type_name::<Self>()
  }
}

/// A stage paired with the tag its output is written under.
#[derive(Clone)]
pub struct Runnable {
  pub stage: Arc<dyn Stage>,
  pub tag: Option<Tag>,
}

impl Runnable {
  pub fn new(stage: impl Stage + 'static) -> Self {
    Self::from_arc(Arc::new(stage))
  }

  pub fn from_arc(stage: Arc<dyn Stage>) -> Self {
    Self { stage, tag: None }
  }

  pub fn tagged(mut self, tag: Option<Tag>) -> Self {
    self.tag = tag;
    self
  }
}

impl fmt::Display for Runnable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.stage.name())?;
    if let Some(tag) = &self.tag {
      write!(f, " as {}", tag)?;
    }
    Ok(())
  }
}

impl fmt::Debug for Runnable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Runnable")
      .field("stage", &self.stage.name())
      .field("tag", &self.tag)
      .finish()
  }
}
