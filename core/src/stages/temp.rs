// pipeflow/src/stages/temp.rs

use crate::args::Args;
use crate::core::context::RunContext;
use crate::core::stage::Stage;
use crate::core::stream::Stream;
use crate::error::PipeResult;
use anyhow::Context as _;
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tracing::{event, Level};

const TEMP_PREFIX: &str = "pipeflow-";

/// Spills every value into a temporary file and writes the file's path.
///
/// Files outlive the run; they are removed when the run's `ResourceScope` is released.
#[derive(Debug, Default, Clone, Copy)]
pub struct TempStage;

impl TempStage {
  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    args.expect_at_most(0)?;
    Ok(Self)
  }
}

fn spill(text: &str) -> anyhow::Result<PathBuf> {
  let mut file = tempfile::Builder::new()
    .prefix(TEMP_PREFIX)
    .tempfile()
    .context("create temporary file")?;
  file.write_all(text.as_bytes())?;
  file.flush()?;
  let (_, path) = file.keep().context("keep temporary file")?;
  Ok(path)
}

#[async_trait]
impl Stage for TempStage {
  async fn run(&self, ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      let path = spill(&frame.as_text())?;
      event!(Level::DEBUG, path = %path.display(), "Created temporary file.");

      let cleanup = path.clone();
      ctx.scope().defer(move || {
        std::fs::remove_file(&cleanup).with_context(|| format!("remove {}", cleanup.display()))
      });
      stream.write(path.to_string_lossy().into_owned()).await?;
    }
  }

  fn name(&self) -> &str {
    "temp"
  }
}
