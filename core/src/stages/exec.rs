// pipeflow/src/stages/exec.rs

//! Runs an external command once per value.

use crate::args::Args;
use crate::core::context::RunContext;
use crate::core::frame::Frame;
use crate::core::stage::Stage;
use crate::core::stream::Stream;
use crate::error::{PipeError, PipeResult};
use crate::registry::StageDefinition;
use crate::template::Template;
use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{event, Level};

pub(crate) fn definition() -> StageDefinition {
  StageDefinition::new(
    "exec",
    "exec COMMAND [ARGS...]\nRuns COMMAND for each value with the value's text on stdin and writes its stdout.\nARGS are rendered against the value's context first. Unknown stage names run as commands.",
    ExecStage::from_args,
  )
}

pub struct ExecStage {
  program: String,
  args: Template,
}

impl ExecStage {
  pub fn new(program: &str, args: Template) -> Self {
    Self {
      program: program.to_string(),
      args,
    }
  }

  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    let program = args.required(0, "command")?;
    let template = Template::parse(args.rest(1))?;
    Ok(Self::new(program, template))
  }

  async fn exec_frame(&self, ctx: &RunContext, frame: &Frame) -> PipeResult<String> {
    let rendered = self.args.render(frame.context());
    let args = Args::parse(&rendered)?;
    event!(Level::DEBUG, program = %self.program, args = ?args.words(), "exec");

    let mut child = Command::new(&self.program)
      .args(args.words())
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .kill_on_drop(true)
      .spawn()
      .with_context(|| format!("start {:?}", self.program))?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let input = frame.as_text();

    let feed = async move {
      let Some(mut stdin) = stdin else {
        return Ok(());
      };
      match stdin.write_all(input.as_bytes()).await {
        // The command does not have to read its input.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        result => result,
      }
    };
    let collect = async move {
      let mut output = Vec::new();
      if let Some(mut stdout) = stdout {
        stdout.read_to_end(&mut output).await?;
      }
      Ok::<_, std::io::Error>(output)
    };
    let work = async {
      let (fed, output) = tokio::join!(feed, collect);
      fed?;
      let output = output?;
      let status = child.wait().await?;
      Ok::<_, std::io::Error>((status, output))
    };

    let (status, output) = tokio::select! {
      finished = work => finished?,
      // Dropping the child kills it.
      _ = ctx.cancelled() => return Err(PipeError::Cancelled),
    };

    if !status.success() {
      return Err(anyhow!("{} exited with {}", self.program, status).into());
    }
    PipeError::utf8(&self.program, output)
  }
}

#[async_trait]
impl Stage for ExecStage {
  async fn run(&self, ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      let output = self.exec_frame(ctx, &frame).await?;
      stream.write(output).await?;
    }
  }

  fn name(&self) -> &str {
    &self.program
  }
}
