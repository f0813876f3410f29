// pipeflow/src/stages/render.rs

use crate::args::Args;
use crate::core::context::RunContext;
use crate::core::stage::Stage;
use crate::core::stream::Stream;
use crate::error::PipeResult;
use crate::template::Template;
use async_trait::async_trait;

/// Writes a template rendered against each frame's context.
#[derive(Debug, Clone)]
pub struct RenderStage {
  template: Template,
}

impl RenderStage {
  pub fn new(template: Template) -> Self {
    Self { template }
  }

  /// The words of the arguments, joined by single spaces, are the template.
  pub fn from_args(args: &Args) -> anyhow::Result<Self> {
    args.required(0, "template")?;
    let template = Template::parse(&args.words().join(" "))?;
    Ok(Self::new(template))
  }
}

#[async_trait]
impl Stage for RenderStage {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      let text = self.template.render(frame.context());
      stream.write(text).await?;
    }
  }

  fn name(&self) -> &str {
    "render"
  }
}
