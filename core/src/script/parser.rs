// pipeflow/src/script/parser.rs

//! Turns scanned invocations into runnables by resolving stage names against a `Registry`.

use super::{scanner, Invocation};
use crate::args::Args;
use crate::core::stage::{Runnable, Stage};
use crate::error::{PipeError, PipeResult};
use crate::pipeline::fork::ForkStage;
use crate::registry::Registry;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Scans `source` and resolves every invocation in it.
///
/// Parse and resolution errors are returned before any stage exists.
#[instrument(name = "script::compile", skip_all, fields(source_len = source.len()))]
pub fn compile(source: &str, registry: &Registry) -> PipeResult<Vec<Runnable>> {
  let invocations = scanner::parse(source)?;
  let runnables = materialize(&invocations, registry)?;
  event!(Level::DEBUG, "Compiled {} runnables.", runnables.len());
  Ok(runnables)
}

/// Resolves a list of invocations, fork groups included, into runnables.
pub fn materialize(invocations: &[Invocation], registry: &Registry) -> PipeResult<Vec<Runnable>> {
  invocations
    .iter()
    .map(|inv| match &inv.fork {
      Some(group) => {
        let stages = materialize(group, registry)?;
        Ok(Runnable::new(ForkStage::new(stages)).tagged(inv.tag.clone()))
      }
      None => {
        let stage = make_stage(inv.position, &inv.name, &inv.args, registry)?;
        Ok(Runnable::from_arc(stage).tagged(inv.tag.clone()))
      }
    })
    .collect()
}

/// Builds the stage named `name`.
///
/// Unknown names go to the registry's fallback (exec) with the whole `name args`
/// text as its arguments.
pub fn make_stage(position: usize, name: &str, args: &str, registry: &Registry) -> PipeResult<Arc<dyn Stage>> {
  let resolution = |source: anyhow::Error| PipeError::Resolution {
    position,
    name: name.to_string(),
    args: args.to_string(),
    source,
  };

  let (definition, text) = match registry.get(name) {
    Some(definition) => (definition, args.to_string()),
    None => {
      event!(Level::DEBUG, %name, fallback = registry.fallback().name.as_str(), "Unknown stage, using fallback.");
      let text = match args.is_empty() {
        true => name.to_string(),
        false => format!("{} {}", name, args),
      };
      (registry.fallback().clone(), text)
    }
  };

  let parsed = Args::parse(&text).map_err(|e| resolution(e.into()))?;
  (definition.constructor)(&parsed).map_err(resolution)
}
