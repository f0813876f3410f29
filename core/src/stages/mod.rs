// pipeflow/src/stages/mod.rs

//! The builtin stage library.

pub mod exec;
pub mod io;
pub mod iterate;
pub mod json;
pub mod render;
pub mod temp;

use crate::registry::{Registry, StageDefinition};
use tracing::{event, Level};

pub use exec::ExecStage;
pub use io::{CollectSink, EchoSink, StdinSource, ValuesSource};
pub use iterate::{FlattenStage, LimitStage, SkipStage};
pub use json::{JsonDecodeStage, JsonEncodeStage};
pub use render::RenderStage;
pub use temp::TempStage;

fn definitions() -> Vec<StageDefinition> {
  vec![
    exec::definition(),
    StageDefinition::new(
      "json.decode",
      "Decodes string values as one or more JSON documents, writing each.\nOther values pass through.",
      JsonDecodeStage::from_args,
    ),
    StageDefinition::new(
      "json.encode",
      "Encodes each value as compact JSON text.",
      JsonEncodeStage::from_args,
    ),
    StageDefinition::new(
      "flatten",
      "Writes the items of array values one by one. Other values pass through.",
      FlattenStage::from_args,
    ),
    StageDefinition::new("limit", "limit N\nForwards the first N values, then stops.", LimitStage::from_args),
    StageDefinition::new("skip", "skip N\nDrops the first N values.", SkipStage::from_args),
    StageDefinition::new(
      "render",
      "render TEMPLATE\nWrites TEMPLATE rendered against each value's context, e.g. {{self.name}}.",
      RenderStage::from_args,
    ),
    StageDefinition::new(
      "temp",
      "Writes each value to a temporary file and emits the file's path.\nFiles are removed when the run's resources are released.",
      TempStage::from_args,
    ),
  ]
}

const ALIASES: &[(&str, &str)] = &[("decode", "json.decode"), ("encode", "json.encode")];

/// Defines every builtin stage and alias in `registry`.
pub fn install(registry: &Registry) {
  for definition in definitions() {
    registry.define(definition);
  }
  for (alias, target) in ALIASES {
    // Targets are all defined above.
    if let Err(e) = registry.alias(alias, target) {
      event!(Level::ERROR, %alias, error = %e, "Failed to alias builtin stage.");
    }
  }
  event!(Level::DEBUG, "Installed {} builtin stages.", registry.len());
}
