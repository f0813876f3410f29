// pipeflow/src/registry.rs

//! Defines the `Registry`, a name-keyed table of stage constructors used to
//! resolve script invocations into stages.

use crate::args::Args;
use crate::core::stage::Stage;
use crate::error::{PipeError, PipeResult};
use crate::stages;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{event, Level};

/// Builds a stage from its parsed arguments.
pub type StageConstructor = Arc<dyn Fn(&Args) -> anyhow::Result<Arc<dyn Stage>> + Send + Sync>;

/// A named, documented stage constructor.
#[derive(Clone)]
pub struct StageDefinition {
  pub name: String,
  pub description: String,
  pub constructor: StageConstructor,
}

impl StageDefinition {
  pub fn new<S, F>(name: &str, description: &str, constructor: F) -> Self
  where
    S: Stage + 'static,
    F: Fn(&Args) -> anyhow::Result<S> + Send + Sync + 'static,
  {
    Self {
      name: name.to_string(),
      description: description.to_string(),
      constructor: Arc::new(move |args: &Args| -> anyhow::Result<Arc<dyn Stage>> {
        let stage = constructor(args)?;
        Ok(Arc::new(stage) as Arc<dyn Stage>)
      }),
    }
  }

  /// Formatted help text: the name, then the indented description.
  pub fn help(&self) -> String {
    let mut help = self.name.clone();
    for line in self.description.lines() {
      help.push_str("\n\t");
      help.push_str(line);
    }
    help
  }
}

impl fmt::Debug for StageDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StageDefinition")
      .field("name", &self.name)
      .field("description", &self.description)
      .finish_non_exhaustive()
  }
}

/// The stage table. Unknown names resolve to the fallback definition.
pub struct Registry {
  stages: RwLock<HashMap<String, StageDefinition>>,
  fallback: StageDefinition,
}

impl Registry {
  /// An empty registry whose fallback is the exec stage.
  pub fn new() -> Self {
    Self::with_fallback(stages::exec::definition())
  }

  pub fn with_fallback(fallback: StageDefinition) -> Self {
    Self {
      stages: RwLock::new(HashMap::new()),
      fallback,
    }
  }

  /// A registry holding every builtin stage.
  pub fn builtin() -> Self {
    let registry = Self::new();
    stages::install(&registry);
    registry
  }

  /// Adds `definition`, replacing any stage already defined under its name.
  pub fn define(&self, definition: StageDefinition) {
    event!(Level::DEBUG, name = %definition.name, "Defining stage.");
    let previous = self.stages.write().insert(definition.name.clone(), definition);
    if let Some(previous) = previous {
      event!(Level::WARN, name = %previous.name, "Stage definition replaced.");
    }
  }

  /// Makes `alias` resolve to the stage currently defined as `target`.
  pub fn alias(&self, alias: &str, target: &str) -> PipeResult<()> {
    let mut stages = self.stages.write();
    let definition = stages
      .get(target)
      .cloned()
      .ok_or_else(|| PipeError::UnknownStage {
        name: target.to_string(),
      })?;
    event!(Level::DEBUG, %alias, %target, "Aliasing stage.");
    stages.insert(
      alias.to_string(),
      StageDefinition {
        name: alias.to_string(),
        description: format!("Alias for `{}`.", target),
        constructor: definition.constructor,
      },
    );
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<StageDefinition> {
    self.stages.read().get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.stages.read().contains_key(name)
  }

  pub fn fallback(&self) -> &StageDefinition {
    &self.fallback
  }

  /// All definitions ordered by name.
  pub fn sorted(&self) -> Vec<StageDefinition> {
    let mut all: Vec<_> = self.stages.read().values().cloned().collect();
    all.sort_by(|a, b| a.name.cmp(&b.name));
    all
  }

  pub fn help(&self, name: &str) -> PipeResult<String> {
    self
      .get(name)
      .map(|definition| definition.help())
      .ok_or_else(|| PipeError::UnknownStage { name: name.to_string() })
  }

  pub fn len(&self) -> usize {
    self.stages.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.stages.read().is_empty()
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Registry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<_> = self.stages.read().keys().cloned().collect();
    names.sort();
    f.debug_struct("Registry")
      .field("stages", &names)
      .field("fallback", &self.fallback.name)
      .finish()
  }
}
