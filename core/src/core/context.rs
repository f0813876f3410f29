// pipeflow/src/core/context.rs

//! Defines the `RunContext` handed to every stage and the `ResourceScope`
//! stages use to register cleanup that must outlive the run.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{event, Level};

/// A cleanup function executed when a `ResourceScope` is released.
pub type Deferred = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Explicit registry of deferred cleanup (temporary files and the like).
///
/// Released once, typically at process shutdown, after every run using it is done.
#[derive(Default)]
pub struct ResourceScope {
  deferred: Mutex<Vec<Deferred>>,
}

impl ResourceScope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `f` to run on `release`.
  pub fn defer(&self, f: impl FnOnce() -> anyhow::Result<()> + Send + 'static) {
    self.deferred.lock().push(Box::new(f));
  }

  pub fn pending(&self) -> usize {
    self.deferred.lock().len()
  }

  /// Runs every deferred function in registration order.
  ///
  /// All functions run even if some fail; failures are reported together.
  pub fn release(&self) -> anyhow::Result<()> {
    let deferred = std::mem::take(&mut *self.deferred.lock());
    let mut failures = Vec::new();
    for f in deferred {
      if let Err(e) = f() {
        event!(Level::WARN, error = %e, "Deferred cleanup failed.");
        failures.push(e.to_string());
      }
    }
    if failures.is_empty() {
      return Ok(());
    }
    Err(anyhow::anyhow!(
      "{} deferred cleanup(s) failed: {}",
      failures.len(),
      failures.join("; ")
    ))
  }
}

impl fmt::Debug for ResourceScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceScope")
      .field("pending", &self.pending())
      .finish()
  }
}

/// Cancellation and shared resources for one pipeline run.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
  cancel: CancellationToken,
  scope: Arc<ResourceScope>,
}

impl RunContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_scope(scope: Arc<ResourceScope>) -> Self {
    Self {
      cancel: CancellationToken::new(),
      scope,
    }
  }

  pub fn with_cancellation_token(cancel: CancellationToken, scope: Arc<ResourceScope>) -> Self {
    Self { cancel, scope }
  }

  /// A context cancelled together with this one, sharing the same scope.
  pub fn child(&self) -> RunContext {
    Self {
      cancel: self.cancel.child_token(),
      scope: Arc::clone(&self.scope),
    }
  }

  pub fn cancellation_token(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn scope(&self) -> &Arc<ResourceScope> {
    &self.scope
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  pub async fn cancelled(&self) {
    self.cancel.cancelled().await
  }
}
