// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeflow::stages::CollectSink;
use pipeflow::{run, PipeError, PipeResult, RunContext, RunErrors, Runnable, Stage, Stream};
use serde_json::Value;
use std::pin::Pin;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tracing::Level;

// --- Common Test Stages ---

/// Writes 0, 1, 2, ... up to `limit` (exclusive), remembering how it stopped.
#[derive(Clone, Default)]
pub struct CountingSource {
  pub limit: Option<u64>,
  pub written: Arc<AtomicUsize>,
  pub stopped_with: Arc<Mutex<Option<String>>>,
}

impl CountingSource {
  pub fn endless() -> Self {
    Self::default()
  }

  pub fn up_to(limit: u64) -> Self {
    Self {
      limit: Some(limit),
      ..Self::default()
    }
  }

  pub fn written(&self) -> usize {
    self.written.load(Ordering::SeqCst)
  }

  pub fn stopped_with(&self) -> Option<String> {
    self.stopped_with.lock().clone()
  }
}

#[async_trait]
impl Stage for CountingSource {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let mut i = 0u64;
    loop {
      if self.limit.map_or(false, |limit| i >= limit) {
        return Ok(());
      }
      if let Err(e) = stream.write(i).await {
        *self.stopped_with.lock() = Some(format!("{:?}", e));
        return Err(e);
      }
      self.written.fetch_add(1, Ordering::SeqCst);
      i += 1;
    }
  }

  fn name(&self) -> &str {
    "counting"
  }
}

/// Reads and writes every value unchanged.
#[derive(Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl Stage for PassThrough {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      stream.write_shared(frame.shared_object()).await?;
    }
  }

  fn name(&self) -> &str {
    "passthrough"
  }
}

/// A pass-through that remembers how it stopped.
#[derive(Clone, Default)]
pub struct ObservedPassThrough {
  pub stopped_with: Arc<Mutex<Option<String>>>,
}

impl ObservedPassThrough {
  pub fn stopped_with(&self) -> Option<String> {
    self.stopped_with.lock().clone()
  }

  async fn forward(&self, stream: &mut Stream) -> PipeResult<()> {
    loop {
      let frame = stream.read().await?;
      stream.write_shared(frame.shared_object()).await?;
    }
  }
}

#[async_trait]
impl Stage for ObservedPassThrough {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let result = self.forward(stream).await;
    if let Err(e) = &result {
      *self.stopped_with.lock() = Some(format!("{:?}", e));
    }
    result
  }

  fn name(&self) -> &str {
    "observed"
  }
}

/// Waits `delay` before reading anything, then passes values through.
#[derive(Clone, Copy)]
pub struct SlowStart {
  pub delay: Duration,
}

#[async_trait]
impl Stage for SlowStart {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    tokio::time::sleep(self.delay).await;
    loop {
      let frame = stream.read().await?;
      stream.write_shared(frame.shared_object()).await?;
    }
  }

  fn name(&self) -> &str {
    "slow_start"
  }
}

/// Fails immediately with `message`.
#[derive(Clone)]
pub struct FailingStage {
  pub message: &'static str,
}

#[async_trait]
impl Stage for FailingStage {
  async fn run(&self, _ctx: &RunContext, _stream: &mut Stream) -> PipeResult<()> {
    tracing::warn!(target: "test_stages", "failing with: '{}'", self.message);
    Err(anyhow::anyhow!(self.message).into())
  }

  fn name(&self) -> &str {
    "failing"
  }
}

/// Panics after reading its first value.
#[derive(Clone, Copy)]
pub struct PanickingStage;

#[async_trait]
impl Stage for PanickingStage {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let _ = stream.read().await?;
    panic!("stage blew up");
  }

  fn name(&self) -> &str {
    "panicking"
  }
}

/// Reads one value, then returns without reading any more.
#[derive(Clone, Default)]
pub struct TakeOne {
  pub taken: Arc<Mutex<Option<Value>>>,
}

#[async_trait]
impl Stage for TakeOne {
  async fn run(&self, _ctx: &RunContext, stream: &mut Stream) -> PipeResult<()> {
    let frame = stream.read().await?;
    *self.taken.lock() = Some(frame.object().clone());
    Ok(())
  }

  fn name(&self) -> &str {
    "take_one"
  }
}

/// Never reads; waits for the run to be cancelled.
#[derive(Clone, Default)]
pub struct WaitForCancel {
  pub cancelled: Arc<AtomicUsize>,
}

#[async_trait]
impl Stage for WaitForCancel {
  async fn run(&self, ctx: &RunContext, _stream: &mut Stream) -> PipeResult<()> {
    ctx.cancelled().await;
    self.cancelled.fetch_add(1, Ordering::SeqCst);
    Err(PipeError::Cancelled)
  }

  fn name(&self) -> &str {
    "wait_for_cancel"
  }
}

/// An `AsyncWrite` into memory shared with the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.0.lock()).into_owned()
  }
}

impl AsyncWrite for SharedBuffer {
  fn poll_write(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
    self.0.lock().extend_from_slice(buf);
    Poll::Ready(Ok(buf.len()))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
    Poll::Ready(Ok(()))
  }
}

// --- Helpers ---

pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs `modules` followed by a collecting sink, failing the test on a hang.
pub async fn run_collect(modules: Vec<Runnable>) -> (Result<(), RunErrors>, Vec<Value>) {
  let sink = CollectSink::new();
  let mut all = modules;
  all.push(Runnable::new(sink.clone()));
  let ctx = RunContext::new();
  let result = tokio::time::timeout(RUN_TIMEOUT, run(&ctx, all))
    .await
    .expect("pipeline did not finish in time");
  (result, sink.values())
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
