// pipeflow/src/core/stream.rs

//! Defines `Stream`, the handoff between one stage's output and the next stage's input.
//!
//! Stage *i* reads from stream *i* and writes into the input of stream *i+1*.
//! Shutdown is signaled independently in both directions:
//!  - the input of a stream is closed by the stage above it when that stage returns,
//!    so reads take a frame still pending and then report end-of-data;
//!  - the `ok` signal of a stream is closed by the stage below it when that stage
//!    returns, so the next write reports end-of-data instead of blocking.
//!
//! A write completes only once the reader has taken the frame. Frames whose writer
//! gave up before that happened are skipped by the reader.

use crate::core::frame::{Frame, Tag};
use crate::error::{PipeError, PipeResult};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{event, Level};

static STREAM_IDS: AtomicU64 = AtomicU64::new(0);

fn next_stream_id() -> u64 {
  STREAM_IDS.fetch_add(1, Ordering::Relaxed) + 1
}

/// A frame in flight, acknowledged by the reader that takes it.
struct Handoff {
  frame: Arc<Frame>,
  taken: oneshot::Sender<()>,
}

impl Handoff {
  /// Acknowledges the frame; `None` when its writer already gave up.
  fn take(self) -> Option<Arc<Frame>> {
    self.taken.send(()).ok().map(|_| self.frame)
  }
}

/// Input side of a stream: a single-slot channel plus its closed signal.
pub(crate) struct Inlet {
  tx: mpsc::Sender<Handoff>,
  rx: Mutex<mpsc::Receiver<Handoff>>,
  closed: CancellationToken,
}

impl Inlet {
  fn new() -> Arc<Self> {
    let (tx, rx) = mpsc::channel(1);
    Arc::new(Self {
      tx,
      rx: Mutex::new(rx),
      closed: CancellationToken::new(),
    })
  }

  pub(crate) fn close(&self) {
    self.closed.cancel();
  }
}

pub struct Stream {
  id: u64,
  tag: Option<Tag>,
  cancel: CancellationToken,
  // Parent for the next write.
  last: Option<Arc<Frame>>,

  inlet: Arc<Inlet>,
  down: Option<Arc<Inlet>>,
  // Closed by the stage below when it stops reading.
  ok: CancellationToken,
  up_ok: Option<CancellationToken>,

  reads: u64,
  writes: AtomicU64,
}

impl Stream {
  pub(crate) fn new(cancel: CancellationToken, tag: Option<Tag>) -> Self {
    Self {
      id: next_stream_id(),
      tag,
      cancel,
      last: None,
      inlet: Inlet::new(),
      down: None,
      ok: CancellationToken::new(),
      up_ok: None,
      reads: 0,
      writes: AtomicU64::new(0),
    }
  }

  pub(crate) fn inlet(&self) -> Arc<Inlet> {
    Arc::clone(&self.inlet)
  }

  pub(crate) fn ok_signal(&self) -> CancellationToken {
    self.ok.clone()
  }

  pub(crate) fn link_down(&mut self, down: Arc<Inlet>) {
    self.down = Some(down);
  }

  pub(crate) fn link_up(&mut self, up_ok: CancellationToken) {
    self.up_ok = Some(up_ok);
  }

  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn tag(&self) -> Option<&Tag> {
    self.tag.as_ref()
  }

  /// The frame subsequent writes derive from.
  pub fn last(&self) -> Option<&Arc<Frame>> {
    self.last.as_ref()
  }

  /// True once the stage below has stopped reading.
  pub fn downstream_closed(&self) -> bool {
    self.ok.is_cancelled()
  }

  /// Reads the next frame written by the stage above.
  pub async fn read(&mut self) -> PipeResult<Arc<Frame>> {
    self.read_inner(None).await
  }

  /// Like `read`, but also gives up with `IoCancelled` when `cancel` fires.
  pub async fn read_until(&mut self, cancel: &CancellationToken) -> PipeResult<Arc<Frame>> {
    self.read_inner(Some(cancel)).await
  }

  async fn read_inner(&mut self, cancel: Option<&CancellationToken>) -> PipeResult<Arc<Frame>> {
    let frame = {
      let mut rx = self.inlet.rx.lock().await;
      loop {
        let handoff = tokio::select! {
          biased;
          handoff = rx.recv() => handoff,
          // Closed upstream: hand out what is still pending first.
          _ = self.inlet.closed.cancelled() => rx.try_recv().ok(),
          _ = self.cancel.cancelled() => return Err(PipeError::Cancelled),
          _ = interrupted(cancel) => return Err(PipeError::IoCancelled),
        };
        let handoff = handoff.ok_or(PipeError::EndOfData)?;
        if let Some(frame) = handoff.take() {
          break frame;
        }
        event!(Level::TRACE, stream = %self, "Skipped abandoned frame.");
      }
    };

    self.reads += 1;
    event!(Level::TRACE, stream = %self, frame = %frame, reads = self.reads, "Read frame.");
    self.last = Some(Arc::clone(&frame));
    Ok(frame)
  }

  /// Writes `object` to the stage below, deriving its frame from the last frame read.
  pub async fn write(&self, object: impl Into<Value>) -> PipeResult<()> {
    self.write_inner(Arc::new(object.into()), None).await
  }

  /// Like `write`, but also gives up with `IoCancelled` when `cancel` fires.
  pub async fn write_until(&self, cancel: &CancellationToken, object: impl Into<Value>) -> PipeResult<()> {
    self.write_inner(Arc::new(object.into()), Some(cancel)).await
  }

  /// Writes an already shared object without copying it.
  pub async fn write_shared(&self, object: Arc<Value>) -> PipeResult<()> {
    self.write_inner(object, None).await
  }

  async fn write_inner(&self, object: Arc<Value>, cancel: Option<&CancellationToken>) -> PipeResult<()> {
    let frame = Arc::new(match &self.last {
      Some(parent) => parent.derive_shared(object, self.tag.clone()),
      None => Frame::from_shared(object, self.tag.clone()),
    });

    let Some(down) = &self.down else {
      event!(Level::DEBUG, stream = %self, "Write on terminal stream discarded.");
      return Err(PipeError::EndOfData);
    };

    let (taken, mut acknowledged) = oneshot::channel();
    let handoff = Handoff {
      frame: Arc::clone(&frame),
      taken,
    };
    let outcome = tokio::select! {
      biased;
      _ = self.ok.cancelled() => Err(PipeError::EndOfData),
      _ = self.cancel.cancelled() => Err(PipeError::Cancelled),
      _ = interrupted(cancel) => Err(PipeError::IoCancelled),
      handed = async {
        down.tx.send(handoff).await.map_err(|_| PipeError::EndOfData)?;
        (&mut acknowledged).await.map_err(|_| PipeError::EndOfData)
      } => handed,
    };

    // The reader may have taken the frame just as the write gave up.
    if outcome.is_err() && acknowledged.try_recv().is_err() {
      return outcome;
    }
    let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
    event!(Level::TRACE, stream = %self, frame = %frame, writes, "Wrote frame.");
    Ok(())
  }

  /// A stream sharing this stream's channels whose writes derive from `frame`.
  pub fn with(&self, frame: Arc<Frame>) -> Stream {
    Stream {
      id: next_stream_id(),
      tag: self.tag.clone(),
      cancel: self.cancel.clone(),
      last: Some(frame),
      inlet: Arc::clone(&self.inlet),
      down: self.down.clone(),
      ok: self.ok.clone(),
      up_ok: self.up_ok.clone(),
      reads: 0,
      writes: AtomicU64::new(0),
    }
  }

  /// Signals the stage above to stop writing and the stage below that no more data follows.
  pub(crate) fn close(&self) {
    event!(
      Level::DEBUG,
      "{} terminated read:{} write:{}",
      self,
      self.reads,
      self.writes.load(Ordering::Relaxed)
    );
    if let Some(up_ok) = &self.up_ok {
      up_ok.cancel();
    }
    if let Some(down) = &self.down {
      down.close();
    }
  }
}

impl fmt::Display for Stream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.tag {
      Some(tag) => write!(f, "Stream({}: {})", self.id, tag),
      None => write!(f, "Stream({}: <none>)", self.id),
    }
  }
}

impl fmt::Debug for Stream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stream")
      .field("id", &self.id)
      .field("tag", &self.tag)
      .field("reads", &self.reads)
      .field("writes", &self.writes.load(Ordering::Relaxed))
      .field("has_downstream", &self.down.is_some())
      .finish()
  }
}

async fn interrupted(cancel: Option<&CancellationToken>) {
  match cancel {
    Some(token) => token.cancelled().await,
    None => std::future::pending().await,
  }
}
