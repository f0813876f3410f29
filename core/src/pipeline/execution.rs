// pipeflow/src/pipeline/execution.rs

//! Contains `run()` and `run_io()`, which wire an ordered list of runnables into
//! streams, execute every stage concurrently and aggregate their outcomes.

use crate::core::context::RunContext;
use crate::core::stage::Runnable;
use crate::core::stream::Stream;
use crate::error::{PipeError, RunErrors, StageFailure};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tracing::{event, instrument, span, Instrument, Level};

struct StageOutcome {
  index: usize,
  stage: String,
  stream: String,
  result: Result<(), PipeError>,
}

/// Runs `input`, then `modules`, then `output` as one pipeline.
pub async fn run_io(
  ctx: &RunContext,
  input: Runnable,
  modules: Vec<Runnable>,
  output: Runnable,
) -> Result<(), RunErrors> {
  let mut pipes = Vec::with_capacity(modules.len() + 2);
  pipes.push(input.tagged(None));
  pipes.extend(modules);
  pipes.push(output.tagged(None));
  run(ctx, pipes).await
}

/// Executes `modules` concurrently as one pipeline.
///
/// Stage *i* reads what stage *i-1* writes. End-of-data and cancellation are not
/// failures. The first real failure cancels the run so the other stages unwind;
/// every failure is reported in the returned `RunErrors`.
#[instrument(name = "pipeline::run", skip_all, fields(num_stages = modules.len()))]
pub async fn run(ctx: &RunContext, modules: Vec<Runnable>) -> Result<(), RunErrors> {
  event!(Level::DEBUG, "About to run {} stages.", modules.len());
  if modules.is_empty() {
    return Ok(());
  }

  let ctx = ctx.child();
  // Whatever happens below, nothing of this run outlives it.
  let _run_guard = ctx.cancellation_token().clone().drop_guard();

  let streams = link_streams(&ctx, &modules);
  let (tx, mut rx) = mpsc::channel::<StageOutcome>(modules.len());

  for (index, (runnable, stream)) in modules.into_iter().zip(streams).enumerate() {
    let stage_span = span!(Level::DEBUG, "stage", index, stage = %runnable, stream = %stream);
    event!(parent: &stage_span, Level::DEBUG, "Starting stage.");
    tokio::spawn(run_stage(index, runnable, stream, ctx.clone(), tx.clone()).instrument(stage_span));
  }
  drop(tx);

  let mut failures = Vec::new();
  while let Some(outcome) = rx.recv().await {
    let error = match outcome.result {
      Ok(()) => continue,
      Err(e) if e.is_benign() => {
        event!(Level::TRACE, index = outcome.index, reason = %e, "Stage stopped normally.");
        continue;
      }
      Err(e) => e,
    };

    event!(Level::ERROR, index = outcome.index, stage = %outcome.stage, error = %error, "Stage failed.");
    if failures.is_empty() {
      ctx.cancel();
    }
    failures.push(StageFailure {
      index: outcome.index,
      stage: outcome.stage,
      stream: outcome.stream,
      error,
    });
  }

  if failures.is_empty() {
    event!(Level::DEBUG, "Pipeline completed.");
    return Ok(());
  }
  Err(RunErrors::new(failures))
}

/// Builds one stream per stage and links each to its neighbours.
fn link_streams(ctx: &RunContext, modules: &[Runnable]) -> Vec<Stream> {
  let count = modules.len();
  let mut streams: Vec<Stream> = modules
    .iter()
    .enumerate()
    .map(|(i, module)| {
      // The last stage has nobody to tag its output for.
      let tag = if i + 1 < count { module.tag.clone() } else { None };
      Stream::new(ctx.cancellation_token().clone(), tag)
    })
    .collect();

  let inlets: Vec<_> = streams.iter().map(Stream::inlet).collect();
  let oks: Vec<_> = streams.iter().map(Stream::ok_signal).collect();

  // Nothing will ever write into the first stage.
  inlets[0].close();

  for (i, stream) in streams.iter_mut().enumerate() {
    if i + 1 < count {
      stream.link_down(inlets[i + 1].clone());
    }
    if i > 0 {
      stream.link_up(oks[i - 1].clone());
    }
  }
  event!(Level::TRACE, streams = ?streams, "Streams linked.");
  streams
}

async fn run_stage(
  index: usize,
  runnable: Runnable,
  mut stream: Stream,
  ctx: RunContext,
  results: mpsc::Sender<StageOutcome>,
) {
  let stage = runnable.to_string();
  let stream_name = stream.to_string();

  let outcome = AssertUnwindSafe(runnable.stage.run(&ctx, &mut stream))
    .catch_unwind()
    .await;
  stream.close();

  let result = match outcome {
    Ok(result) => result,
    Err(panic) => {
      let message = panic_message(panic.as_ref());
      event!(Level::ERROR, %message, "Stage panicked.");
      Err(PipeError::Panicked { message })
    }
  };
  event!(Level::DEBUG, "Stage stopped.");

  // Capacity is one slot per stage, so this never waits.
  let _ = results
    .send(StageOutcome {
      index,
      stage,
      stream: stream_name,
      result,
    })
    .await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    return (*s).to_string();
  }
  if let Some(s) = panic.downcast_ref::<String>() {
    return s.clone();
  }
  "unknown panic".to_string()
}
