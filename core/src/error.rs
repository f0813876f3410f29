// pipeflow/src/error.rs
use anyhow::Error as AnyhowError;
use std::fmt;
use thiserror::Error;

use crate::args::ArgError;
use crate::script::ParseError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum PipeError {
  /// Upstream has no more data, or downstream stopped accepting it.
  #[error("end of data")]
  EndOfData,

  /// The run this stage belongs to was cancelled.
  #[error("pipeline cancelled")]
  Cancelled,

  /// An operation-scoped cancel token fired during a read or write.
  #[error("IO cancelled")]
  IoCancelled,

  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error("segment {position}: parse {args:?} for {name:?}. Source: {source}")]
  Resolution {
    position: usize,
    name: String,
    args: String,
    #[source]
    source: AnyhowError,
  },

  #[error("unknown stage {name:?}")]
  UnknownStage { name: String },

  #[error("stage panicked: {message}")]
  Panicked { message: String },

  #[error(transparent)]
  Run(#[from] RunErrors),

  #[error(transparent)]
  Args(#[from] ArgError),

  #[error(transparent)]
  Template(#[from] TemplateError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// Text input that is not valid UTF-8.
  #[error("{origin} produced invalid UTF-8 after {valid_up_to} bytes")]
  InvalidUtf8 { origin: String, valid_up_to: usize },

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Error in stage implementation. Source: {source}")]
  StageError {
    #[source]
    source: AnyhowError,
  },
}

impl PipeError {
  /// Decodes `bytes` as text read from `origin`.
  pub(crate) fn utf8(origin: &str, bytes: Vec<u8>) -> PipeResult<String> {
    String::from_utf8(bytes).map_err(|e| PipeError::InvalidUtf8 {
      origin: origin.to_string(),
      valid_up_to: e.utf8_error().valid_up_to(),
    })
  }

  /// End-of-data and run cancellation are normal ways for a stage to stop.
  pub fn is_benign(&self) -> bool {
    match self {
      PipeError::EndOfData | PipeError::Cancelled => true,
      PipeError::StageError { source } => source
        .downcast_ref::<PipeError>()
        .map_or(false, PipeError::is_benign),
      _ => false,
    }
  }
}

impl From<AnyhowError> for PipeError {
  fn from(err: AnyhowError) -> Self {
    // Unwrap a PipeError that went through anyhow instead of nesting it.
    match err.downcast::<PipeError>() {
      Ok(pipe_err) => pipe_err,
      Err(source) => PipeError::StageError { source },
    }
  }
}

pub type PipeResult<T, E = PipeError> = std::result::Result<T, E>;

/// One stage that ended a run with a non-benign error.
#[derive(Debug)]
pub struct StageFailure {
  pub index: usize,
  pub stage: String,
  pub stream: String,
  pub error: PipeError,
}

impl fmt::Display for StageFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "stage {} ({}) on {}: {}", self.index, self.stage, self.stream, self.error)
  }
}

/// Aggregate of every failing stage in a run.
#[derive(Debug)]
pub struct RunErrors {
  failures: Vec<StageFailure>,
}

impl RunErrors {
  pub(crate) fn new(mut failures: Vec<StageFailure>) -> Self {
    failures.sort_by_key(|f| f.index);
    Self { failures }
  }

  pub fn failures(&self) -> &[StageFailure] {
    &self.failures
  }

  pub fn len(&self) -> usize {
    self.failures.len()
  }

  pub fn is_empty(&self) -> bool {
    self.failures.is_empty()
  }

  pub fn into_failures(self) -> Vec<StageFailure> {
    self.failures
  }
}

impl fmt::Display for RunErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.failures.len() {
      1 => write!(f, "1 stage failed:")?,
      n => write!(f, "{} stages failed:", n)?,
    }
    for failure in &self.failures {
      write!(f, "\n\t* {}", failure)?;
    }
    Ok(())
  }
}

impl std::error::Error for RunErrors {}
