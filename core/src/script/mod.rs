// pipeflow/src/script/mod.rs

//! Pipeline scripts: scanning source text into invocations and compiling
//! invocations into runnables.
//!
//! ```text
//! json.decode :: flatten as item :: (( render "{{item.name}}" :: exec wc -c )) :: limit 10
//! ```
//!
//! Segments are separated by `::`. A segment is `name [arguments] [as tag]`, or a
//! fork group `(( ... ))` whose segments run once per incoming value.

pub mod parser;
pub mod scanner;

use crate::core::frame::Tag;
use crate::error::{PipeError, PipeResult};
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub use parser::{compile, make_stage, materialize};
pub use scanner::parse;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
  #[error("segment {segment}: unexpected character {found:?}")]
  UnexpectedCharacter { segment: usize, found: char },

  #[error("segment {segment}: missing stage name")]
  MissingName { segment: usize },

  #[error("segment {segment}: expected tag name after `as`")]
  MissingTag { segment: usize },

  #[error("segment {segment}: invalid tag name {tag:?}")]
  InvalidTag { segment: usize, tag: String },

  #[error("segment {segment}: fork group is never closed")]
  UnclosedFork { segment: usize },

  #[error("segment {segment}: empty fork group")]
  EmptyFork { segment: usize },

  #[error("no pipeline described")]
  Empty,
}

impl ParseError {
  /// The 0-based segment the error occurred in.
  pub fn segment(&self) -> Option<usize> {
    match self {
      ParseError::UnexpectedCharacter { segment, .. }
      | ParseError::MissingName { segment }
      | ParseError::MissingTag { segment }
      | ParseError::InvalidTag { segment, .. }
      | ParseError::UnclosedFork { segment }
      | ParseError::EmptyFork { segment } => Some(*segment),
      ParseError::Empty => None,
    }
  }
}

/// One stage invocation as written in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub name: String,
  /// Argument text, verbatim apart from surrounding whitespace.
  pub args: String,
  pub tag: Option<Tag>,
  /// Set for a fork group, which has no name, arguments or tag of its own.
  pub fork: Option<Vec<Invocation>>,
  /// 0-based segment index in the script.
  pub position: usize,
}

impl Invocation {
  pub fn stage(position: usize, name: String, args: String, tag: Option<Tag>) -> Self {
    Self {
      name,
      args,
      tag,
      fork: None,
      position,
    }
  }

  pub fn fork(position: usize, group: Vec<Invocation>) -> Self {
    Self {
      name: String::new(),
      args: String::new(),
      tag: None,
      fork: Some(group),
      position,
    }
  }

  pub fn is_fork(&self) -> bool {
    self.fork.is_some()
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(group) = &self.fork {
      f.write_str("((")?;
      for (i, inv) in group.iter().enumerate() {
        if i > 0 {
          f.write_str(" ::")?;
        }
        write!(f, " {}", inv)?;
      }
      return f.write_str(" ))");
    }
    f.write_str(&self.name)?;
    if !self.args.is_empty() {
      write!(f, " {}", self.args)?;
    }
    if let Some(tag) = &self.tag {
      write!(f, " as {}", tag)?;
    }
    Ok(())
  }
}

/// Resolves the script text for `command`: the contents of the file it names,
/// or the string itself when no such file exists.
pub fn source_of(command: &str) -> PipeResult<String> {
  let path = Path::new(command);
  match std::fs::metadata(path) {
    Ok(meta) if meta.is_dir() => Err(PipeError::Io(std::io::Error::new(
      std::io::ErrorKind::InvalidInput,
      format!("{:?} is a directory not a script file", command),
    ))),
    Ok(_) => Ok(std::fs::read_to_string(path)?),
    // Not found, or not even a valid path (long inline scripts).
    Err(_) => Ok(command.to_string()),
  }
}
