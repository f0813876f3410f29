// pipeflow/src/template.rs

//! A small template renderer over a frame context.
//!
//! Templates are literal text with `{{ path }}` holes. A path is a dotted list of
//! object keys or array indices, its first element naming a context entry
//! (`self`, or any tag in scope). Missing values render as empty text.

use crate::core::frame::{value_text, Context};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
  #[error("template: unterminated `{{{{` at offset {offset}")]
  Unterminated { offset: usize },

  #[error("template: empty expression at offset {offset}")]
  EmptyExpression { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
  Text(String),
  Path(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
  source: String,
  pieces: Vec<Piece>,
}

impl Template {
  pub fn parse(source: &str) -> Result<Self, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
      if open > 0 {
        pieces.push(Piece::Text(rest[..open].to_string()));
      }
      let after_open = &rest[open + 2..];
      let close = after_open
        .find("}}")
        .ok_or(TemplateError::Unterminated { offset: offset + open })?;

      let expression = after_open[..close].trim();
      if expression.is_empty() {
        return Err(TemplateError::EmptyExpression { offset: offset + open });
      }
      pieces.push(Piece::Path(expression.split('.').map(|s| s.trim().to_string()).collect()));

      let consumed = open + 2 + close + 2;
      rest = &rest[consumed..];
      offset += consumed;
    }
    if !rest.is_empty() {
      pieces.push(Piece::Text(rest.to_string()));
    }

    Ok(Self {
      source: source.to_string(),
      pieces,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  /// True if the template has no `{{ }}` holes.
  pub fn is_literal(&self) -> bool {
    self.pieces.iter().all(|p| matches!(p, Piece::Text(_)))
  }

  pub fn render(&self, context: &Context) -> String {
    let mut out = String::with_capacity(self.source.len());
    for piece in &self.pieces {
      match piece {
        Piece::Text(text) => out.push_str(text),
        Piece::Path(path) => {
          if let Some(value) = lookup(context, path) {
            out.push_str(&value_text(value));
          }
        }
      }
    }
    out
  }
}

fn lookup<'a>(context: &'a Context, path: &[String]) -> Option<&'a Value> {
  let (first, rest) = path.split_first()?;
  let mut value: &Value = context.get(first)?;
  for key in rest {
    value = match value {
      Value::Object(map) => map.get(key)?,
      Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
      _ => return None,
    };
  }
  Some(value)
}
