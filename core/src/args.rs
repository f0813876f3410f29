// pipeflow/src/args.rs

//! The argument cursor handed to stage constructors.
//!
//! A stage's argument text is kept verbatim by the script parser; `Args` splits it
//! into words with POSIX shell quoting rules and offers typed positional accessors.

use shlex::Shlex;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgError {
  #[error("unterminated {quote} quote")]
  UnterminatedQuote { quote: char },

  #[error("trailing backslash")]
  TrailingEscape,

  #[error("missing argument {index} ({what})")]
  Missing { index: usize, what: String },

  #[error("argument {index}: expected an integer, got {value:?}")]
  InvalidInteger { index: usize, value: String },

  #[error("expected at most {max} argument(s) (given {given})")]
  TooMany { max: usize, given: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Word {
  text: String,
  // Byte offset in `raw` where the word starts.
  start: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
  raw: String,
  words: Vec<Word>,
}

impl Args {
  pub fn parse(input: &str) -> Result<Self, ArgError> {
    let raw = input.trim().to_string();
    let words = split_words(&raw)?;
    Ok(Self { raw, words })
  }

  /// The trimmed argument text as written in the script.
  pub fn raw(&self) -> &str {
    &self.raw
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn word(&self, index: usize) -> Option<&str> {
    self.words.get(index).map(|w| w.text.as_str())
  }

  pub fn words(&self) -> Vec<&str> {
    self.words.iter().map(|w| w.text.as_str()).collect()
  }

  pub fn required(&self, index: usize, what: &str) -> Result<&str, ArgError> {
    self.word(index).ok_or_else(|| ArgError::Missing {
      index,
      what: what.to_string(),
    })
  }

  pub fn int(&self, index: usize, what: &str) -> Result<i64, ArgError> {
    let value = self.required(index, what)?;
    value.parse::<i64>().map_err(|_| ArgError::InvalidInteger {
      index,
      value: value.to_string(),
    })
  }

  /// Raw text from word `index` to the end, quotes included.
  pub fn rest(&self, index: usize) -> &str {
    match self.words.get(index) {
      Some(word) => &self.raw[word.start..],
      None => "",
    }
  }

  pub fn expect_at_most(&self, max: usize) -> Result<(), ArgError> {
    if self.words.len() > max {
      return Err(ArgError::TooMany {
        max,
        given: self.words.len(),
      });
    }
    Ok(())
  }
}

fn split_words(s: &str) -> Result<Vec<Word>, ArgError> {
  let (starts, open_quote) = word_starts(s);
  let mut lexer = Shlex::new(s);
  let texts: Vec<String> = lexer.by_ref().collect();
  if lexer.had_error {
    return Err(match open_quote {
      Some(quote) => ArgError::UnterminatedQuote { quote },
      None => ArgError::TrailingEscape,
    });
  }

  Ok(
    texts
      .into_iter()
      .enumerate()
      .map(|(i, text)| Word {
        text,
        start: starts.get(i).copied().unwrap_or(s.len()),
      })
      .collect(),
  )
}

/// Byte offsets where each shell word starts, and the quote left open at the end.
fn word_starts(s: &str) -> (Vec<usize>, Option<char>) {
  let mut starts = Vec::new();
  let mut in_word = false;
  let mut in_comment = false;
  let mut escaped = false;
  let mut quote: Option<char> = None;

  for (i, c) in s.char_indices() {
    if in_comment {
      in_comment = c != '\n';
      continue;
    }
    if escaped {
      escaped = false;
      continue;
    }
    match (quote, c) {
      (Some('\''), '\'') => quote = None,
      (Some('\''), _) => {}
      (Some(_), '\\') => escaped = true,
      (Some(_), '"') => quote = None,
      (Some(_), _) => {}
      (None, ' ' | '\t' | '\n') => in_word = false,
      (None, '#') if !in_word => in_comment = true,
      (None, c) => {
        if !in_word {
          starts.push(i);
          in_word = true;
        }
        match c {
          '\\' => escaped = true,
          '\'' | '"' => quote = Some(c),
          _ => {}
        }
      }
    }
  }
  (starts, quote)
}
