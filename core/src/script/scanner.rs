// pipeflow/src/script/scanner.rs

//! Hand-written scanner turning script text into a tree of `Invocation`s.

use super::{Invocation, ParseError};
use crate::core::frame::Tag;
use tracing::{event, instrument, Level};

const DELIMITER: char = ':';
const COMMENT: char = '#';
const FORK_OPEN: char = '(';
const FORK_CLOSE: char = ')';

/// What ended a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
  Segment,
  ForkClose,
  Input,
}

enum Name {
  /// Nothing but whitespace and comments before the marker.
  Empty(End),
  /// `((` at name position.
  Fork,
  /// A name ended by a marker; the segment has no arguments.
  Complete(String, End),
  /// A name followed by whitespace or a comment; arguments may follow.
  Open(String),
}

enum ArgsEnd {
  Marker(End),
  Tag,
}

/// Parses script text into invocations, in source order.
#[instrument(name = "script::parse", skip_all, fields(source_len = source.len()))]
pub fn parse(source: &str) -> Result<Vec<Invocation>, ParseError> {
  let mut scanner = Scanner::new(source);
  let (invocations, _) = scanner.group()?;
  if invocations.is_empty() {
    return Err(ParseError::Empty);
  }
  event!(Level::DEBUG, "Parsed {} top-level invocations.", invocations.len());
  Ok(invocations)
}

struct Scanner {
  src: Vec<char>,
  pos: usize,
  // Index of the next segment.
  segment: usize,
  // Number of open fork groups.
  depth: usize,
}

impl Scanner {
  fn new(source: &str) -> Self {
    Self {
      src: source.chars().collect(),
      pos: 0,
      segment: 0,
      depth: 0,
    }
  }

  fn peek(&self) -> Option<char> {
    self.peek_at(0)
  }

  fn peek_at(&self, n: usize) -> Option<char> {
    self.src.get(self.pos + n).copied()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += 1;
    Some(c)
  }

  /// Consumes an end marker at the cursor, if there is one.
  fn end_marker(&mut self) -> Option<End> {
    match (self.peek(), self.peek_at(1)) {
      (None, _) => Some(End::Input),
      (Some(DELIMITER), Some(DELIMITER)) => {
        self.pos += 2;
        Some(End::Segment)
      }
      (Some(DELIMITER), None) => {
        self.pos += 1;
        Some(End::Input)
      }
      (Some(FORK_CLOSE), Some(FORK_CLOSE)) if self.depth > 0 => {
        self.pos += 2;
        Some(End::ForkClose)
      }
      _ => None,
    }
  }

  /// Skips to the end of the line, `\n`, `\r\n` or a lone `\r`.
  fn skip_comment(&mut self) {
    while let Some(c) = self.bump() {
      match c {
        '\n' => return,
        '\r' => {
          if self.peek() == Some('\n') {
            self.pos += 1;
          }
          return;
        }
        _ => {}
      }
    }
  }

  fn group(&mut self) -> Result<(Vec<Invocation>, End), ParseError> {
    let mut invocations = Vec::new();
    loop {
      let segment = self.segment;
      let end = match self.scan_name()? {
        Name::Empty(End::Input) => return Ok((invocations, End::Input)),
        // `(( ))`, reported by the enclosing group.
        Name::Empty(End::ForkClose) if invocations.is_empty() => {
          return Ok((invocations, End::ForkClose))
        }
        Name::Empty(_) => return Err(ParseError::MissingName { segment }),
        Name::Fork => {
          self.segment += 1;
          self.depth += 1;
          let (group, end) = self.group()?;
          self.depth -= 1;
          if end != End::ForkClose {
            return Err(ParseError::UnclosedFork { segment });
          }
          if group.is_empty() {
            return Err(ParseError::EmptyFork { segment });
          }
          event!(Level::TRACE, segment, size = group.len(), "Scanned fork group.");
          invocations.push(Invocation::fork(segment, group));
          self.after_fork(segment)?
        }
        Name::Complete(name, end) => {
          self.segment += 1;
          event!(Level::TRACE, segment, %name, "Scanned segment.");
          invocations.push(Invocation::stage(segment, name, String::new(), None));
          end
        }
        Name::Open(name) => {
          self.segment += 1;
          let (args, args_end) = self.scan_args();
          let (tag, end) = match args_end {
            ArgsEnd::Marker(end) => (None, end),
            ArgsEnd::Tag => {
              let (tag, end) = self.scan_tag(segment)?;
              (Some(tag), end)
            }
          };
          event!(Level::TRACE, segment, %name, %args, tag = ?tag, "Scanned segment.");
          invocations.push(Invocation::stage(segment, name, args, tag));
          end
        }
      };

      match end {
        End::Segment => continue,
        End::ForkClose | End::Input => return Ok((invocations, end)),
      }
    }
  }

  fn scan_name(&mut self) -> Result<Name, ParseError> {
    let mut name = String::new();
    loop {
      let Some(c) = self.peek() else {
        return Ok(match name.is_empty() {
          true => Name::Empty(End::Input),
          false => Name::Complete(name, End::Input),
        });
      };

      if c.is_whitespace() {
        self.pos += 1;
        if name.is_empty() {
          continue;
        }
        return Ok(Name::Open(name));
      }
      if c == COMMENT {
        if name.is_empty() {
          self.skip_comment();
          continue;
        }
        // Left for the argument scanner, which treats it as a comment.
        return Ok(Name::Open(name));
      }
      if name.is_empty() && c == FORK_OPEN && self.peek_at(1) == Some(FORK_OPEN) {
        self.pos += 2;
        return Ok(Name::Fork);
      }
      if let Some(end) = self.end_marker() {
        return Ok(match name.is_empty() {
          true => Name::Empty(end),
          false => Name::Complete(name, end),
        });
      }
      if c.is_alphanumeric() || c == '.' || c == '/' {
        self.pos += 1;
        name.push(c);
        continue;
      }
      return Err(ParseError::UnexpectedCharacter {
        segment: self.segment,
        found: c,
      });
    }
  }

  /// Whether the cursor is on a standalone `as` keyword.
  fn at_tag_keyword(&self) -> bool {
    if self.peek() != Some('a') || self.peek_at(1) != Some('s') {
      return false;
    }
    match self.peek_at(2) {
      None => true,
      Some(c) if c.is_whitespace() => true,
      Some(DELIMITER) => matches!(self.peek_at(3), None | Some(DELIMITER)),
      Some(FORK_CLOSE) => self.depth > 0 && self.peek_at(3) == Some(FORK_CLOSE),
      Some(_) => false,
    }
  }

  fn scan_args(&mut self) -> (String, ArgsEnd) {
    let mut args = String::new();
    let mut quote: Option<char> = None;

    loop {
      if let Some(q) = quote {
        let Some(c) = self.bump() else {
          // Unterminated quote, left for the argument parser to report.
          return (args, ArgsEnd::Marker(End::Input));
        };
        args.push(c);
        if c == q {
          quote = None;
        } else if c == '\\' && q == '"' {
          if let Some(escaped) = self.bump() {
            args.push(escaped);
          }
        }
        continue;
      }

      if let Some(end) = self.end_marker() {
        return (args.trim_end().to_string(), ArgsEnd::Marker(end));
      }
      let Some(c) = self.peek() else {
        return (args.trim_end().to_string(), ArgsEnd::Marker(End::Input));
      };

      let word_start = args.is_empty() || args.ends_with(char::is_whitespace);
      if word_start && c == COMMENT {
        self.skip_comment();
        continue;
      }
      if word_start && self.at_tag_keyword() {
        self.pos += 2;
        return (args.trim_end().to_string(), ArgsEnd::Tag);
      }
      self.pos += 1;
      if args.is_empty() && c.is_whitespace() {
        continue;
      }
      if c == '"' || c == '\'' {
        quote = Some(c);
      }
      args.push(c);
    }
  }

  fn scan_tag(&mut self, segment: usize) -> Result<(Tag, End), ParseError> {
    let mut text = String::new();
    let end = loop {
      if let Some(end) = self.end_marker() {
        break end;
      }
      match self.bump() {
        Some(COMMENT) => self.skip_comment(),
        Some(c) => text.push(c),
        None => break End::Input,
      }
    };

    let name = text.trim();
    if name.is_empty() {
      return Err(ParseError::MissingTag { segment });
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
      return Err(ParseError::InvalidTag {
        segment,
        tag: name.to_string(),
      });
    }
    match Tag::new(name) {
      Some(tag) => Ok((tag, end)),
      None => Err(ParseError::MissingTag { segment }),
    }
  }

  /// After `))` only whitespace and comments may precede the next marker.
  fn after_fork(&mut self, segment: usize) -> Result<End, ParseError> {
    loop {
      match self.peek() {
        Some(c) if c.is_whitespace() => self.pos += 1,
        Some(COMMENT) => self.skip_comment(),
        _ => {
          if let Some(end) = self.end_marker() {
            return Ok(end);
          }
          // end_marker only returns None when a character is present.
          let found = self.peek().unwrap_or(FORK_CLOSE);
          return Err(ParseError::UnexpectedCharacter { segment, found });
        }
      }
    }
  }
}
