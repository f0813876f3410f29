// pipeflow/src/core/frame.rs

//! The value carrier threaded through a pipeline.
//!
//! A `Frame` holds the object a stage wrote, the tag of the stage that wrote it,
//! and the `Stack` of objects written by tagged ancestor stages. Frames are never
//! mutated: every write derives a new frame from the one most recently read.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Context key bound to a frame's own object.
pub const SELF_KEY: &str = "self";

/// Name given to the output of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(Arc<str>);

impl Tag {
  /// Returns `None` for an empty name.
  pub fn new(name: &str) -> Option<Tag> {
    if name.is_empty() {
      return None;
    }
    Some(Tag(Arc::from(name)))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Ancestor tag name to the object written under that tag.
pub type Stack = HashMap<String, Arc<Value>>;

/// Flattened bindings handed to the template evaluator.
pub type Context = HashMap<String, Arc<Value>>;

#[derive(Debug, Clone)]
pub struct Frame {
  tag: Option<Tag>,
  object: Arc<Value>,
  stack: Stack,
  context: Context,
}

impl Frame {
  /// A frame with no ancestors, as written by a source stage.
  pub fn new(object: impl Into<Value>, tag: Option<Tag>) -> Self {
    Self::from_shared(Arc::new(object.into()), tag)
  }

  pub fn from_shared(object: Arc<Value>, tag: Option<Tag>) -> Self {
    Self::assemble(object, tag, Stack::new())
  }

  fn assemble(object: Arc<Value>, tag: Option<Tag>, mut stack: Stack) -> Self {
    if let Some(own) = &tag {
      stack.remove(own.as_str());
    }

    let mut context = Context::with_capacity(stack.len() + 2);
    for (name, value) in &stack {
      context.insert(name.clone(), Arc::clone(value));
    }
    context.insert(SELF_KEY.to_string(), Arc::clone(&object));
    if let Some(own) = &tag {
      context.insert(own.to_string(), Arc::clone(&object));
    }

    Self {
      tag,
      object,
      stack,
      context,
    }
  }

  /// Derives a child frame carrying `object`.
  ///
  /// The child's stack is this frame's stack plus, when this frame is tagged,
  /// an entry binding that tag to this frame's object.
  pub fn derive(&self, object: impl Into<Value>, tag: Option<Tag>) -> Self {
    self.derive_shared(Arc::new(object.into()), tag)
  }

  pub fn derive_shared(&self, object: Arc<Value>, tag: Option<Tag>) -> Self {
    let mut stack = Stack::with_capacity(self.stack.len() + 1);
    for (name, value) in &self.stack {
      stack.insert(name.clone(), Arc::clone(value));
    }
    if let Some(parent_tag) = &self.tag {
      stack.insert(parent_tag.to_string(), Arc::clone(&self.object));
    }
    Self::assemble(object, tag, stack)
  }

  /// Derives a frame with the same object and tag and `extra` merged into its stack.
  pub fn append_stack(&self, extra: Stack) -> Self {
    let derived = self.derive_shared(Arc::clone(&self.object), self.tag.clone());
    let mut stack = derived.stack;
    stack.extend(extra);
    Self::assemble(derived.object, derived.tag, stack)
  }

  pub fn tag(&self) -> Option<&Tag> {
    self.tag.as_ref()
  }

  pub fn object(&self) -> &Value {
    &self.object
  }

  pub fn shared_object(&self) -> Arc<Value> {
    Arc::clone(&self.object)
  }

  pub fn stack(&self) -> &Stack {
    &self.stack
  }

  pub fn context(&self) -> &Context {
    &self.context
  }

  /// Text form of the object: strings as-is, null as empty, anything else as JSON.
  pub fn as_text(&self) -> String {
    value_text(&self.object)
  }
}

impl fmt::Display for Frame {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let tag = self.tag.as_ref().map_or("<none>", Tag::as_str);
    write!(f, "Frame({}: {}: {} refs)", tag, self.object, self.stack.len())
  }
}

pub(crate) fn value_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}
