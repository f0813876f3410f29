// src/lib.rs

//! Pipeflow: an async, text-scripted pipeline engine for Rust.
//!
//! A pipeline is an ordered list of stages running concurrently, each handing
//! JSON values to the next through a single-slot `Stream`. Pipelines can be
//! assembled in code or described as a script:
//!  - `::` separates stages, `as NAME` tags a stage's output for later stages.
//!  - `(( ... ))` runs a nested pipeline once per value and gathers its output.
//!  - Stage names resolve through a `Registry`; unknown names run as commands.
//!  - Templates (`{{ self.key }}`, `{{ tag.key }}`) read the current value and
//!    any tagged ancestor.

pub mod args;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod script;
pub mod stages;
pub mod template;

// --- Re-exports for the Public API ---

pub use crate::core::{Context, Frame, ResourceScope, RunContext, Runnable, Stack, Stage, Stream, Tag, SELF_KEY};
pub use crate::pipeline::{run, run_io, ForkStage};

pub use crate::args::{ArgError, Args};
pub use crate::error::{PipeError, PipeResult, RunErrors, StageFailure};
pub use crate::registry::{Registry, StageConstructor, StageDefinition};
pub use crate::script::{compile, Invocation, ParseError};
pub use crate::template::{Template, TemplateError};

/*
    Running a script:
    1. Build a `Registry` (`Registry::builtin()`, plus any `define`d stages).
    2. `compile(source, &registry)` scans the script and resolves every stage.
    3. Create a `RunContext` and call `run_io(&ctx, source, runnables, sink).await`.
    4. Once every run sharing the context is done, `ctx.scope().release()`.
*/
