// pipeflow/src/pipeline/mod.rs

//! Running pipelines: the orchestrator and the fork executor.

pub mod execution;
pub mod fork;

pub use execution::{run, run_io};
pub use fork::ForkStage;
