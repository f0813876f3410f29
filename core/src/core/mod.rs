pub mod context;
pub mod frame;
pub mod stage;
pub mod stream;

// Re-export key types for easier access from other pipeflow modules (and lib.rs)
pub use context::{ResourceScope, RunContext};
pub use frame::{Context, Frame, Stack, Tag, SELF_KEY};
pub use stage::{Runnable, Stage};
pub use stream::Stream;
