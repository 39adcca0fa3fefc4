//! Command engine and command library (§4.4, §4.4.8).

pub mod bag;
pub mod engine;
pub mod library;
pub mod registry;

pub use bag::{
    BulkShift, ClipMutation, CommandEnvelope, CommandFlags, ExecOutcome, SequenceMutations,
    TimelineMutationBuffer,
};
pub use engine::{
    CommandEngine, CommandEngineConfig, CommandResult, EngineEvent, EngineListener, StackKey,
    StackMode, TimelineObserver,
};
pub use registry::{Executor, ExecutorRegistry, Undoer, TEST_NOOP_COMMAND};

/// Registers the full command library (§4.4.8) against a fresh
/// registry, under the names library callers are expected to use.
pub fn register_standard_library(registry: &mut ExecutorRegistry) {
    library::register_all(registry);
}
