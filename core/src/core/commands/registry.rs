//! Executor registration. A command-type name maps to an executor and
//! an optional undoer; the engine refuses to run unknown types, except
//! for a small set of reserved test-only pseudo-commands that succeed
//! trivially (useful for exercising the log/branching machinery without
//! a real timeline effect).

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::Transaction;

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::error::{CoreError, CoreResult};
use crate::core::store::CommandRow;

/// Invoked inside the engine's open transaction. Mutates `env` in
/// place (selection, recorded mutations, `result_data`) and returns
/// whether the edit took effect.
pub trait Executor: Send + Sync {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome>;
}

/// Reverses a committed command. Receives the stored event-log row
/// (its `command_args` carries whatever the executor recorded, e.g.
/// the pre-edit clip payload or the ids it generated) and must restore
/// state deterministically. Returns the mutations it applied so the
/// engine can push them to subscribers the same way `execute` does.
pub trait Undoer: Send + Sync {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer>;
}

/// A command type name reserved for tests: it is recognized by the
/// engine, recorded to the log like any other command, but has no
/// timeline effect. Useful for exercising branching/undo/redo/replay
/// without needing a real executor.
pub const TEST_NOOP_COMMAND: &str = "__test_noop";

struct NoopExecutor;
impl Executor for NoopExecutor {
    fn execute(&self, _tx: &Transaction<'_>, _env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        Ok(ExecOutcome::ok_empty())
    }
}
struct NoopUndoer;
impl Undoer for NoopUndoer {
    fn undo(&self, _tx: &Transaction<'_>, _stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        Ok(TimelineMutationBuffer::default())
    }
}

/// Command types that do not participate in the event log at all
/// (pure UI-state commands, e.g. "select all"): the engine executes
/// them directly against the store and returns without opening a
/// transaction, recording history, or notifying observers.
#[derive(Default)]
pub struct NonRecordingTypes(std::collections::HashSet<String>);

impl NonRecordingTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, command_type: impl Into<String>) {
        self.0.insert(command_type.into());
    }

    pub fn contains(&self, command_type: &str) -> bool {
        self.0.contains(command_type)
    }
}

/// Maps command-type names to their executor/undoer pair.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
    undoers: HashMap<String, Arc<dyn Undoer>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            executors: HashMap::new(),
            undoers: HashMap::new(),
        };
        registry.register(TEST_NOOP_COMMAND, Arc::new(NoopExecutor), Some(Arc::new(NoopUndoer)));
        registry
    }

    pub fn register(
        &mut self,
        command_type: impl Into<String>,
        executor: Arc<dyn Executor>,
        undoer: Option<Arc<dyn Undoer>>,
    ) {
        let command_type = command_type.into();
        self.executors.insert(command_type.clone(), executor);
        if let Some(undoer) = undoer {
            self.undoers.insert(command_type, undoer);
        }
    }

    pub fn is_known(&self, command_type: &str) -> bool {
        self.executors.contains_key(command_type)
    }

    pub fn executor(&self, command_type: &str) -> CoreResult<Arc<dyn Executor>> {
        self.executors
            .get(command_type)
            .cloned()
            .ok_or_else(|| CoreError::UnknownCommandType(command_type.to_string()))
    }

    pub fn undoer(&self, command_type: &str) -> CoreResult<Arc<dyn Undoer>> {
        self.undoers
            .get(command_type)
            .cloned()
            .ok_or_else(|| CoreError::MissingUndoer(command_type.to_string()))
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
