//! The command engine: transactional apply, event log, branching undo
//! tree, and snapshot/replay reconstruction (§4.4).

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::registry::{ExecutorRegistry, NonRecordingTypes};
use crate::core::error::{CoreError, CoreResult};
use crate::core::model::Clip;
use crate::core::store::{CommandRow, TimelineStore};
use crate::core::types::{ProjectId, SequenceId};

/// Whether undo history is a single stack shared by the whole store, or
/// one stack per sequence (§4.4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackMode {
    Global,
    PerSequence,
}

/// Which undo stack a given operation targets.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StackKey {
    Global,
    Sequence(SequenceId),
}

/// Tuning knobs for the engine, passed in at construction rather than
/// held as global mutable state (§10.3).
#[derive(Clone, Debug)]
pub struct CommandEngineConfig {
    pub stack_mode: StackMode,
    /// Write a snapshot every N committed commands on top of
    /// `force_snapshot`. The concrete cadence is a tuning knob (§9 open
    /// question 1); callers needing a different cadence construct their
    /// own config rather than relying on a hardcoded constant.
    pub snapshot_cadence: u32,
}

impl Default for CommandEngineConfig {
    fn default() -> Self {
        Self {
            stack_mode: StackMode::PerSequence,
            snapshot_cadence: 50,
        }
    }
}

/// What happened as a result of `execute`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CommandResult {
    pub sequence_number: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub result_data: Option<serde_json::Value>,
    /// True when `suppress_if_unchanged` fired: the command ran but its
    /// effect was a no-op, so the transaction was rolled back and no
    /// history entry exists.
    pub suppressed: bool,
}

#[derive(Clone, Copy, Debug)]
pub enum EngineEvent {
    Executed,
    Undone,
    Redone,
}

pub trait TimelineObserver: Send + Sync {
    fn apply_mutations(&self, mutations: &TimelineMutationBuffer);
    fn reload_sequence(&self, sequence_id: &SequenceId, clips: Vec<Clip>);
}

pub trait EngineListener: Send + Sync {
    fn on_event(&self, event: EngineEvent, command: &CommandRow);
}

pub struct CommandEngine {
    store: TimelineStore,
    registry: ExecutorRegistry,
    non_recording: NonRecordingTypes,
    config: CommandEngineConfig,
    /// In-memory head for `StackMode::Global`. The schema models heads
    /// per-sequence (`sequences.current_sequence_number`); a single
    /// global stack spanning sequences has nowhere durable to live, so
    /// — per the open-question guidance in §9 to leave tuning/shape
    /// decisions as documented choices rather than guesses — this mode
    /// is supported for completeness but does not survive a restart.
    global_head: Option<i64>,
    observers: Vec<Arc<dyn TimelineObserver>>,
    listeners: Vec<Arc<dyn EngineListener>>,
}

impl CommandEngine {
    pub fn new(store: TimelineStore, registry: ExecutorRegistry, config: CommandEngineConfig) -> Self {
        Self {
            store,
            registry,
            non_recording: NonRecordingTypes::new(),
            config,
            global_head: None,
            observers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn store(&self) -> &TimelineStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TimelineStore {
        &mut self.store
    }

    pub fn mark_non_recording(&mut self, command_type: impl Into<String>) {
        self.non_recording.mark(command_type);
    }

    pub fn add_observer(&mut self, observer: Arc<dyn TimelineObserver>) {
        self.observers.push(observer);
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EngineListener>) {
        self.listeners.push(listener);
    }

    pub fn registry_mut(&mut self) -> &mut ExecutorRegistry {
        &mut self.registry
    }

    fn stack_key_for(&self, env: &CommandEnvelope) -> CoreResult<StackKey> {
        match self.config.stack_mode {
            StackMode::Global => Ok(StackKey::Global),
            StackMode::PerSequence => {
                let sequence_id = env.require_str("sequence_id")?;
                Ok(StackKey::Sequence(sequence_id))
            }
        }
    }

    /// The current undo-tree head for a stack.
    pub fn head(&self, key: &StackKey) -> CoreResult<Option<i64>> {
        match key {
            StackKey::Global => Ok(self.global_head),
            StackKey::Sequence(id) => {
                Ok(TimelineStore::get_sequence(self.store.connection(), id)?.current_sequence_number)
            }
        }
    }

    /// Updates the in-memory head cache after a transaction has
    /// already committed the durable head (`TimelineStore::set_sequence_head`
    /// inside the transaction, for `StackKey::Sequence`). Only
    /// `StackKey::Global` needs this — it has no row of its own to
    /// persist to, so the engine's `global_head` field is the sole
    /// source of truth for it. Called only once no transaction borrows
    /// `self.store`, since it takes `&mut self`.
    fn note_head(&mut self, key: &StackKey, head: Option<i64>) {
        if let StackKey::Global = key {
            self.global_head = head;
        }
    }

    fn compute_state_hash(conn: &rusqlite::Connection, sequence_id: &SequenceId) -> CoreResult<String> {
        let clips = TimelineStore::list_clips_for_sequence(conn, sequence_id)?;
        let json = serde_json::to_string(&clips)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Runs the execute pipeline (§4.4.3).
    pub fn execute(&mut self, mut env: CommandEnvelope) -> CoreResult<CommandResult> {
        if env.command_type.is_empty() {
            return Err(CoreError::InvalidArgument("command type must not be empty".into()));
        }
        if env.project_id.is_empty() {
            return Err(CoreError::InvalidArgument("project id must not be empty".into()));
        }
        if !self.registry.is_known(&env.command_type) {
            return Err(CoreError::UnknownCommandType(env.command_type.clone()));
        }

        // Non-recording types bypass the event log entirely: run
        // directly and return without touching undo-tree state.
        if self.non_recording.contains(&env.command_type) {
            let executor = self.registry.executor(&env.command_type)?;
            let tx = self.store.transaction()?;
            let outcome = run_executor(&executor, &tx, &mut env)?;
            tx.commit()?;
            self.dispatch_mutations(&env);
            return Ok(CommandResult {
                sequence_number: -1,
                success: outcome.success,
                error_message: outcome.error_message,
                result_data: outcome.result_data,
                suppressed: false,
            });
        }

        let stack_key = self.stack_key_for(&env)?;
        let sequence_id = env.require_str("sequence_id")?;
        let executor = self.registry.executor(&env.command_type)?;
        // Captured before the transaction borrows `self.store` mutably —
        // `self.head` takes `&self` and would otherwise alias `tx`.
        let current_head = self.head(&stack_key)?;

        let tx = self.store.transaction()?;

        if !env.flags.skip_selection_snapshot {
            let seq = TimelineStore::get_sequence(&tx, &sequence_id)?;
            env.playhead_pre = seq.playhead_frame;
            env.selected_clips_pre = seq.selection.clone();
            env.playhead = seq.playhead_frame;
            env.selected_clips = seq.selection;
        }

        env.parent_sequence_number = current_head;

        if env.flags.suppress_if_unchanged {
            env.pre_hash = Some(Self::compute_state_hash(&tx, &sequence_id)?);
        }

        let sequence_number = TimelineStore::next_sequence_number(&tx)?;
        env.sequence_number = Some(sequence_number);

        let outcome = match run_executor(&executor, &tx, &mut env) {
            Ok(outcome) => outcome,
            Err(err) => {
                drop(tx); // rolls back
                return Err(err);
            }
        };

        if !outcome.success {
            drop(tx); // rolls back; allocator naturally reclaims the number
            return Ok(CommandResult {
                sequence_number,
                success: false,
                error_message: outcome.error_message,
                result_data: outcome.result_data,
                suppressed: false,
            });
        }

        if env.flags.suppress_if_unchanged {
            env.post_hash = Some(Self::compute_state_hash(&tx, &sequence_id)?);
            if env.pre_hash == env.post_hash {
                drop(tx); // no-op: rollback, no history entry
                return Ok(CommandResult {
                    sequence_number,
                    success: true,
                    error_message: None,
                    result_data: outcome.result_data,
                    suppressed: true,
                });
            }
        }

        let row = CommandRow {
            id: crate::core::types::new_id(),
            parent_id: match current_head {
                Some(seq) => Some(TimelineStore::get_command(&tx, seq)?.id),
                None => None,
            },
            sequence_number,
            parent_sequence_number: current_head,
            command_type: env.command_type.clone(),
            command_args: env.parameters.clone(),
            undo_group_id: None,
            pre_hash: env.pre_hash.clone(),
            post_hash: env.post_hash.clone(),
            timestamp: env.timestamp,
            selected_clips_pre: env.selected_clips_pre.clone(),
            selected_clips: env.selected_clips.clone(),
            playhead_pre: env.playhead_pre,
            playhead: env.playhead,
            sequence_id: sequence_id.clone(),
        };
        TimelineStore::append_command(&tx, &row)?;
        TimelineStore::set_sequence_state(&tx, &sequence_id, env.playhead, &env.selected_clips)?;
        TimelineStore::set_sequence_head(&tx, &sequence_id, Some(sequence_number))?;

        let due_for_snapshot = env.flags.force_snapshot
            || (self.config.snapshot_cadence > 0
                && sequence_number % self.config.snapshot_cadence as i64 == 0);
        if due_for_snapshot {
            let clips = TimelineStore::list_clips_for_sequence(&tx, &sequence_id)?;
            TimelineStore::write_snapshot(&tx, &sequence_id, sequence_number, &clips)?;
        }

        tx.commit()?;
        // Safe only now: the transaction above is gone, so `self.store`
        // is no longer borrowed and this `&mut self` call can't alias it.
        self.note_head(&stack_key, Some(sequence_number));

        self.dispatch_mutations(&env);
        for listener in &self.listeners {
            listener.on_event(EngineEvent::Executed, &row);
        }

        Ok(CommandResult {
            sequence_number,
            success: true,
            error_message: None,
            result_data: outcome.result_data,
            suppressed: false,
        })
    }

    fn dispatch_mutations(&self, env: &CommandEnvelope) {
        if !env.mutations.is_empty() {
            for observer in &self.observers {
                observer.apply_mutations(&env.mutations);
            }
        } else if !env.flags.skip_timeline_reload {
            if let Ok(sequence_id) = env.require_str("sequence_id") {
                if let Ok(clips) =
                    TimelineStore::list_clips_for_sequence(self.store.connection(), &sequence_id)
                {
                    for observer in &self.observers {
                        observer.reload_sequence(&sequence_id, clips.clone());
                    }
                }
            }
        }
    }

    /// Undo (§4.4.4): invokes the head command's undoer, moves the
    /// head to its parent, and restores pre-state.
    pub fn undo(&mut self, key: &StackKey) -> CoreResult<CommandRow> {
        let head = self.head(key)?.ok_or(CoreError::NothingToUndo)?;
        let tx = self.store.transaction()?;
        let row = TimelineStore::get_command(&tx, head)?;
        let undoer = self.registry.undoer(&row.command_type)?;
        let mutations = undoer.undo(&tx, &row)?;

        TimelineStore::set_sequence_head(&tx, &row.sequence_id, row.parent_sequence_number)?;
        TimelineStore::set_sequence_state(&tx, &row.sequence_id, row.playhead_pre, &row.selected_clips_pre)?;
        tx.commit()?;
        self.note_head(key, row.parent_sequence_number);

        self.dispatch_mutations_for(&row.sequence_id, &mutations);
        for listener in &self.listeners {
            listener.on_event(EngineEvent::Undone, &row);
        }
        Ok(row)
    }

    /// Redo (§4.4.4): among the head's children, picks the one with the
    /// greatest `sequence_number` (the most recently created branch).
    pub fn redo(&mut self, key: &StackKey) -> CoreResult<CommandRow> {
        let candidates = self.redo_candidates(key)?;
        let row = candidates.into_iter().last().ok_or(CoreError::NothingToRedo)?;
        self.redo_specific(key, &row)
    }

    fn redo_candidates(&self, key: &StackKey) -> CoreResult<Vec<CommandRow>> {
        let conn = self.store.connection();
        let children = match self.head(key)? {
            Some(head) => TimelineStore::get_children(conn, head)?,
            None => TimelineStore::get_root_commands(conn)?,
        };
        let filtered = match key {
            StackKey::Global => children,
            StackKey::Sequence(id) => children.into_iter().filter(|c| &c.sequence_id == id).collect(),
        };
        Ok(filtered)
    }

    /// Re-executes a specific command (rather than "the latest child")
    /// — used both by `redo` and by `jump_to` when walking down a
    /// target branch that may not be the most recent one.
    fn redo_specific(&mut self, key: &StackKey, row: &CommandRow) -> CoreResult<CommandRow> {
        let executor = self.registry.executor(&row.command_type)?;
        let tx = self.store.transaction()?;
        let sequence = TimelineStore::get_sequence(&tx, &row.sequence_id)?;
        let mut env = CommandEnvelope::new(row.command_type.clone(), sequence.project_id, row.command_args.clone());
        env.sequence_number = Some(row.sequence_number);
        env.parent_sequence_number = row.parent_sequence_number;
        env.selected_clips_pre = row.selected_clips_pre.clone();
        env.playhead_pre = row.playhead_pre;

        let outcome = run_executor(&executor, &tx, &mut env)?;
        if !outcome.success {
            drop(tx);
            return Err(CoreError::ReplayCorruption(format!(
                "redo of command {} ({}) failed deterministically: {:?}",
                row.sequence_number, row.command_type, outcome.error_message
            )));
        }

        TimelineStore::set_sequence_head(&tx, &row.sequence_id, Some(row.sequence_number))?;
        TimelineStore::set_sequence_state(&tx, &row.sequence_id, row.playhead, &row.selected_clips)?;
        tx.commit()?;
        self.note_head(key, Some(row.sequence_number));

        self.dispatch_mutations(&env);
        for listener in &self.listeners {
            listener.on_event(EngineEvent::Redone, row);
        }
        Ok(row.clone())
    }

    fn dispatch_mutations_for(&self, sequence_id: &SequenceId, mutations: &TimelineMutationBuffer) {
        if !mutations.is_empty() {
            for observer in &self.observers {
                observer.apply_mutations(mutations);
            }
        } else if let Ok(clips) =
            TimelineStore::list_clips_for_sequence(self.store.connection(), sequence_id)
        {
            for observer in &self.observers {
                observer.reload_sequence(sequence_id, clips.clone());
            }
        }
    }

    /// Ancestor path from `start` up to (and including) the root,
    /// ordered node-first.
    fn path_to_root(&self, start: Option<i64>) -> CoreResult<Vec<CommandRow>> {
        let mut path = Vec::new();
        let mut cur = start;
        let conn = self.store.connection();
        while let Some(seq) = cur {
            let row = TimelineStore::get_command(conn, seq)?;
            cur = row.parent_sequence_number;
            path.push(row);
        }
        Ok(path)
    }

    /// Jumps the active head to `target_sequence_number` (§4.4.5):
    /// undoes up to the lowest common ancestor of the current head and
    /// the target, then redoes down the target's specific branch.
    pub fn jump_to(&mut self, key: &StackKey, target_sequence_number: i64) -> CoreResult<()> {
        let current = self.head(key)?;
        let mut path_current = self.path_to_root(current)?;
        let mut path_target = self.path_to_root(Some(target_sequence_number))?;
        path_current.reverse(); // root -> node
        path_target.reverse();

        let mut common = 0;
        while common < path_current.len()
            && common < path_target.len()
            && path_current[common].sequence_number == path_target[common].sequence_number
        {
            common += 1;
        }
        let lca = if common > 0 {
            Some(path_current[common - 1].sequence_number)
        } else {
            None
        };

        while self.head(key)? != lca {
            self.undo(key)?;
        }

        for row in &path_target[common..] {
            self.redo_specific(key, row)?;
        }
        Ok(())
    }

    /// Rebuilds `sequence_id`'s clip state at `target_sequence_number`
    /// from the nearest ancestor snapshot and replaying the active
    /// branch forward (§4.4.6). Mutates the live store and returns the
    /// reconstructed clip list. A replay failure leaves the store
    /// unmodified (the transaction is rolled back) and is always fatal.
    pub fn reconstruct_sequence(
        &mut self,
        sequence_id: &SequenceId,
        target_sequence_number: i64,
    ) -> CoreResult<Vec<Clip>> {
        let mut ancestor_path = self.path_to_root(Some(target_sequence_number))?;
        ancestor_path.reverse(); // root -> target

        let conn = self.store.connection();
        let candidate_snapshots = TimelineStore::snapshot_sequence_numbers(conn, sequence_id)?;
        let ancestor_numbers: std::collections::HashSet<i64> =
            ancestor_path.iter().map(|r| r.sequence_number).collect();
        let base_seq = candidate_snapshots
            .into_iter()
            .filter(|n| ancestor_numbers.contains(n) && *n <= target_sequence_number)
            .max();

        let base_clips = match base_seq {
            Some(seq) => TimelineStore::get_snapshot(conn, sequence_id, seq)?.clips,
            None => Vec::new(),
        };
        let base_seq = base_seq.unwrap_or(0);

        let chain: Vec<CommandRow> = ancestor_path
            .into_iter()
            .filter(|r| r.sequence_number > base_seq)
            .collect();

        let tx = self.store.transaction()?;
        TimelineStore::clear_clips_for_sequence(&tx, sequence_id)?;
        for clip in &base_clips {
            TimelineStore::insert_clip(&tx, clip)?;
        }

        for row in &chain {
            let executor = self
                .registry
                .executor(&row.command_type)
                .map_err(|e| CoreError::ReplayCorruption(e.to_string()))?;
            let sequence = TimelineStore::get_sequence(&tx, &row.sequence_id)?;
            let mut env =
                CommandEnvelope::new(row.command_type.clone(), sequence.project_id, row.command_args.clone());
            env.sequence_number = Some(row.sequence_number);
            let outcome = run_executor(&executor, &tx, &mut env).map_err(|e| {
                CoreError::ReplayCorruption(format!(
                    "replay of command {} ({}) raised: {e}",
                    row.sequence_number, row.command_type
                ))
            })?;
            if !outcome.success {
                return Err(CoreError::ReplayCorruption(format!(
                    "replay of command {} ({}) failed: {:?}",
                    row.sequence_number, row.command_type, outcome.error_message
                )));
            }
        }

        let clips = TimelineStore::list_clips_for_sequence(&tx, sequence_id)?;
        tx.commit()?;
        Ok(clips)
    }
}

fn run_executor(
    executor: &Arc<dyn crate::core::commands::registry::Executor>,
    tx: &rusqlite::Transaction<'_>,
    env: &mut CommandEnvelope,
) -> CoreResult<ExecOutcome> {
    tracing::debug!(command_type = %env.command_type, sequence_number = ?env.sequence_number, "executing command");
    executor.execute(tx, env)
}
