//! The command envelope ("command bag"): what a caller hands the engine
//! and what executors mutate in place. Engine-reserved parameter keys
//! begin with `__` (§6) so the external JSON form can carry flags
//! without a separate schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::model::{Clip, SelectionSnapshot};
use crate::core::types::{ClipId, ProjectId, SequenceId, TrackId};

/// Engine-only behavior toggles. Settable either as structured fields
/// (when constructing a `CommandEnvelope` directly) or as `__`-prefixed
/// keys inside `parameters` (when the bag arrives as JSON from a CLI or
/// script caller); `CommandFlags::extract` reconciles both.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CommandFlags {
    pub suppress_if_unchanged: bool,
    pub skip_selection_snapshot: bool,
    pub skip_timeline_reload: bool,
    pub force_snapshot: bool,
    pub dry_run: bool,
}

impl CommandFlags {
    const SUPPRESS: &'static str = "__suppress_if_unchanged";
    const SKIP_SELECTION: &'static str = "__skip_selection_snapshot";
    const SKIP_RELOAD: &'static str = "__skip_timeline_reload";
    const FORCE_SNAPSHOT: &'static str = "__force_snapshot";
    const DRY_RUN: &'static str = "__dry_run";

    /// Merges structured flags with any `__`-prefixed parameter keys,
    /// then strips those keys out of `parameters` so executors never
    /// see engine-reserved fields.
    pub fn extract(mut self, parameters: &mut Map<String, Value>) -> Self {
        if let Some(true) = parameters.remove(Self::SUPPRESS).and_then(|v| v.as_bool()) {
            self.suppress_if_unchanged = true;
        }
        if let Some(true) = parameters
            .remove(Self::SKIP_SELECTION)
            .and_then(|v| v.as_bool())
        {
            self.skip_selection_snapshot = true;
        }
        if let Some(true) = parameters.remove(Self::SKIP_RELOAD).and_then(|v| v.as_bool()) {
            self.skip_timeline_reload = true;
        }
        if let Some(true) = parameters
            .remove(Self::FORCE_SNAPSHOT)
            .and_then(|v| v.as_bool())
        {
            self.force_snapshot = true;
        }
        if let Some(true) = parameters.remove(Self::DRY_RUN).and_then(|v| v.as_bool()) {
            self.dry_run = true;
        }
        // Reserved but not a boolean flag; executors read it via
        // `CommandEnvelope::snapshot_sequence_ids`.
        parameters.remove("__snapshot_sequence_ids");
        parameters.remove("__timeline_mutations");
        self
    }
}

/// A single clip mutation, carrying the full per-clip payload so
/// observers can update a cache without a round trip to the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClipMutation {
    Insert(Clip),
    Update(Clip),
    Delete(ClipId),
}

/// A recorded bulk shift (ripple), so observers can apply it directly
/// instead of reloading every shifted clip individually.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkShift {
    pub track_id: TrackId,
    pub anchor_frame: i64,
    pub delta_frames: i64,
    pub clip_ids: Vec<ClipId>,
}

/// Per-sequence mutation set an executor pushes into during execution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SequenceMutations {
    pub clips: Vec<ClipMutation>,
    pub bulk_shifts: Vec<BulkShift>,
}

/// The `__timeline_mutations` side-channel: `sequence_id -> mutations`.
/// Populated by executors/undoers so the engine can push incremental
/// updates to subscribers instead of a full sequence reload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimelineMutationBuffer {
    pub by_sequence: std::collections::HashMap<SequenceId, SequenceMutations>,
}

impl TimelineMutationBuffer {
    pub fn is_empty(&self) -> bool {
        self.by_sequence.is_empty()
    }

    fn entry(&mut self, sequence_id: &SequenceId) -> &mut SequenceMutations {
        self.by_sequence
            .entry(sequence_id.clone())
            .or_insert_with(SequenceMutations::default)
    }

    pub fn record_insert(&mut self, sequence_id: &SequenceId, clip: Clip) {
        self.entry(sequence_id).clips.push(ClipMutation::Insert(clip));
    }

    pub fn record_update(&mut self, sequence_id: &SequenceId, clip: Clip) {
        self.entry(sequence_id).clips.push(ClipMutation::Update(clip));
    }

    pub fn record_delete(&mut self, sequence_id: &SequenceId, clip_id: ClipId) {
        self.entry(sequence_id)
            .clips
            .push(ClipMutation::Delete(clip_id));
    }

    pub fn record_bulk_shift(&mut self, sequence_id: &SequenceId, shift: BulkShift) {
        self.entry(sequence_id).bulk_shifts.push(shift);
    }

    pub fn merge(&mut self, other: TimelineMutationBuffer) {
        for (seq_id, muts) in other.by_sequence {
            let entry = self.entry(&seq_id);
            entry.clips.extend(muts.clips);
            entry.bulk_shifts.extend(muts.bulk_shifts);
        }
    }
}

/// Structured result an executor returns. `result_data` carries
/// executor-specific payloads: ids generated so replay can reuse them,
/// or a dry-run preview (shape documented per command, per §9 open
/// question 3).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub success: bool,
    pub error_message: Option<String>,
    pub result_data: Option<Value>,
}

impl ExecOutcome {
    pub fn ok(result_data: Value) -> Self {
        Self {
            success: true,
            error_message: None,
            result_data: Some(result_data),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            error_message: None,
            result_data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            result_data: None,
        }
    }
}

/// What a caller hands the engine, and what executors mutate in place
/// over the course of `CommandEngine::execute`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_type: String,
    pub project_id: ProjectId,
    /// Arbitrary JSON-serializable parameters, after `__`-prefixed
    /// engine flags have been stripped out by `CommandFlags::extract`.
    pub parameters: Value,
    /// Assigned by the engine once the transaction opens.
    pub sequence_number: Option<i64>,
    /// Assigned by the engine as the current head at time of execution.
    pub parent_sequence_number: Option<i64>,
    pub pre_hash: Option<String>,
    pub post_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub selected_clips_pre: SelectionSnapshot,
    pub selected_clips: SelectionSnapshot,
    pub playhead_pre: i64,
    pub playhead: i64,
    pub flags: CommandFlags,
    #[serde(skip)]
    pub mutations: TimelineMutationBuffer,
}

impl CommandEnvelope {
    pub fn new(command_type: impl Into<String>, project_id: ProjectId, mut parameters: Value) -> Self {
        let flags = if let Some(map) = parameters.as_object_mut() {
            CommandFlags::default().extract(map)
        } else {
            CommandFlags::default()
        };
        Self {
            command_type: command_type.into(),
            project_id,
            parameters,
            sequence_number: None,
            parent_sequence_number: None,
            pre_hash: None,
            post_hash: None,
            timestamp: Utc::now(),
            selected_clips_pre: SelectionSnapshot::default(),
            selected_clips: SelectionSnapshot::default(),
            playhead_pre: 0,
            playhead: 0,
            flags,
            mutations: TimelineMutationBuffer::default(),
        }
    }

    /// Fetches a required string parameter, e.g. a clip or track id.
    pub fn require_str(&self, key: &str) -> crate::core::error::CoreResult<String> {
        self.parameters
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                crate::core::error::CoreError::InvalidArgument(format!("missing parameter `{key}`"))
            })
    }

    /// Fetches an optional string parameter (used for ids executors
    /// should reuse when replaying, e.g. `clip_id`).
    pub fn opt_str(&self, key: &str) -> Option<String> {
        self.parameters.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn require_i64(&self, key: &str) -> crate::core::error::CoreResult<i64> {
        self.parameters.get(key).and_then(|v| v.as_i64()).ok_or_else(|| {
            crate::core::error::CoreError::InvalidArgument(format!("missing parameter `{key}`"))
        })
    }

    pub fn opt_i64(&self, key: &str) -> Option<i64> {
        self.parameters.get(key).and_then(|v| v.as_i64())
    }

    pub fn require_bool(&self, key: &str, default: bool) -> bool {
        self.parameters
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Sets (or overwrites) a parameter, used by executors to record a
    /// freshly generated id so replay can reuse it (§4.4.6).
    pub fn set_param(&mut self, key: &str, value: Value) {
        if let Some(map) = self.parameters.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}
