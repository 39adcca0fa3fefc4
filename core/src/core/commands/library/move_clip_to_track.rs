//! `move_clip_to_track`: reassigns a clip to a different track within
//! the same sequence without changing its timeline position (§4.4.8).
//! Moving onto a video track that already has something at that span is
//! a hard error, same as any other video-track write.

use rusqlite::Transaction;

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::CoreResult;
use crate::core::store::{CommandRow, TimelineStore};

pub const COMMAND_TYPE: &str = "move_clip_to_track";

pub struct MoveClipToTrackExecutor;

impl Executor for MoveClipToTrackExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let clip_id = env.require_str("clip_id")?;
        let target_track_id = env.require_str("target_track_id")?;

        let mut clip = TimelineStore::get_clip(tx, &clip_id)?;
        let target_track = TimelineStore::get_track(tx, &target_track_id)?;
        if target_track.sequence_id != sequence_id {
            return Ok(ExecOutcome::failure(
                "target track does not belong to this sequence",
            ));
        }
        env.set_param("original_track_id", clip.track_id.clone().into());

        clip.track_id = target_track_id;
        match TimelineStore::update_clip(tx, &clip) {
            Ok(()) => {
                env.mutations.record_update(&sequence_id, clip);
                Ok(ExecOutcome::ok_empty())
            }
            Err(crate::core::error::CoreError::VideoOverlap { .. }) => {
                Ok(ExecOutcome::failure("clip would overlap an existing clip on the target track"))
            }
            Err(err) => Err(err),
        }
    }
}

pub struct MoveClipToTrackUndoer;

impl Undoer for MoveClipToTrackUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let clip_id = stored
            .command_args
            .get("clip_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                crate::core::error::CoreError::InternalInvariant("move_clip_to_track undo missing clip_id".into())
            })?;
        let original_track_id = stored
            .command_args
            .get("original_track_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                crate::core::error::CoreError::InternalInvariant(
                    "move_clip_to_track undo missing original_track_id".into(),
                )
            })?
            .to_string();

        let mut clip = TimelineStore::get_clip(tx, clip_id)?;
        clip.track_id = original_track_id;
        TimelineStore::update_clip(tx, &clip)?;

        let mut mutations = TimelineMutationBuffer::default();
        mutations.record_update(&stored.sequence_id, clip);
        Ok(mutations)
    }
}
