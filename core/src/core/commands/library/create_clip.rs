//! `create_clip`: places a new timeline clip on a track without
//! touching any other clip (§4.4.8). The caller supplies the timeline
//! and source windows directly; overlapping the target track is a hard
//! error on video tracks, never an implicit ripple or overwrite.

use rusqlite::Transaction;

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::CoreResult;
use crate::core::model::{Clip, ClipKind};
use crate::core::store::{CommandRow, TimelineStore};
use crate::core::types::new_id;

pub const COMMAND_TYPE: &str = "create_clip";

pub struct CreateClipExecutor;

impl Executor for CreateClipExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let track_id = env.require_str("track_id")?;
        let clip_id = env.opt_str("clip_id").unwrap_or_else(new_id);
        env.set_param("clip_id", clip_id.clone().into());

        let clip = Clip {
            id: clip_id.clone(),
            project_id: env.project_id.clone(),
            clip_kind: ClipKind::Timeline,
            source_sequence_id: env.opt_str("source_sequence_id"),
            parent_clip_id: env.opt_str("parent_clip_id"),
            owner_sequence_id: sequence_id.clone(),
            track_id: track_id.clone(),
            media_id: env.opt_str("media_id"),
            name: env.opt_str("name").unwrap_or_else(|| "Clip".to_string()),
            timeline_start_frame: env.require_i64("timeline_start_frame")?,
            duration_frames: env.require_i64("duration_frames")?,
            source_in_frame: env.require_i64("source_in_frame")?,
            source_out_frame: env.require_i64("source_out_frame")?,
            fps_numerator: env.opt_i64("fps_numerator").unwrap_or(30) as u32,
            fps_denominator: env.opt_i64("fps_denominator").unwrap_or(1) as u32,
            enabled: true,
            offline: false,
            mark_in_frame: None,
            mark_out_frame: None,
            playhead_frame: None,
        };

        if !clip.has_positive_duration() {
            return Ok(ExecOutcome::failure("clip duration must be positive"));
        }
        if !clip.source_window_covers_duration() {
            return Ok(ExecOutcome::failure(
                "source window must cover the timeline duration",
            ));
        }

        match TimelineStore::insert_clip(tx, &clip) {
            Ok(()) => {
                env.mutations.record_insert(&sequence_id, clip.clone());
                Ok(ExecOutcome::ok(serde_json::json!({ "clip_id": clip_id })))
            }
            Err(crate::core::error::CoreError::VideoOverlap { .. }) => {
                Ok(ExecOutcome::failure("clip would overlap an existing clip on this track"))
            }
            Err(err) => Err(err),
        }
    }
}

pub struct CreateClipUndoer;

impl Undoer for CreateClipUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let clip_id: String = stored
            .command_args
            .get("clip_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                crate::core::error::CoreError::InternalInvariant("create_clip undo missing clip_id".into())
            })?
            .to_string();
        TimelineStore::delete_clip(tx, &clip_id)?;
        let mut mutations = TimelineMutationBuffer::default();
        mutations.record_delete(&stored.sequence_id, clip_id);
        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Sequence, Track, TrackType};
    use crate::core::store::TimelineStore;
    use crate::core::types::ProjectId;

    fn setup() -> (TimelineStore, String, String) {
        let mut store = TimelineStore::in_memory().unwrap();
        let project_id: ProjectId = "proj1".into();
        let seq = Sequence::new(project_id.clone(), "seq", 30, 1);
        let track = Track::new(seq.id.clone(), TrackType::Video, 1);
        {
            let conn = store.connection();
            crate::core::store::TimelineStore::insert_project(
                conn,
                &crate::core::model::Project::new("p"),
            )
            .ok();
        }
        let conn = store.connection();
        TimelineStore::insert_sequence(conn, &seq).unwrap();
        TimelineStore::insert_track(conn, &track).unwrap();
        (store, seq.id, track.id)
    }

    #[test]
    fn create_then_undo_removes_clip() {
        let (mut store, sequence_id, track_id) = setup();
        let mut env = CommandEnvelope::new(
            COMMAND_TYPE,
            "proj1".to_string(),
            serde_json::json!({
                "sequence_id": sequence_id,
                "track_id": track_id,
                "timeline_start_frame": 0,
                "duration_frames": 100,
                "source_in_frame": 0,
                "source_out_frame": 100,
            }),
        );
        let tx = store.transaction().unwrap();
        let outcome = CreateClipExecutor.execute(&tx, &mut env).unwrap();
        assert!(outcome.success);
        let clip_id = env.opt_str("clip_id").unwrap();
        tx.commit().unwrap();

        assert!(TimelineStore::get_clip(store.connection(), &clip_id).is_ok());

        let row = CommandRow {
            id: "cmd1".into(),
            parent_id: None,
            sequence_number: 1,
            parent_sequence_number: None,
            command_type: COMMAND_TYPE.into(),
            command_args: env.parameters.clone(),
            undo_group_id: None,
            pre_hash: None,
            post_hash: None,
            timestamp: chrono::Utc::now(),
            selected_clips_pre: Default::default(),
            selected_clips: Default::default(),
            playhead_pre: 0,
            playhead: 0,
            sequence_id: sequence_id.clone(),
        };
        let tx = store.transaction().unwrap();
        CreateClipUndoer.undo(&tx, &row).unwrap();
        tx.commit().unwrap();
        assert!(TimelineStore::get_clip(store.connection(), &clip_id).is_err());
    }
}
