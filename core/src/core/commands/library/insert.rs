//! `insert`: ripples every clip on the target track at or after the
//! insert point forward by the new clip's duration, then places the new
//! clip in the opened gap (§4.4.8). Unlike `ripple_edit`, the shift is
//! confined to the target track only — an insert edit does not ripple
//! parallel tracks.

use rusqlite::Transaction;

use crate::core::commands::bag::{BulkShift, CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::CoreResult;
use crate::core::model::{Clip, ClipKind};
use crate::core::store::{CommandRow, TimelineStore};
use crate::core::types::new_id;

pub const COMMAND_TYPE: &str = "insert";

pub struct InsertExecutor;

impl Executor for InsertExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let track_id = env.require_str("track_id")?;
        let insert_time = env.require_i64("timeline_start_frame")?;
        let duration = env.require_i64("duration_frames")?;
        if duration <= 0 {
            return Ok(ExecOutcome::failure("insert duration must be positive"));
        }

        let clip_id = env.opt_str("clip_id").unwrap_or_else(new_id);
        env.set_param("clip_id", clip_id.clone().into());

        let shifted = TimelineStore::bulk_shift_track(tx, &track_id, insert_time, duration)?;
        if !shifted.is_empty() {
            env.mutations.record_bulk_shift(
                &sequence_id,
                BulkShift {
                    track_id: track_id.clone(),
                    anchor_frame: insert_time,
                    delta_frames: duration,
                    clip_ids: shifted,
                },
            );
        }

        let clip = Clip {
            id: clip_id.clone(),
            project_id: env.project_id.clone(),
            clip_kind: ClipKind::Timeline,
            source_sequence_id: env.opt_str("source_sequence_id"),
            parent_clip_id: None,
            owner_sequence_id: sequence_id.clone(),
            track_id: track_id.clone(),
            media_id: env.opt_str("media_id"),
            name: env.opt_str("name").unwrap_or_else(|| "Clip".to_string()),
            timeline_start_frame: insert_time,
            duration_frames: duration,
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
        TimelineStore::insert_clip(tx, &clip)?;
        env.mutations.record_insert(&sequence_id, clip);

        Ok(ExecOutcome::ok(serde_json::json!({ "clip_id": clip_id })))
    }
}

pub struct InsertUndoer;

impl Undoer for InsertUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let clip_id = stored
            .command_args
            .get("clip_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                crate::core::error::CoreError::InternalInvariant("insert undo missing clip_id".into())
            })?
            .to_string();
        let track_id = stored
            .command_args
            .get("track_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                crate::core::error::CoreError::InternalInvariant("insert undo missing track_id".into())
            })?
            .to_string();
        let insert_time = stored
            .command_args
            .get("timeline_start_frame")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                crate::core::error::CoreError::InternalInvariant("insert undo missing timeline_start_frame".into())
            })?;
        let duration = stored
            .command_args
            .get("duration_frames")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                crate::core::error::CoreError::InternalInvariant("insert undo missing duration_frames".into())
            })?;

        TimelineStore::delete_clip(tx, &clip_id)?;
        let mut mutations = TimelineMutationBuffer::default();
        mutations.record_delete(&stored.sequence_id, clip_id);

        let shifted = TimelineStore::bulk_shift_track(tx, &track_id, insert_time + duration, -duration)?;
        if !shifted.is_empty() {
            mutations.record_bulk_shift(
                &stored.sequence_id,
                BulkShift {
                    track_id,
                    anchor_frame: insert_time + duration,
                    delta_frames: -duration,
                    clip_ids: shifted,
                },
            );
        }
        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Project, Sequence, Track, TrackType};
    use crate::core::types::ProjectId;

    fn setup() -> (TimelineStore, String, String) {
        let mut store = TimelineStore::in_memory().unwrap();
        let project_id: ProjectId = "proj1".into();
        TimelineStore::insert_project(store.connection(), &Project {
            id: project_id.clone(),
            name: "p".into(),
            settings: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
        })
        .unwrap();
        let seq = Sequence::new(project_id.clone(), "seq", 30, 1);
        let track = Track::new(seq.id.clone(), TrackType::Video, 1);
        let conn = store.connection();
        TimelineStore::insert_sequence(conn, &seq).unwrap();
        TimelineStore::insert_track(conn, &track).unwrap();

        let existing = Clip::make("existing", &seq.id, &track.id, 1000, 500);
        TimelineStore::insert_clip(conn, &existing).unwrap();

        (store, seq.id, track.id)
    }

    // Small test-only constructor so these fixtures read compactly.
    trait TestClip {
        fn make(id: &str, seq: &str, track: &str, start: i64, dur: i64) -> Clip;
    }
    impl TestClip for Clip {
        fn make(id: &str, seq: &str, track: &str, start: i64, dur: i64) -> Clip {
            Clip {
                id: id.into(),
                project_id: "proj1".into(),
                clip_kind: ClipKind::Timeline,
                source_sequence_id: None,
                parent_clip_id: None,
                owner_sequence_id: seq.into(),
                track_id: track.into(),
                media_id: None,
                name: id.into(),
                timeline_start_frame: start,
                duration_frames: dur,
                source_in_frame: 0,
                source_out_frame: dur,
                fps_numerator: 30,
                fps_denominator: 1,
                enabled: true,
                offline: false,
                mark_in_frame: None,
                mark_out_frame: None,
                playhead_frame: None,
            }
        }
    }

    #[test]
    fn insert_ripples_downstream_clips_on_same_track() {
        let (mut store, sequence_id, track_id) = setup();
        let mut env = CommandEnvelope::new(
            COMMAND_TYPE,
            "proj1".to_string(),
            serde_json::json!({
                "sequence_id": sequence_id,
                "track_id": track_id,
                "timeline_start_frame": 500,
                "duration_frames": 200,
                "source_in_frame": 0,
                "source_out_frame": 200,
            }),
        );
        let tx = store.transaction().unwrap();
        let outcome = InsertExecutor.execute(&tx, &mut env).unwrap();
        assert!(outcome.success);
        tx.commit().unwrap();

        let existing = TimelineStore::get_clip(store.connection(), "existing").unwrap();
        assert_eq!(existing.timeline_start_frame, 1200);
    }

    #[test]
    fn insert_then_undo_restores_original_positions() {
        let (mut store, sequence_id, track_id) = setup();
        let mut env = CommandEnvelope::new(
            COMMAND_TYPE,
            "proj1".to_string(),
            serde_json::json!({
                "sequence_id": sequence_id,
                "track_id": track_id,
                "timeline_start_frame": 500,
                "duration_frames": 200,
                "source_in_frame": 0,
                "source_out_frame": 200,
            }),
        );
        let tx = store.transaction().unwrap();
        InsertExecutor.execute(&tx, &mut env).unwrap();
        tx.commit().unwrap();
        let clip_id = env.opt_str("clip_id").unwrap();

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
        InsertUndoer.undo(&tx, &row).unwrap();
        tx.commit().unwrap();

        assert!(TimelineStore::get_clip(store.connection(), &clip_id).is_err());
        let existing = TimelineStore::get_clip(store.connection(), "existing").unwrap();
        assert_eq!(existing.timeline_start_frame, 1000);
    }
}
