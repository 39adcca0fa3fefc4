//! `split_clip`: cuts one timeline clip into two at a frame inside its
//! bounds (§4.4.8). Neither half moves; the second half's id is
//! generated on first execution and reused on replay. Undo is purely
//! derived from the two halves' current state — no extra bookkeeping is
//! needed since `original.duration == first.duration + second.duration`
//! and `original.source_out == second.source_out` hold by construction.

use rusqlite::Transaction;

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::{CoreError, CoreResult};
use crate::core::store::{CommandRow, TimelineStore};
use crate::core::types::new_id;

pub const COMMAND_TYPE: &str = "split_clip";

pub struct SplitClipExecutor;

impl Executor for SplitClipExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let clip_id = env.require_str("clip_id")?;
        let split_time = env.require_i64("split_time_frame")?;

        let original = TimelineStore::get_clip(tx, &clip_id)?;
        let offset = split_time - original.timeline_start_frame;
        if offset <= 0 || offset >= original.duration_frames {
            return Ok(ExecOutcome::failure(
                "split point must fall strictly inside the clip",
            ));
        }

        let second_id = env.opt_str("second_clip_id").unwrap_or_else(new_id);
        env.set_param("second_clip_id", second_id.clone().into());

        let mut first = original.clone();
        first.duration_frames = offset;
        first.source_out_frame = original.source_in_frame + offset;

        let mut second = original.clone();
        second.id = second_id.clone();
        second.timeline_start_frame = split_time;
        second.duration_frames = original.duration_frames - offset;
        second.source_in_frame = original.source_in_frame + offset;
        second.source_out_frame = original.source_out_frame;

        TimelineStore::update_clip(tx, &first)?;
        TimelineStore::insert_clip(tx, &second)?;

        env.mutations.record_update(&sequence_id, first.clone());
        env.mutations.record_insert(&sequence_id, second.clone());

        Ok(ExecOutcome::ok(serde_json::json!({ "second_clip_id": second_id })))
    }
}

pub struct SplitClipUndoer;

impl Undoer for SplitClipUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let clip_id = stored
            .command_args
            .get("clip_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::InternalInvariant("split_clip undo missing clip_id".into()))?;
        let second_id = stored
            .command_args
            .get("second_clip_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CoreError::InternalInvariant("split_clip undo missing second_clip_id".into()))?;

        let first = TimelineStore::get_clip(tx, clip_id)?;
        let second = TimelineStore::get_clip(tx, second_id)?;

        let mut restored = first.clone();
        restored.duration_frames = first.duration_frames + second.duration_frames;
        restored.source_out_frame = second.source_out_frame;

        TimelineStore::delete_clip(tx, second_id)?;
        TimelineStore::update_clip(tx, &restored)?;

        let mut mutations = TimelineMutationBuffer::default();
        mutations.record_delete(&stored.sequence_id, second_id.to_string());
        mutations.record_update(&stored.sequence_id, restored);
        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Clip, ClipKind, Project, Sequence, Track, TrackType};
    use crate::core::types::ProjectId;

    fn setup_with_clip() -> (TimelineStore, String, String) {
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
        let clip = Clip {
            id: "clip1".into(),
            project_id,
            clip_kind: ClipKind::Timeline,
            source_sequence_id: None,
            parent_clip_id: None,
            owner_sequence_id: seq.id.clone(),
            track_id: track.id.clone(),
            media_id: None,
            name: "c".into(),
            timeline_start_frame: 3618,
            duration_frames: 3000,
            source_in_frame: 0,
            source_out_frame: 3000,
            fps_numerator: 30,
            fps_denominator: 1,
            enabled: true,
            offline: false,
            mark_in_frame: None,
            mark_out_frame: None,
            playhead_frame: None,
        };
        TimelineStore::insert_clip(conn, &clip).unwrap();
        (store, seq.id, clip.id)
    }

    #[test]
    fn split_then_undo_restores_single_clip() {
        let (mut store, sequence_id, clip_id) = setup_with_clip();
        let mut env = CommandEnvelope::new(
            COMMAND_TYPE,
            "proj1".to_string(),
            serde_json::json!({
                "sequence_id": sequence_id,
                "clip_id": clip_id,
                "split_time_frame": 3618 + 1200,
            }),
        );
        let tx = store.transaction().unwrap();
        let outcome = SplitClipExecutor.execute(&tx, &mut env).unwrap();
        assert!(outcome.success);
        tx.commit().unwrap();

        let first = TimelineStore::get_clip(store.connection(), &clip_id).unwrap();
        assert_eq!(first.duration_frames, 1200);
        let second_id = env.opt_str("second_clip_id").unwrap();
        let second = TimelineStore::get_clip(store.connection(), &second_id).unwrap();
        assert_eq!(second.duration_frames, 1800);
        assert_eq!(second.source_in_frame, 1200);

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
        SplitClipUndoer.undo(&tx, &row).unwrap();
        tx.commit().unwrap();

        let restored = TimelineStore::get_clip(store.connection(), &clip_id).unwrap();
        assert_eq!(restored.duration_frames, 3000);
        assert_eq!(restored.source_out_frame, 3000);
        assert!(TimelineStore::get_clip(store.connection(), &second_id).is_err());
    }
}
