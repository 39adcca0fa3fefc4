//! `ripple_edit`: trims one clip edge or gap without moving the edited
//! clip, then shifts every clip on every track at or after the ripple
//! point by the resulting delta (§4.3, §4.4.8).

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::library::ripple::{self, RippleTarget};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::{CoreError, CoreResult};
use crate::core::store::{CommandRow, TimelineStore};
use crate::core::types::{ClipId, TrackId};

pub const COMMAND_TYPE: &str = "ripple_edit";

#[derive(Serialize, Deserialize)]
struct RippleEditRecord {
    excludes: Vec<(TrackId, ClipId)>,
    ripple_point: i64,
    shift_delta: i64,
    /// The trimmed clip's state before the edit, if the target was a
    /// real clip (gap targets update no clip).
    previous_clip: Option<crate::core::model::Clip>,
}

pub struct RippleEditExecutor;

impl Executor for RippleEditExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let target: RippleTarget = serde_json::from_value(
            env.parameters
                .get("target")
                .cloned()
                .ok_or_else(|| CoreError::InvalidArgument("missing parameter `target`".into()))?,
        )?;
        let requested_delta = env.require_i64("requested_delta_frames")?;

        let resolution = match ripple::resolve(tx, &sequence_id, &target, requested_delta)? {
            Some(r) => r,
            None => return Ok(ExecOutcome::failure("ripple target has no adjacent content on that side")),
        };

        let previous_clip = match &resolution.updated_clip {
            Some(updated) => {
                let previous = TimelineStore::get_clip(tx, &updated.id)?;
                TimelineStore::update_clip(tx, updated)?;
                env.mutations.record_update(&sequence_id, updated.clone());
                Some(previous)
            }
            None => None,
        };

        let excludes: Vec<(TrackId, ClipId)> = resolution.home_track_exclude.clone().into_iter().collect();
        ripple::apply_shift(
            tx,
            &sequence_id,
            &excludes,
            resolution.ripple_point,
            resolution.shift_delta,
            &mut env.mutations,
        )?;

        let record = RippleEditRecord {
            excludes,
            ripple_point: resolution.ripple_point,
            shift_delta: resolution.shift_delta,
            previous_clip,
        };
        env.set_param("__ripple_record", serde_json::to_value(&record)?);

        Ok(ExecOutcome::ok(serde_json::json!({
            "applied_delta": resolution.applied_delta,
        })))
    }
}

pub struct RippleEditUndoer;

impl Undoer for RippleEditUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let record: RippleEditRecord = serde_json::from_value(
            stored
                .command_args
                .get("__ripple_record")
                .cloned()
                .ok_or_else(|| CoreError::InternalInvariant("ripple_edit undo missing record".into()))?,
        )?;

        let mut mutations = TimelineMutationBuffer::default();
        ripple::undo_shift(
            tx,
            &stored.sequence_id,
            &record.excludes,
            record.ripple_point,
            record.shift_delta,
            &mut mutations,
        )?;

        if let Some(previous) = record.previous_clip {
            TimelineStore::update_clip(tx, &previous)?;
            mutations.record_update(&stored.sequence_id, previous);
        }
        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Clip, ClipKind, Edge, Project, Sequence, Track, TrackType};
    use crate::core::store::TimelineStore;

    fn clip(id: &str, seq: &str, track: &str, start: i64, dur: i64) -> Clip {
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

    #[test]
    fn ripple_trim_in_edge_preserves_clip_position_and_shifts_downstream() {
        let mut store = TimelineStore::in_memory().unwrap();
        TimelineStore::insert_project(store.connection(), &Project {
            id: "proj1".into(),
            name: "p".into(),
            settings: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            modified_at: chrono::Utc::now(),
        })
        .unwrap();
        let seq = Sequence::new("proj1".to_string(), "seq", 30, 1);
        let track = Track::new(seq.id.clone(), TrackType::Video, 1);
        let conn = store.connection();
        TimelineStore::insert_sequence(conn, &seq).unwrap();
        TimelineStore::insert_track(conn, &track).unwrap();

        let mut x = clip("x", &seq.id, &track.id, 3618, 3000);
        x.source_in_frame = 0;
        x.source_out_frame = 3000;
        TimelineStore::insert_clip(conn, &x).unwrap();
        let downstream = clip("y", &seq.id, &track.id, 6618, 500);
        TimelineStore::insert_clip(conn, &downstream).unwrap();

        let mut env = CommandEnvelope::new(
            COMMAND_TYPE,
            "proj1".to_string(),
            serde_json::json!({
                "sequence_id": seq.id,
                "target": { "kind": "clip", "clip_id": "x", "edge": "in" },
                "requested_delta_frames": 500,
            }),
        );
        let tx = store.transaction().unwrap();
        let outcome = RippleEditExecutor.execute(&tx, &mut env).unwrap();
        assert!(outcome.success);
        tx.commit().unwrap();

        let x_after = TimelineStore::get_clip(store.connection(), "x").unwrap();
        assert_eq!(x_after.timeline_start_frame, 3618); // position unchanged
        assert_eq!(x_after.duration_frames, 2500);
        assert_eq!(x_after.source_in_frame, 500);

        let y_after = TimelineStore::get_clip(store.connection(), "y").unwrap();
        assert_eq!(y_after.timeline_start_frame, 6118); // shifted -500
    }
}
