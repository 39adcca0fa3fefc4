//! `batch_ripple_edit`: ripple-trims several parallel edges (one per
//! track, e.g. cutting a multi-camera sequence at the same moment) to a
//! single shared Δ, then applies exactly one downstream shift at the
//! earliest ripple point rather than one shift per edge — the tracks
//! are parallel representations of the same cut, not independent edits
//! to be summed (§4.4.8).
//!
//! Edges on the "closing" side of the cut (an in-edge, or a gap) take
//! the negated shared Δ so that every edge moves the same physical cut
//! point; edges on the "opening" side (an out-edge) take Δ directly.
//! An edge that resolves to an infinite/open gap (no neighbor on the
//! requested side) contributes nothing and is skipped.

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::library::ripple::{self, RippleResolution, RippleTarget};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::{CoreError, CoreResult};
use crate::core::model::{Clip, Edge};
use crate::core::store::{CommandRow, TimelineStore};
use crate::core::types::{ClipId, TrackId};

pub const COMMAND_TYPE: &str = "batch_ripple_edit";

fn is_closing(target: &RippleTarget) -> bool {
    matches!(
        target,
        RippleTarget::Clip { edge: Edge::In, .. } | RippleTarget::Gap { .. }
    )
}

#[derive(Serialize, Deserialize)]
struct BatchRecord {
    updated_clips: Vec<(ClipId, Clip)>, // (id, previous state)
    excludes: Vec<(TrackId, ClipId)>,
    ripple_point: i64,
    shift_delta: i64,
}

pub struct BatchRippleEditExecutor;

impl Executor for BatchRippleEditExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let targets: Vec<RippleTarget> = serde_json::from_value(
            env.parameters
                .get("targets")
                .cloned()
                .ok_or_else(|| CoreError::InvalidArgument("missing parameter `targets`".into()))?,
        )?;
        let shared_delta = env.require_i64("requested_delta_frames")?;

        // First pass: resolve every edge's bound in shared-delta space
        // and intersect them to find the most restrictive Δ.
        let mut resolutions: Vec<(RippleTarget, RippleResolution)> = Vec::new();
        let mut min_bound = i64::MIN;
        let mut max_bound = i64::MAX;
        for target in &targets {
            let effective = if is_closing(target) { -shared_delta } else { shared_delta };
            let resolution = match ripple::resolve(tx, &sequence_id, target, effective)? {
                Some(r) => r,
                None => continue, // infinite gap: contributes nothing
            };
            // The clamp already happened inside `resolve`; recover the
            // bound it used by noting how far `applied_delta` is from
            // what was requested, translated back into shared units.
            let applied_shared = if is_closing(target) {
                -resolution.applied_delta
            } else {
                resolution.applied_delta
            };
            if shared_delta >= 0 {
                max_bound = max_bound.min(applied_shared.max(0));
            } else {
                min_bound = min_bound.max(applied_shared.min(0));
            }
            resolutions.push((target.clone(), resolution));
        }
        if resolutions.is_empty() {
            return Ok(ExecOutcome::ok_empty());
        }
        let final_shared = shared_delta.clamp(min_bound, max_bound);

        // Second pass: re-resolve every edge against the final shared Δ
        // (cheap; these are in-memory clamps against data already read)
        // and apply its trim, without yet applying any shift.
        let mut updated_clips = Vec::new();
        let mut excludes: Vec<(TrackId, ClipId)> = Vec::new();
        let mut chosen_shift: Option<(i64, i64)> = None; // (ripple_point, delta)
        for target in &targets {
            let effective = if is_closing(target) { -final_shared } else { final_shared };
            let resolution = match ripple::resolve(tx, &sequence_id, target, effective)? {
                Some(r) => r,
                None => continue,
            };
            if let Some(updated) = &resolution.updated_clip {
                let previous = TimelineStore::get_clip(tx, &updated.id)?;
                TimelineStore::update_clip(tx, updated)?;
                env.mutations.record_update(&sequence_id, updated.clone());
                updated_clips.push((updated.id.clone(), previous));
            }
            excludes.extend(resolution.home_track_exclude.clone());
            if chosen_shift.is_none() || resolution.ripple_point < chosen_shift.unwrap().0 {
                chosen_shift = Some((resolution.ripple_point, resolution.shift_delta));
            }
        }

        let (ripple_point, shift_delta) = chosen_shift.unwrap_or((0, 0));
        ripple::apply_shift(tx, &sequence_id, &excludes, ripple_point, shift_delta, &mut env.mutations)?;

        let record = BatchRecord {
            updated_clips,
            excludes,
            ripple_point,
            shift_delta,
        };
        env.set_param("__batch_ripple_record", serde_json::to_value(&record)?);

        Ok(ExecOutcome::ok(serde_json::json!({ "applied_delta": final_shared })))
    }
}

pub struct BatchRippleEditUndoer;

impl Undoer for BatchRippleEditUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let record: BatchRecord = serde_json::from_value(
            stored
                .command_args
                .get("__batch_ripple_record")
                .cloned()
                .ok_or_else(|| CoreError::InternalInvariant("batch_ripple_edit undo missing record".into()))?,
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
        for (_, previous) in record.updated_clips {
            TimelineStore::update_clip(tx, &previous)?;
            mutations.record_update(&stored.sequence_id, previous);
        }
        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ClipKind, Project, Sequence, Track, TrackType};
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
    fn batch_ripple_applies_single_shift_for_parallel_out_edges() {
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
        let video = Track::new(seq.id.clone(), TrackType::Video, 1);
        let audio = Track::new(seq.id.clone(), TrackType::Audio, 1);
        let conn = store.connection();
        TimelineStore::insert_sequence(conn, &seq).unwrap();
        TimelineStore::insert_track(conn, &video).unwrap();
        TimelineStore::insert_track(conn, &audio).unwrap();

        let v1 = clip("v1", &seq.id, &video.id, 0, 1000);
        let v2 = clip("v2", &seq.id, &video.id, 2000, 500);
        let a1 = clip("a1", &seq.id, &audio.id, 0, 1000);
        let a2 = clip("a2", &seq.id, &audio.id, 2000, 500);
        for c in [&v1, &v2, &a1, &a2] {
            TimelineStore::insert_clip(conn, c).unwrap();
        }

        let mut env = CommandEnvelope::new(
            COMMAND_TYPE,
            "proj1".to_string(),
            serde_json::json!({
                "sequence_id": seq.id,
                "targets": [
                    { "kind": "clip", "clip_id": "v1", "edge": "out" },
                    { "kind": "clip", "clip_id": "a1", "edge": "out" },
                ],
                "requested_delta_frames": 120,
            }),
        );
        let tx = store.transaction().unwrap();
        let outcome = BatchRippleEditExecutor.execute(&tx, &mut env).unwrap();
        assert!(outcome.success);
        tx.commit().unwrap();

        let v1_after = TimelineStore::get_clip(store.connection(), "v1").unwrap();
        assert_eq!(v1_after.duration_frames, 1120);
        let a1_after = TimelineStore::get_clip(store.connection(), "a1").unwrap();
        assert_eq!(a1_after.duration_frames, 1120);

        let v2_after = TimelineStore::get_clip(store.connection(), "v2").unwrap();
        assert_eq!(v2_after.timeline_start_frame, 2120);
        let a2_after = TimelineStore::get_clip(store.connection(), "a2").unwrap();
        assert_eq!(a2_after.timeline_start_frame, 2120);
    }
}
