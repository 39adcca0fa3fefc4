//! `overwrite`: lays a new clip onto a track without rippling anything,
//! trimming or removing whatever already occupies the new clip's span
//! (§4.4.8). A single existing clip fully covered by the new span has
//! its id reused so any external references to it (properties, links)
//! survive; clips only partially covered are trimmed at the edge that
//! intersects the new span.

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::CoreResult;
use crate::core::model::{sorted_clips_on_track, Clip, ClipKind};
use crate::core::store::{CommandRow, TimelineStore};
use crate::core::types::new_id;

pub const COMMAND_TYPE: &str = "overwrite";

/// What the executor recorded about the edit, so the undoer can reverse
/// it without re-deriving the original layout.
#[derive(Serialize, Deserialize)]
struct OverwriteRecord {
    /// Full prior state of every clip touched (trimmed, deleted, or
    /// replaced in place).
    previous_clips: Vec<Clip>,
    /// The id of the clip now occupying the overwritten span.
    result_clip_id: String,
    /// True if `result_clip_id` reused an existing clip's row rather
    /// than inserting a brand new one.
    reused_existing: bool,
}

impl Executor for OverwriteExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let track_id = env.require_str("track_id")?;
        let ot = env.require_i64("timeline_start_frame")?;
        let duration = env.require_i64("duration_frames")?;
        if duration <= 0 {
            return Ok(ExecOutcome::failure("overwrite duration must be positive"));
        }
        let end = ot + duration;

        let track_clips = TimelineStore::list_clips_for_track(tx, &track_id)?;
        let sorted = sorted_clips_on_track(&track_clips, &track_id);

        let mut previous_clips = Vec::new();
        let mut fully_covered = Vec::new();
        let mut partial = Vec::new();
        for clip in &sorted {
            let overlaps = clip.timeline_start_frame < end && ot < clip.timeline_end_frame();
            if !overlaps {
                continue;
            }
            let contained = clip.timeline_start_frame >= ot && clip.timeline_end_frame() <= end;
            if contained {
                fully_covered.push((*clip).clone());
            } else {
                partial.push((*clip).clone());
            }
        }

        // Trim every partially overlapping clip at whichever edge
        // intersects the new span.
        for clip in &partial {
            previous_clips.push(clip.clone());
            let mut trimmed = clip.clone();
            if clip.timeline_start_frame < ot {
                // Overlaps at the tail: shorten to stop at `ot`.
                trimmed.duration_frames = ot - clip.timeline_start_frame;
                trimmed.source_out_frame = trimmed.source_in_frame + trimmed.duration_frames;
            } else {
                // Overlaps at the head: start later, trim source_in.
                let consumed = end - clip.timeline_start_frame;
                trimmed.timeline_start_frame = end;
                trimmed.source_in_frame += consumed;
                trimmed.duration_frames -= consumed;
            }
            TimelineStore::update_clip(tx, &trimmed)?;
            env.mutations.record_update(&sequence_id, trimmed);
        }

        let (result_clip_id, reused_existing) = if fully_covered.len() == 1 {
            previous_clips.push(fully_covered[0].clone());
            let id = fully_covered[0].id.clone();
            (id, true)
        } else {
            for clip in &fully_covered {
                previous_clips.push(clip.clone());
                TimelineStore::delete_clip(tx, &clip.id)?;
                env.mutations.record_delete(&sequence_id, clip.id.clone());
            }
            (env.opt_str("clip_id").unwrap_or_else(new_id), false)
        };
        env.set_param("clip_id", result_clip_id.clone().into());

        let new_clip = Clip {
            id: result_clip_id.clone(),
            project_id: env.project_id.clone(),
            clip_kind: ClipKind::Timeline,
            source_sequence_id: env.opt_str("source_sequence_id"),
            parent_clip_id: None,
            owner_sequence_id: sequence_id.clone(),
            track_id: track_id.clone(),
            media_id: env.opt_str("media_id"),
            name: env.opt_str("name").unwrap_or_else(|| "Clip".to_string()),
            timeline_start_frame: ot,
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
        if reused_existing {
            TimelineStore::update_clip(tx, &new_clip)?;
            env.mutations.record_update(&sequence_id, new_clip.clone());
        } else {
            TimelineStore::insert_clip(tx, &new_clip)?;
            env.mutations.record_insert(&sequence_id, new_clip.clone());
        }

        let record = OverwriteRecord {
            previous_clips,
            result_clip_id: result_clip_id.clone(),
            reused_existing,
        };
        env.set_param("__overwrite_record", serde_json::to_value(&record)?);

        Ok(ExecOutcome::ok(serde_json::json!({ "clip_id": result_clip_id })))
    }
}

pub struct OverwriteExecutor;

pub struct OverwriteUndoer;

impl Undoer for OverwriteUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let record: OverwriteRecord = serde_json::from_value(
            stored
                .command_args
                .get("__overwrite_record")
                .cloned()
                .ok_or_else(|| {
                    crate::core::error::CoreError::InternalInvariant("overwrite undo missing record".into())
                })?,
        )?;

        let mut mutations = TimelineMutationBuffer::default();
        if !record.reused_existing {
            TimelineStore::delete_clip(tx, &record.result_clip_id)?;
            mutations.record_delete(&stored.sequence_id, record.result_clip_id.clone());
        }

        for original in &record.previous_clips {
            if TimelineStore::get_clip(tx, &original.id).is_ok() {
                TimelineStore::update_clip(tx, original)?;
                mutations.record_update(&stored.sequence_id, original.clone());
            } else {
                TimelineStore::insert_clip(tx, original)?;
                mutations.record_insert(&stored.sequence_id, original.clone());
            }
        }
        Ok(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Project, Sequence, Track, TrackType};
    use crate::core::types::ProjectId;

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
        let seq = Sequence::new(project_id, "seq", 30, 1);
        let track = Track::new(seq.id.clone(), TrackType::Video, 1);
        let conn = store.connection();
        TimelineStore::insert_sequence(conn, &seq).unwrap();
        TimelineStore::insert_track(conn, &track).unwrap();
        (store, seq.id, track.id)
    }

    #[test]
    fn overwrite_trims_partial_overlap_and_reuses_fully_covered_id() {
        let (mut store, sequence_id, track_id) = setup();
        let left = clip("left", &sequence_id, &track_id, 0, 600); // overlaps head [500,700)? actually tail
        let covered = clip("covered", &sequence_id, &track_id, 700, 100);
        TimelineStore::insert_clip(store.connection(), &left).unwrap();
        TimelineStore::insert_clip(store.connection(), &covered).unwrap();

        let mut env = CommandEnvelope::new(
            COMMAND_TYPE,
            "proj1".to_string(),
            serde_json::json!({
                "sequence_id": sequence_id,
                "track_id": track_id,
                "timeline_start_frame": 500,
                "duration_frames": 400, // [500, 900)
                "source_in_frame": 0,
                "source_out_frame": 400,
            }),
        );
        let tx = store.transaction().unwrap();
        let outcome = OverwriteExecutor.execute(&tx, &mut env).unwrap();
        assert!(outcome.success);
        tx.commit().unwrap();

        let trimmed_left = TimelineStore::get_clip(store.connection(), "left").unwrap();
        assert_eq!(trimmed_left.duration_frames, 500); // trimmed to stop at 500
        assert!(TimelineStore::get_clip(store.connection(), "covered").is_ok());
        let covered_after = TimelineStore::get_clip(store.connection(), "covered").unwrap();
        assert_eq!(covered_after.id, "covered"); // id reused
        assert_eq!(covered_after.timeline_start_frame, 500);
        assert_eq!(covered_after.duration_frames, 400);
    }
}
