//! Shared ripple-edit math used by both `ripple_edit` and
//! `batch_ripple_edit`: resolving a trim target (a real clip edge or a
//! materialized gap) to a clamped delta, a ripple point, and a shift,
//! and applying the resulting downstream shift across every track in a
//! sequence.
//!
//! Ripple trims never move the edited clip's own timeline position
//! (unlike [`crate::core::model::edge_trim_bounds`], which backs
//! `Nudge` and *does* move the edited edge). Instead the clip's
//! duration and source window change in place, and everything
//! downstream of the ripple point shifts to absorb the difference.

use serde::{Deserialize, Serialize};

use crate::core::commands::bag::{BulkShift, TimelineMutationBuffer};
use crate::core::error::CoreResult;
use crate::core::model::{
    sorted_clips_on_track, Clip, Edge, GapHandle, GapSide, MaterializedGap,
};
use crate::core::store::TimelineStore;
use crate::core::types::{ClipId, SequenceId, TrackId};

/// What a single ripple edge targets: a real clip's in/out edge, or a
/// gap identified by its adjacent real clip (stable across edits that
/// don't touch that clip).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RippleTarget {
    Clip { clip_id: ClipId, edge: Edge },
    Gap { reference_clip_id: ClipId, side: RippleGapSide },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RippleGapSide {
    Before,
    After,
}

impl From<RippleGapSide> for GapSide {
    fn from(side: RippleGapSide) -> Self {
        match side {
            RippleGapSide::Before => GapSide::Before,
            RippleGapSide::After => GapSide::After,
        }
    }
}

/// The resolved effect of trimming one ripple target by a clamped Δ.
pub struct RippleResolution {
    /// The track whose own downstream clips must be shifted excluding
    /// the edited clip, if the target was a real clip. `None` for gap
    /// targets (no clip to exclude).
    pub home_track_exclude: Option<(TrackId, ClipId)>,
    /// The updated clip to persist, if the target was a real clip.
    pub updated_clip: Option<Clip>,
    /// The point at/after which every other clip on every track shifts.
    pub ripple_point: i64,
    /// The signed shift applied to downstream clips.
    pub shift_delta: i64,
    /// The clamped delta actually applied, in the target's own sign
    /// convention (positive lengthens an out-edge / shrinks an in-edge
    /// or gap by that amount towards the caller's requested direction).
    pub applied_delta: i64,
}

/// Resolves `target` against the current clips of `sequence_id`,
/// clamping `requested_delta` against source-media bounds and the
/// minimum 1-frame duration (clip targets), or the gap-closure limit
/// (gap targets). Returns `None` only for an infinite/open gap that
/// cannot be materialized (no neighbor on the requested side) — such
/// targets contribute nothing to a ripple and callers should skip them.
pub fn resolve(
    tx: &rusqlite::Transaction<'_>,
    sequence_id: &SequenceId,
    target: &RippleTarget,
    requested_delta: i64,
) -> CoreResult<Option<RippleResolution>> {
    let all_clips = TimelineStore::list_clips_for_sequence(tx, sequence_id)?;
    match target {
        RippleTarget::Clip { clip_id, edge } => {
            let clip = TimelineStore::get_clip(tx, clip_id)?;
            let sorted = sorted_clips_on_track(&all_clips, &clip.track_id);
            let media_duration = match &clip.media_id {
                Some(id) => Some(TimelineStore::get_media(tx, id)?.duration_frames),
                None => None,
            };
            Ok(Some(resolve_clip_edge(&sorted, &clip, *edge, media_duration, requested_delta)))
        }
        RippleTarget::Gap { reference_clip_id, side } => {
            let reference = TimelineStore::get_clip(tx, reference_clip_id)?;
            let sorted = sorted_clips_on_track(&all_clips, &reference.track_id);
            let handle = GapHandle {
                reference_clip_id: reference_clip_id.clone(),
                side: (*side).into(),
            };
            match crate::core::model::materialize_gap(&sorted, &handle) {
                Some(gap) => Ok(Some(resolve_gap(gap, requested_delta))),
                None => Ok(None),
            }
        }
    }
}

fn resolve_clip_edge(
    sorted: &[&Clip],
    clip: &Clip,
    edge: Edge,
    media_duration: Option<i64>,
    requested_delta: i64,
) -> RippleResolution {
    match edge {
        Edge::In => {
            // Δ > 0 trims footage off the front: duration shrinks,
            // source_in advances, timeline_start is unchanged.
            let max_shrink = clip.duration_frames - 1;
            let max_grow = clip.source_in_frame; // can't pull source_in below 0
            let delta = requested_delta.clamp(-max_grow, max_shrink);
            let mut updated = clip.clone();
            updated.duration_frames -= delta;
            updated.source_in_frame += delta;
            RippleResolution {
                home_track_exclude: Some((clip.track_id.clone(), clip.id.clone())),
                updated_clip: Some(updated),
                ripple_point: clip.timeline_start_frame,
                shift_delta: -delta,
                applied_delta: delta,
            }
        }
        Edge::Out => {
            // Δ > 0 extends footage at the tail: duration grows,
            // source_out advances, timeline_start is unchanged.
            let max_shrink = clip.duration_frames - 1;
            let max_grow = media_duration
                .map(|total| total - clip.source_out_frame)
                .unwrap_or(i64::MAX / 4);
            let delta = requested_delta.clamp(-max_shrink, max_grow);
            let mut updated = clip.clone();
            updated.duration_frames += delta;
            updated.source_out_frame += delta;
            RippleResolution {
                home_track_exclude: Some((clip.track_id.clone(), clip.id.clone())),
                updated_clip: Some(updated),
                ripple_point: clip.timeline_end_frame(),
                shift_delta: delta,
                applied_delta: delta,
            }
        }
    }
}

fn resolve_gap(gap: MaterializedGap, requested_delta: i64) -> RippleResolution {
    // Δ > 0 closes the gap (shrinks it), pulling everything after it
    // to the left; it may never fully close it (>= 1 frame remains).
    let max_close = gap.duration_frames - 1;
    let delta = requested_delta.min(max_close);
    RippleResolution {
        home_track_exclude: None,
        updated_clip: None,
        ripple_point: gap.start_frame + gap.duration_frames,
        shift_delta: -delta,
        applied_delta: delta,
    }
}

/// Applies a resolved downstream shift across every track of
/// `sequence_id`, recording each affected track's bulk shift into
/// `mutations` for observer notification. `excludes` lists, per
/// edited clip, the track it lives on and its id — these clips have
/// already been placed by hand and must not also move in the bulk
/// shift even if their (unchanged) start sits at the ripple point.
pub fn apply_shift(
    tx: &rusqlite::Transaction<'_>,
    sequence_id: &SequenceId,
    excludes: &[(TrackId, ClipId)],
    ripple_point: i64,
    shift_delta: i64,
    mutations: &mut TimelineMutationBuffer,
) -> CoreResult<()> {
    if shift_delta == 0 {
        return Ok(());
    }
    let tracks = TimelineStore::list_tracks_for_sequence(tx, sequence_id)?;
    for track in &tracks {
        let track_excludes: Vec<ClipId> = excludes
            .iter()
            .filter(|(t, _)| t == &track.id)
            .map(|(_, c)| c.clone())
            .collect();
        let shifted =
            TimelineStore::bulk_shift_track_excluding(tx, &track.id, ripple_point, shift_delta, &track_excludes)?;
        if !shifted.is_empty() {
            mutations.record_bulk_shift(
                sequence_id,
                BulkShift {
                    track_id: track.id.clone(),
                    anchor_frame: ripple_point,
                    delta_frames: shift_delta,
                    clip_ids: shifted,
                },
            );
        }
    }
    Ok(())
}

/// Reverses `apply_shift`: shifts everything back by `-shift_delta`,
/// anchored at the ripple point as it now stands after the forward
/// shift (`ripple_point + shift_delta`).
pub fn undo_shift(
    tx: &rusqlite::Transaction<'_>,
    sequence_id: &SequenceId,
    excludes: &[(TrackId, ClipId)],
    ripple_point: i64,
    shift_delta: i64,
    mutations: &mut TimelineMutationBuffer,
) -> CoreResult<()> {
    apply_shift(tx, sequence_id, excludes, ripple_point + shift_delta, -shift_delta, mutations)
}
