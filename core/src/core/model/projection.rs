//! In-memory projection helpers: sorted clip lookup, gap discovery, edge
//! trim constraints, and link-group expansion. These are pure functions
//! over slices of `Clip`/`ClipLink` so the command library can reason
//! about ripple math without touching the store mid-calculation.

use std::collections::HashSet;

use super::entities::{Clip, ClipLink, Edge};
use crate::core::types::{ClipId, TrackId};

/// Returns clips on `track_id`, sorted by `timeline_start_frame` (stable,
/// ties broken by id so sort order is deterministic across replays).
pub fn sorted_clips_on_track<'a>(clips: &'a [Clip], track_id: &TrackId) -> Vec<&'a Clip> {
    let mut on_track: Vec<&Clip> = clips.iter().filter(|c| &c.track_id == track_id).collect();
    on_track.sort_by(|a, b| {
        a.timeline_start_frame
            .cmp(&b.timeline_start_frame)
            .then_with(|| a.id.cmp(&b.id))
    });
    on_track
}

/// A gap between two clips (or between t=0 and the first clip). `None`
/// `duration` signals an infinite gap extending to the end of the track
/// (used only in batch-ripple accounting; ordinary gap discovery never
/// produces one since there is no fixed track length).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gap {
    pub start_frame: i64,
    pub duration_frames: i64,
}

/// Finds all gaps on a (pre-sorted) track's clip list. Clips are assumed
/// non-overlapping (a store/model invariant for video tracks; audio
/// tracks may overlap, in which case "gap" is not a meaningful concept
/// and callers should not invoke this against audio tracks with
/// overlapping clips).
pub fn find_gaps(sorted: &[&Clip]) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut cursor = 0i64;
    for clip in sorted {
        if clip.timeline_start_frame > cursor {
            gaps.push(Gap {
                start_frame: cursor,
                duration_frames: clip.timeline_start_frame - cursor,
            });
        }
        cursor = cursor.max(clip.timeline_end_frame());
    }
    gaps
}

/// Which side of a reference clip a gap handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapSide {
    Before,
    After,
}

/// A handle identifying a gap by its adjacent real clip, rather than by
/// absolute position — stable across edits that don't touch that clip.
#[derive(Clone, Debug)]
pub struct GapHandle {
    pub reference_clip_id: ClipId,
    pub side: GapSide,
}

/// A "materialized" gap: a virtual clip whose source window is identical
/// to its duration (it has no real media), used so gap edges can be
/// trimmed with the same math as real clip edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterializedGap {
    pub start_frame: i64,
    pub duration_frames: i64,
}

/// Turns a gap handle into a materialized gap by locating the reference
/// clip among `sorted` (which must be the clips of the same track) and
/// looking at its neighbor on `side`.
pub fn materialize_gap(sorted: &[&Clip], handle: &GapHandle) -> Option<MaterializedGap> {
    let idx = sorted
        .iter()
        .position(|c| c.id == handle.reference_clip_id)?;
    match handle.side {
        GapSide::Before => {
            let gap_end = sorted[idx].timeline_start_frame;
            let gap_start = if idx == 0 {
                0
            } else {
                sorted[idx - 1].timeline_end_frame()
            };
            if gap_end <= gap_start {
                return None;
            }
            Some(MaterializedGap {
                start_frame: gap_start,
                duration_frames: gap_end - gap_start,
            })
        }
        GapSide::After => {
            let gap_start = sorted[idx].timeline_end_frame();
            let gap_end = sorted.get(idx + 1).map(|c| c.timeline_start_frame);
            let gap_end = gap_end?;
            if gap_end <= gap_start {
                return None;
            }
            Some(MaterializedGap {
                start_frame: gap_start,
                duration_frames: gap_end - gap_start,
            })
        }
    }
}

/// The maximum magnitude a signed delta `Δ` applied to `edge` of `clip`
/// may take without violating: source-media bounds, the neighboring
/// clip on the same track (if any), and the minimum 1-frame duration.
/// Returns `(min_delta, max_delta)`, the inclusive range of deltas that
/// keep the edit valid. `Δ > 0` lengthens the clip (moves the out-edge
/// later / the in-edge earlier); `Δ < 0` shortens it.
pub fn edge_trim_bounds(
    sorted: &[&Clip],
    clip_id: &ClipId,
    edge: Edge,
    media_duration_frames: Option<i64>,
) -> (i64, i64) {
    let idx = sorted
        .iter()
        .position(|c| &c.id == clip_id)
        .expect("clip must be present on its own track");
    let clip = sorted[idx];

    match edge {
        Edge::In => {
            // Moving the in-edge earlier (Δ negative in our convention
            // here means the start moves left, growing the clip) is
            // bounded by the previous clip's end and by source_in >= 0.
            let prev_end = if idx == 0 {
                0
            } else {
                sorted[idx - 1].timeline_end_frame()
            };
            let max_grow = clip.timeline_start_frame - prev_end; // how far left we can move the start
            let max_shrink = clip.duration_frames - 1; // keep >= 1 frame
            let source_bound = clip.source_in_frame; // can't go before 0 in source
            let max_positive_delta = max_grow.min(source_bound);
            (-max_shrink, max_positive_delta)
        }
        Edge::Out => {
            let next_start = sorted.get(idx + 1).map(|c| c.timeline_start_frame);
            let max_grow = match next_start {
                Some(next) => next - clip.timeline_end_frame(),
                None => i64::MAX / 4,
            };
            let source_room = media_duration_frames
                .map(|total| total - clip.source_out_frame)
                .unwrap_or(i64::MAX / 4);
            let max_positive_delta = max_grow.min(source_room);
            let max_shrink = clip.duration_frames - 1;
            (-max_shrink, max_positive_delta)
        }
    }
}

/// Clamps a requested delta into the bounds returned by
/// `edge_trim_bounds`.
pub fn clamp_delta(requested: i64, bounds: (i64, i64)) -> i64 {
    requested.clamp(bounds.0, bounds.1)
}

/// Expands a clip-id selection to include enabled-linked partners from
/// the same link groups.
pub fn expand_linked_selection(selection: &[ClipId], links: &[ClipLink]) -> Vec<ClipId> {
    let mut groups: HashSet<&str> = HashSet::new();
    for link in links {
        if selection.iter().any(|id| id == &link.clip_id) && link.enabled {
            groups.insert(link.link_group_id.as_str());
        }
    }
    let mut expanded: HashSet<ClipId> = selection.iter().cloned().collect();
    for link in links {
        if link.enabled && groups.contains(link.link_group_id.as_str()) {
            expanded.insert(link.clip_id.clone());
        }
    }
    expanded.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::entities::{ClipKind};

    fn clip(id: &str, start: i64, dur: i64) -> Clip {
        Clip {
            id: id.into(),
            project_id: "p".into(),
            clip_kind: ClipKind::Timeline,
            source_sequence_id: None,
            parent_clip_id: None,
            owner_sequence_id: "s".into(),
            track_id: "t".into(),
            media_id: None,
            name: id.into(),
            timeline_start_frame: start,
            duration_frames: dur,
            source_in_frame: 0,
            source_out_frame: dur,
            fps_numerator: 24,
            fps_denominator: 1,
            enabled: true,
            offline: false,
            mark_in_frame: None,
            mark_out_frame: None,
            playhead_frame: None,
        }
    }

    #[test]
    fn sorted_clips_orders_by_start() {
        let clips = vec![clip("b", 150, 100), clip("a", 0, 100), clip("c", 300, 50)];
        let sorted = sorted_clips_on_track(&clips, &"t".to_string());
        let ids: Vec<_> = sorted.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn find_gaps_detects_leading_and_middle_gaps() {
        let clips = vec![clip("a", 10, 100), clip("b", 200, 50)];
        let sorted = sorted_clips_on_track(&clips, &"t".to_string());
        let gaps = find_gaps(&sorted);
        assert_eq!(
            gaps,
            vec![
                Gap { start_frame: 0, duration_frames: 10 },
                Gap { start_frame: 110, duration_frames: 90 },
            ]
        );
    }

    #[test]
    fn materialize_gap_before_first_clip() {
        let clips = vec![clip("a", 50, 100)];
        let sorted = sorted_clips_on_track(&clips, &"t".to_string());
        let handle = GapHandle {
            reference_clip_id: "a".into(),
            side: GapSide::Before,
        };
        let gap = materialize_gap(&sorted, &handle).unwrap();
        assert_eq!(gap, MaterializedGap { start_frame: 0, duration_frames: 50 });
    }

    #[test]
    fn materialize_gap_after_last_clip_is_none() {
        let clips = vec![clip("a", 0, 100)];
        let sorted = sorted_clips_on_track(&clips, &"t".to_string());
        let handle = GapHandle {
            reference_clip_id: "a".into(),
            side: GapSide::After,
        };
        assert!(materialize_gap(&sorted, &handle).is_none());
    }

    #[test]
    fn edge_trim_bounds_out_edge_respects_next_clip() {
        let clips = vec![clip("a", 0, 100), clip("b", 150, 100)];
        let sorted = sorted_clips_on_track(&clips, &"t".to_string());
        let (min_d, max_d) = edge_trim_bounds(&sorted, &"a".to_string(), Edge::Out, None);
        assert_eq!(max_d, 50); // room until "b" starts
        assert_eq!(min_d, -99); // keep duration >= 1
    }

    #[test]
    fn expand_linked_selection_pulls_in_partners() {
        let links = vec![
            ClipLink {
                link_group_id: "g1".into(),
                clip_id: "v1".into(),
                role: super::super::entities::LinkRole::Video,
                time_offset: 0,
                enabled: true,
            },
            ClipLink {
                link_group_id: "g1".into(),
                clip_id: "a1".into(),
                role: super::super::entities::LinkRole::Audio,
                time_offset: 0,
                enabled: true,
            },
        ];
        let expanded = expand_linked_selection(&["v1".to_string()], &links);
        assert!(expanded.contains(&"a1".to_string()));
        assert!(expanded.contains(&"v1".to_string()));
    }
}
