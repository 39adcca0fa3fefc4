//! Data-model entity structs, mirroring the persistent store schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{ClipId, LinkGroupId, MediaId, ProjectId, PropertyId, SequenceId, TrackId};

/// A project: the top-level container for media, sequences, and effects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Opaque application settings, stored as JSON.
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::core::types::new_id(),
            name: name.into(),
            settings: serde_json::json!({}),
            created_at: now,
            modified_at: now,
        }
    }
}

/// An imported media asset. Frame rate here is the asset's native
/// timebase, independent of any sequence that later references it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub project_id: ProjectId,
    pub name: String,
    pub file_path: String,
    pub duration_frames: i64,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub audio_channels: Option<u32>,
    pub codec: Option<String>,
    pub metadata: serde_json::Value,
}

/// What kind of timeline a `Sequence` represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Timeline,
    Compound,
    Multicam,
}

/// A selection snapshot captured before/after a command, per invariant 8.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub clip_ids: Vec<ClipId>,
    /// Serialized edge selections, e.g. `{clip_id, edge}` pairs as JSON.
    pub edges: Vec<serde_json::Value>,
    /// Serialized gap selections, e.g. `{reference_clip_id, side}` as JSON.
    pub gaps: Vec<serde_json::Value>,
}

/// A sequence (playable timeline / "composition") containing tracks.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub project_id: ProjectId,
    pub name: String,
    pub kind: SequenceKind,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    pub audio_rate: u32,
    pub width: u32,
    pub height: u32,
    pub view_start_frame: i64,
    pub view_duration_frames: i64,
    pub playhead_frame: i64,
    pub mark_in_frame: Option<i64>,
    pub mark_out_frame: Option<i64>,
    pub selection: SelectionSnapshot,
    /// The undo-tree head, persisted so it survives a restart.
    pub current_sequence_number: Option<i64>,
}

impl Sequence {
    pub fn new(project_id: ProjectId, name: impl Into<String>, fps_num: u32, fps_den: u32) -> Self {
        Self {
            id: crate::core::types::new_id(),
            project_id,
            name: name.into(),
            kind: SequenceKind::Timeline,
            fps_numerator: fps_num,
            fps_denominator: fps_den,
            audio_rate: 48_000,
            width: 1920,
            height: 1080,
            view_start_frame: 0,
            view_duration_frames: 0,
            playhead_frame: 0,
            mark_in_frame: None,
            mark_out_frame: None,
            selection: SelectionSnapshot::default(),
            current_sequence_number: None,
        }
    }
}

/// Track media kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackType {
    Video,
    Audio,
}

/// A horizontal lane on a sequence holding clips.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub sequence_id: SequenceId,
    pub name: String,
    pub track_type: TrackType,
    /// 1-based, unique per `(sequence_id, track_type)`.
    pub track_index: u32,
    pub enabled: bool,
    pub locked: bool,
    pub muted: bool,
    pub soloed: bool,
    /// Only meaningful for audio tracks.
    pub volume: f32,
    pub pan: f32,
}

impl Track {
    pub fn new(sequence_id: SequenceId, track_type: TrackType, track_index: u32) -> Self {
        Self {
            id: crate::core::types::new_id(),
            sequence_id,
            name: format!("{:?} {}", track_type, track_index),
            track_type,
            track_index,
            enabled: true,
            locked: false,
            muted: false,
            soloed: false,
            volume: 1.0,
            pan: 0.0,
        }
    }
}

/// Whether a clip is a library "master" clip or a placement on a timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Master,
    Timeline,
}

/// A placement of media (or a nested sequence) on a track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub project_id: ProjectId,
    pub clip_kind: ClipKind,
    /// Set when this clip places a nested (compound) sequence.
    pub source_sequence_id: Option<SequenceId>,
    /// Set on timeline clips derived from a master clip.
    pub parent_clip_id: Option<ClipId>,
    pub owner_sequence_id: SequenceId,
    pub track_id: TrackId,
    pub media_id: Option<MediaId>,
    pub name: String,
    pub timeline_start_frame: i64,
    pub duration_frames: i64,
    pub source_in_frame: i64,
    pub source_out_frame: i64,
    pub fps_numerator: u32,
    pub fps_denominator: u32,
    pub enabled: bool,
    pub offline: bool,
    pub mark_in_frame: Option<i64>,
    pub mark_out_frame: Option<i64>,
    pub playhead_frame: Option<i64>,
}

impl Clip {
    /// Half-open timeline interval `[start, start + duration)`.
    pub fn timeline_end_frame(&self) -> i64 {
        self.timeline_start_frame + self.duration_frames
    }

    /// Whether this clip's timeline interval overlaps `other`'s.
    pub fn overlaps(&self, other: &Clip) -> bool {
        self.timeline_start_frame < other.timeline_end_frame()
            && other.timeline_start_frame < self.timeline_end_frame()
    }

    /// Invariant 1: duration must be positive.
    pub fn has_positive_duration(&self) -> bool {
        self.duration_frames > 0
    }

    /// Invariant 2: the source window must be at least as long as the
    /// timeline window.
    pub fn source_window_covers_duration(&self) -> bool {
        self.source_out_frame >= self.source_in_frame + self.duration_frames
    }
}

/// A per-clip keyframe-free property value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub clip_id: ClipId,
    pub property_name: String,
    /// JSON-encoded `{value: ...}`.
    pub property_value: serde_json::Value,
    pub property_type: String,
    pub default_value: serde_json::Value,
}

/// The role a linked clip plays within its link group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRole {
    Video,
    Audio,
}

/// Membership of a clip in a link group: linked clips move together
/// under clip-level operations when `enabled`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClipLink {
    pub link_group_id: LinkGroupId,
    pub clip_id: ClipId,
    pub role: LinkRole,
    pub time_offset: i64,
    pub enabled: bool,
}

/// Which edge of a clip (or gap) is being edited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    In,
    Out,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(start: i64, dur: i64) -> Clip {
        Clip {
            id: "c".into(),
            project_id: "p".into(),
            clip_kind: ClipKind::Timeline,
            source_sequence_id: None,
            parent_clip_id: None,
            owner_sequence_id: "s".into(),
            track_id: "t".into(),
            media_id: None,
            name: "clip".into(),
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
    fn overlap_detects_touching_half_open_intervals_as_disjoint() {
        let a = clip(0, 100);
        let b = clip(100, 50);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn overlap_detects_real_overlap() {
        let a = clip(0, 100);
        let b = clip(50, 50);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn invariants_hold_for_well_formed_clip() {
        let c = clip(0, 100);
        assert!(c.has_positive_duration());
        assert!(c.source_window_covers_duration());
    }
}
