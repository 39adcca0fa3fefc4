//! `nudge`: a small, non-rippling adjustment applied in place to a set
//! of selected clips (moved by a shared delta, linked partners expanded)
//! and/or a set of selected edges (trimmed via
//! [`crate::core::model::edge_trim_bounds`], which — unlike ripple
//! trims — does move the edited edge and never touches any other clip)
//! (§4.4.8). Never allows duration below 1 frame or a negative
//! `timeline_start_frame`.

use serde::{Deserialize, Serialize};

use rusqlite::Transaction;

use crate::core::commands::bag::{CommandEnvelope, ExecOutcome, TimelineMutationBuffer};
use crate::core::commands::registry::{Executor, Undoer};
use crate::core::error::CoreResult;
use crate::core::model::{clamp_delta, edge_trim_bounds, expand_linked_selection, sorted_clips_on_track, Edge};
use crate::core::store::{CommandRow, TimelineStore};

pub const COMMAND_TYPE: &str = "nudge";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EdgeSelector {
    clip_id: String,
    edge: Edge,
}

pub struct NudgeExecutor;

impl Executor for NudgeExecutor {
    fn execute(&self, tx: &Transaction<'_>, env: &mut CommandEnvelope) -> CoreResult<ExecOutcome> {
        let sequence_id = env.require_str("sequence_id")?;
        let amount = env.require_i64("amount_frames")?;

        let clip_ids: Vec<String> = env
            .parameters
            .get("clip_ids")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let edges: Vec<EdgeSelector> = env
            .parameters
            .get("edges")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let mut previous = Vec::new();

        if !clip_ids.is_empty() {
            let links = TimelineStore::list_links_for_sequence(tx, &sequence_id)?;
            let expanded = expand_linked_selection(&clip_ids, &links);
            let mut clips = Vec::new();
            for id in &expanded {
                clips.push(TimelineStore::get_clip(tx, id)?);
            }
            let min_start = clips.iter().map(|c| c.timeline_start_frame).min().unwrap_or(0);
            let effective = amount.max(-min_start);
            for clip in &clips {
                previous.push(clip.clone());
                let mut moved = clip.clone();
                moved.timeline_start_frame += effective;
                TimelineStore::update_clip(tx, &moved)?;
                env.mutations.record_update(&sequence_id, moved);
            }
        }

        for selector in &edges {
            let clip = TimelineStore::get_clip(tx, &selector.clip_id)?;
            let track_clips = TimelineStore::list_clips_for_track(tx, &clip.track_id)?;
            let sorted = sorted_clips_on_track(&track_clips, &clip.track_id);
            let media_duration = match &clip.media_id {
                Some(id) => Some(TimelineStore::get_media(tx, id)?.duration_frames),
                None => None,
            };
            let bounds = edge_trim_bounds(&sorted, &selector.clip_id, selector.edge, media_duration);
            let delta = clamp_delta(amount, bounds);

            previous.push(clip.clone());
            let mut trimmed = clip.clone();
            match selector.edge {
                Edge::In => {
                    trimmed.timeline_start_frame -= delta;
                    trimmed.duration_frames += delta;
                    trimmed.source_in_frame -= delta;
                }
                Edge::Out => {
                    trimmed.duration_frames += delta;
                    trimmed.source_out_frame += delta;
                }
            }
            TimelineStore::update_clip(tx, &trimmed)?;
            env.mutations.record_update(&sequence_id, trimmed);
        }

        env.set_param("__previous_clips", serde_json::to_value(&previous)?);
        Ok(ExecOutcome::ok_empty())
    }
}

pub struct NudgeUndoer;

impl Undoer for NudgeUndoer {
    fn undo(&self, tx: &Transaction<'_>, stored: &CommandRow) -> CoreResult<TimelineMutationBuffer> {
        let previous: Vec<crate::core::model::Clip> = serde_json::from_value(
            stored
                .command_args
                .get("__previous_clips")
                .cloned()
                .unwrap_or(serde_json::json!([])),
        )?;
        let mut mutations = TimelineMutationBuffer::default();
        for clip in previous {
            TimelineStore::update_clip(tx, &clip)?;
            mutations.record_update(&stored.sequence_id, clip);
        }
        Ok(mutations)
    }
}
