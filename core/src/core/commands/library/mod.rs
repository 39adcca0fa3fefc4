//! The standard command library (§4.4.8): the executors/undoers shipped
//! with the engine, covering clip creation, splitting, track-relative
//! insert/overwrite edits, cross-track moves, small nudges, and both
//! single and batch ripple trims.

mod batch_ripple_edit;
mod create_clip;
mod insert;
mod move_clip_to_track;
mod nudge;
mod overwrite;
pub mod ripple;
mod ripple_edit;
mod split_clip;

use std::sync::Arc;

use crate::core::commands::registry::ExecutorRegistry;

pub fn register_all(registry: &mut ExecutorRegistry) {
    registry.register(
        create_clip::COMMAND_TYPE,
        Arc::new(create_clip::CreateClipExecutor),
        Some(Arc::new(create_clip::CreateClipUndoer)),
    );
    registry.register(
        split_clip::COMMAND_TYPE,
        Arc::new(split_clip::SplitClipExecutor),
        Some(Arc::new(split_clip::SplitClipUndoer)),
    );
    registry.register(
        insert::COMMAND_TYPE,
        Arc::new(insert::InsertExecutor),
        Some(Arc::new(insert::InsertUndoer)),
    );
    registry.register(
        overwrite::COMMAND_TYPE,
        Arc::new(overwrite::OverwriteExecutor),
        Some(Arc::new(overwrite::OverwriteUndoer)),
    );
    registry.register(
        move_clip_to_track::COMMAND_TYPE,
        Arc::new(move_clip_to_track::MoveClipToTrackExecutor),
        Some(Arc::new(move_clip_to_track::MoveClipToTrackUndoer)),
    );
    registry.register(
        nudge::COMMAND_TYPE,
        Arc::new(nudge::NudgeExecutor),
        Some(Arc::new(nudge::NudgeUndoer)),
    );
    registry.register(
        ripple_edit::COMMAND_TYPE,
        Arc::new(ripple_edit::RippleEditExecutor),
        Some(Arc::new(ripple_edit::RippleEditUndoer)),
    );
    registry.register(
        batch_ripple_edit::COMMAND_TYPE,
        Arc::new(batch_ripple_edit::BatchRippleEditExecutor),
        Some(Arc::new(batch_ripple_edit::BatchRippleEditUndoer)),
    );
}
