//! OpenReelio Error Definitions
//!
//! Defines error types used throughout the timeline engine.

use thiserror::Error;

use super::types::{ClipId, CommandId, MediaId, SequenceId, TrackId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Argument / lookup errors
    // =========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Clip not found: {0}")]
    ClipNotFound(ClipId),

    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("Sequence not found: {0}")]
    SequenceNotFound(SequenceId),

    #[error("Media not found: {0}")]
    MediaNotFound(MediaId),

    #[error("Command not found: {0}")]
    CommandNotFound(CommandId),

    // =========================================================================
    // Data-model constraint errors
    // =========================================================================
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error(
        "Video overlap on track {track_id}: clip {existing_clip_id} occupies [{existing_start}, {existing_end}), new clip [{new_start}, {new_end}) conflicts"
    )]
    VideoOverlap {
        track_id: TrackId,
        existing_clip_id: ClipId,
        existing_start: i64,
        existing_end: i64,
        new_start: i64,
        new_end: i64,
    },

    // =========================================================================
    // Command engine errors
    // =========================================================================
    #[error("Unknown command type: {0}")]
    UnknownCommandType(String),

    #[error("Command execution failed: {0}")]
    CommandExecutionFailed(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Missing undoer for command type: {0}")]
    MissingUndoer(String),

    #[error("Event log replay could not reach the target state: {0}")]
    ReplayCorruption(String),

    // =========================================================================
    // Audio engine errors
    // =========================================================================
    #[error("Audio session not ready: {0}")]
    SessionNotReady(String),

    // =========================================================================
    // Fatal / internal errors
    // =========================================================================
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Transport errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Returns a short machine-readable kind tag so callers can branch on
    /// error category without matching against message text.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidArgument(_) => "InvalidArgument",
            CoreError::NotFound(_)
            | CoreError::ClipNotFound(_)
            | CoreError::TrackNotFound(_)
            | CoreError::SequenceNotFound(_)
            | CoreError::MediaNotFound(_)
            | CoreError::CommandNotFound(_) => "NotFound",
            CoreError::ConstraintViolation(_) => "ConstraintViolation",
            CoreError::VideoOverlap { .. } => "VideoOverlap",
            CoreError::UnknownCommandType(_) => "InvalidArgument",
            CoreError::CommandExecutionFailed(_) => "CommandExecutionFailed",
            CoreError::NothingToUndo => "NothingToUndo",
            CoreError::NothingToRedo => "NothingToRedo",
            CoreError::MissingUndoer(_) => "InternalInvariant",
            CoreError::ReplayCorruption(_) => "ReplayCorruption",
            CoreError::SessionNotReady(_) => "SessionNotReady",
            CoreError::InternalInvariant(_) => "InternalInvariant",
            CoreError::Internal(_) => "Internal",
            CoreError::IoError(_) => "IO",
            CoreError::JsonError(_) => "Serialization",
            CoreError::Database(_) => "IO",
        }
    }

    /// Convert to a user-friendly error message for a CLI/UI layer.
    pub fn to_ipc_error(&self) -> String {
        self.to_string()
    }
}
