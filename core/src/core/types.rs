//! OpenReelio Core Type Definitions
//!
//! Fundamental id aliases shared across the timeline store, model, and
//! command engine. Ids are ULIDs formatted as strings, matching the rest
//! of the project's id conventions.

/// Project unique identifier (ULID)
pub type ProjectId = String;

/// Media unique identifier (ULID)
pub type MediaId = String;

/// Sequence unique identifier (ULID)
pub type SequenceId = String;

/// Track unique identifier (ULID)
pub type TrackId = String;

/// Clip unique identifier (ULID)
pub type ClipId = String;

/// Property unique identifier (ULID)
pub type PropertyId = String;

/// Link-group unique identifier (ULID)
pub type LinkGroupId = String;

/// Command (event-log) unique identifier (ULID)
pub type CommandId = String;

/// Generates a fresh ULID-formatted id string.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}
