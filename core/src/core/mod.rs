//! OpenReelio Core Engine
//!
//! The timeline editing engine: rational-frame time, the persistent
//! relational timeline store, the in-memory timeline projection, the
//! command engine (event log, branching undo tree, snapshot/replay),
//! the command library, the real-time audio playback engine, and the
//! flexible time-input parser.

pub mod audio;
pub mod commands;
pub mod model;
pub mod store;
pub mod time;
pub mod time_input;

mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_scenarios;
