//! The real-time audio playback engine (§4.5).
//!
//! Structured the way the store/commands split separates persistence
//! from policy: [`contracts`] defines the external collaborators (the
//! decoder, the stretch engine, the output device) as traits so the
//! transport logic in [`session`] never depends on a concrete codec or
//! sound-card API; [`device`] and [`stretch`] are the production
//! implementations wired up through those traits.

pub mod contracts;
pub mod device;
pub mod session;
pub mod stretch;

pub use contracts::{AudioDevice, Decoder, PcmChunk, QualityMode, ResolvedTrackMix, StretchEngine};
pub use session::{
    AudioEngineConfig, AudioSession, Generation, TransportState, OUTPUT_LATENCY_US, TARGET_BUFFER_MS,
};
