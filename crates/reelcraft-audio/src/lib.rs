//! Reelcraft Audio - Mixdown of project audio tracks
//!
//! The export path asks an `AudioMixer` for one buffer covering the project.

pub mod buffer;
pub mod mixer;

pub use buffer::{AudioBuffer, MIX_SAMPLE_RATE};
pub use mixer::{AudioMixer, TrackMixer};
