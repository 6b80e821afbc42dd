//! Reelcraft Timeline - Project data model
//!
//! Clips, audio tracks and transitions as read by the scene, playback and
//! export layers.

pub mod clip;
pub mod project;
pub mod transition;

pub use clip::{AspectRatioMode, AudioTrack, VideoClip};
pub use project::Project;
pub use transition::{PlaneModifier, SlideDirection, Transition, TransitionKind, TransitionPhase};
