//! Reelcraft Media - Video resources and FFmpeg integration
//!
//! This crate handles:
//! - The video element contract shared by scene and playback
//! - Object URL lifetime for imported files
//! - Media probing and frame/audio decoding via ffmpeg
//! - A generated pattern source for demos and tests

pub mod decoder;
pub mod pattern;
pub mod probe;
pub mod video;

pub use decoder::{decode_audio_pcm, AudioPcm, FfmpegVideo};
pub use pattern::PatternVideo;
pub use probe::MediaProbe;
pub use video::{
    share_element, ObjectUrl, ObjectUrlRegistry, SharedVideoElement, SharedVideoLibrary,
    VideoElement, VideoLibrary, VideoMetadata, VideoResource,
};
