//! Reelcraft Export - Offline rendering to video files
//!
//! Provides:
//! - Deterministic frame capture at arbitrary scene times
//! - The `VideoEncoder` contract with ffmpeg and raw implementations
//! - `ExportManager` orchestration with phased progress and cancellation

pub mod capture;
pub mod encoder;
pub mod manager;

pub use capture::FrameCapture;
pub use encoder::{
    AudioCodec, ExportFormat, ExportSettings, FfmpegEncoder, QualityPreset, RawVideoEncoder,
    VideoCodec, VideoEncoder,
};
pub use manager::{ExportCancel, ExportManager, ExportPhase, ExportProgress, ExportResult};
