//! Reelcraft Playback - Real-time preview
//!
//! Drives video element clocks and the scene time from a per-frame update,
//! keeping every active element within a small drift of the timeline.

pub mod error_log;
pub mod preview;
pub mod state;

pub use error_log::{ErrorCategory, ErrorEntry, ErrorLog};
pub use preview::PreviewController;
pub use state::{PlaybackEvent, PlaybackState};
