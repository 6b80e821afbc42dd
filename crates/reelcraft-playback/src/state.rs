//! Playback state and change notifications.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Paused,
    Playing,
}

/// Published to every subscriber of a `PreviewController`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    StateChanged { from: PlaybackState, to: PlaybackState },
    TimeUpdated { time: f64 },
    /// The playhead reached the end of the timeline.
    Ended { time: f64 },
}
