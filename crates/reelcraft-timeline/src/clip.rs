//! Clips and audio tracks placed on the timeline.

use reelcraft_core::Transform3D;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transition::{PlaneModifier, Transition, TransitionPhase};

/// How a clip's source frame is fitted to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AspectRatioMode {
    /// Letterbox inside the canvas.
    #[default]
    Fit,
    /// Cover the canvas, cropping the overflow.
    Fill,
    /// Canvas size regardless of source aspect.
    Stretch,
    /// Fit over a blurred, canvas-filling copy of itself.
    BlurBackground,
}

/// A video clip on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoClip {
    pub id: String,
    pub video_id: String,
    /// Timeline position in seconds.
    pub start_time: f64,
    pub duration: f64,
    /// Seconds skipped at the head of the source.
    #[serde(default)]
    pub trim_start: f64,
    #[serde(default)]
    pub trim_end: f64,
    #[serde(default)]
    pub transform: Transform3D,
    #[serde(default)]
    pub aspect_ratio_adaptation: AspectRatioMode,
    #[serde(default = "full_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub transition_in: Option<Transition>,
    #[serde(default)]
    pub transition_out: Option<Transition>,
}

fn full_opacity() -> f32 {
    1.0
}

impl VideoClip {
    pub fn new(id: impl Into<String>, video_id: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            video_id: video_id.into(),
            start_time,
            duration,
            trim_start: 0.0,
            trim_end: 0.0,
            transform: Transform3D::IDENTITY,
            aspect_ratio_adaptation: AspectRatioMode::Fit,
            opacity: 1.0,
            transition_in: None,
            transition_out: None,
        }
    }

    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Active on the half-open window `[start, start + duration)`.
    #[inline]
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// Source time shown at timeline `time`.
    #[inline]
    pub fn local_time(&self, time: f64) -> f64 {
        time - self.start_time + self.trim_start
    }

    /// Combined transition modifier at timeline `time`.
    pub fn transition_modifier(&self, time: f64) -> PlaneModifier {
        let mut modifier = PlaneModifier::IDENTITY;
        if !self.is_active_at(time) {
            return modifier;
        }
        if let Some(t) = &self.transition_in {
            let elapsed = time - self.start_time;
            if t.duration > 0.0 && elapsed < t.duration {
                modifier = modifier.combine(t.evaluate(elapsed / t.duration, TransitionPhase::In));
            }
        }
        if let Some(t) = &self.transition_out {
            let remaining = self.end_time() - time;
            if t.duration > 0.0 && remaining < t.duration {
                let progress = 1.0 - remaining / t.duration;
                modifier = modifier.combine(t.evaluate(progress, TransitionPhase::Out));
            }
        }
        modifier
    }
}

/// An audio track mixed into the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    pub id: String,
    /// File the samples are decoded from, if any.
    #[serde(default)]
    pub source: Option<PathBuf>,
    pub start_time: f64,
    pub duration: f64,
    /// Linear gain, 1.0 = unity.
    pub volume: f32,
    /// Seconds.
    #[serde(default)]
    pub fade_in: f64,
    #[serde(default)]
    pub fade_out: f64,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            source: None,
            start_time,
            duration,
            volume: 1.0,
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }

    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Gain at `local` seconds into the track, fades included.
    pub fn gain_at(&self, local: f64) -> f32 {
        if local < 0.0 || local >= self.duration {
            return 0.0;
        }
        let mut gain = self.volume;
        if self.fade_in > 0.0 && local < self.fade_in {
            gain *= (local / self.fade_in) as f32;
        }
        let remaining = self.duration - local;
        if self.fade_out > 0.0 && remaining < self.fade_out {
            gain *= (remaining / self.fade_out) as f32;
        }
        gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::TransitionKind;

    #[test]
    fn test_activation_window_is_half_open() {
        let clip = VideoClip::new("c1", "v1", 10.0, 5.0);
        assert!(!clip.is_active_at(9.999));
        assert!(clip.is_active_at(10.0));
        assert!(clip.is_active_at(14.999));
        assert!(!clip.is_active_at(15.0));
    }

    #[test]
    fn test_local_time_applies_trim() {
        let mut clip = VideoClip::new("c1", "v1", 10.0, 5.0);
        clip.trim_start = 2.0;
        assert_eq!(clip.local_time(10.0), 2.0);
        assert_eq!(clip.local_time(12.5), 4.5);
    }

    #[test]
    fn test_transition_windows() {
        let mut clip = VideoClip::new("c1", "v1", 0.0, 4.0);
        clip.transition_in = Some(Transition::new(TransitionKind::Fade, 1.0));
        clip.transition_out = Some(Transition::new(TransitionKind::Fade, 1.0));

        assert_eq!(clip.transition_modifier(0.5).opacity, 0.5);
        assert!(clip.transition_modifier(2.0).is_identity());
        assert_eq!(clip.transition_modifier(3.5).opacity, 0.5);
        assert!(clip.transition_modifier(4.0).is_identity());
    }

    #[test]
    fn test_audio_gain_with_fades() {
        let mut track = AudioTrack::new("a1", 0.0, 10.0);
        track.volume = 0.8;
        track.fade_in = 2.0;
        track.fade_out = 2.0;
        assert_eq!(track.gain_at(0.0), 0.0);
        assert!((track.gain_at(1.0) - 0.4).abs() < 1e-6);
        assert!((track.gain_at(5.0) - 0.8).abs() < 1e-6);
        assert!((track.gain_at(9.0) - 0.4).abs() < 1e-6);
        assert_eq!(track.gain_at(10.0), 0.0);
    }

    #[test]
    fn test_clip_json_uses_camel_case() {
        let clip = VideoClip::new("c1", "v1", 1.0, 2.0);
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["videoId"], "v1");
        assert_eq!(json["aspectRatioAdaptation"], "fit");
        let minimal = r#"{"id":"c2","videoId":"v2","startTime":0.0,"duration":1.0}"#;
        let parsed: VideoClip = serde_json::from_str(minimal).unwrap();
        assert_eq!(parsed.opacity, 1.0);
        assert_eq!(parsed.transform, Transform3D::IDENTITY);
    }
}
