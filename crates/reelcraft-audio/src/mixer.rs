//! Track mixdown for export.

use crate::buffer::{AudioBuffer, MIX_SAMPLE_RATE};
use reelcraft_core::Result;
use reelcraft_timeline::AudioTrack;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Produces one mixed buffer for a project's audio tracks.
pub trait AudioMixer: Send {
    /// Mix `tracks` over `[0, duration)` seconds.
    ///
    /// Returns `Ok(None)` when there is nothing to mix.
    fn mix(&mut self, tracks: &[AudioTrack], duration: f64) -> Result<Option<AudioBuffer>>;
}

/// Mixer over pre-decoded per-track sources.
///
/// Sources are resampled linearly to the output rate, scaled by the track's
/// volume and fades, summed, then hard-clipped to `[-1, 1]`.
#[derive(Debug)]
pub struct TrackMixer {
    sample_rate: u32,
    channels: u16,
    sources: HashMap<String, AudioBuffer>,
}

impl TrackMixer {
    pub fn new() -> Self {
        Self {
            sample_rate: MIX_SAMPLE_RATE,
            channels: 2,
            sources: HashMap::new(),
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }

    /// Provide decoded samples for the track with `track_id`.
    pub fn set_source(&mut self, track_id: impl Into<String>, buffer: AudioBuffer) {
        self.sources.insert(track_id.into(), buffer);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn mix_track(&self, out: &mut [f32], track: &AudioTrack, source: &AudioBuffer) {
        let rate = self.sample_rate as f64;
        let stride = self.channels as usize;
        let out_frames = out.len() / stride;
        let start = (track.start_time.max(0.0) * rate).round() as usize;
        let end = ((track.end_time() * rate).round() as usize).min(out_frames);
        let src_rate = source.sample_rate as f64;

        for frame in start..end {
            let local = (frame - start) as f64 / rate;
            let gain = track.gain_at(local);
            if gain == 0.0 {
                continue;
            }
            let position = local * src_rate;
            for ch in 0..self.channels {
                let Some(v) = source.sample_at(position, ch) else {
                    return;
                };
                out[frame * stride + ch as usize] += v * gain;
            }
        }
    }
}

impl Default for TrackMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMixer for TrackMixer {
    fn mix(&mut self, tracks: &[AudioTrack], duration: f64) -> Result<Option<AudioBuffer>> {
        if tracks.is_empty() {
            return Ok(None);
        }
        let mut out = AudioBuffer::silent(self.sample_rate, self.channels, duration);

        for track in tracks {
            match self.sources.get(&track.id) {
                Some(source) => self.mix_track(&mut out.samples, track, source),
                None => warn!(track_id = %track.id, "no decoded source for audio track, skipping"),
            }
        }
        for s in &mut out.samples {
            *s = s.clamp(-1.0, 1.0);
        }
        debug!(tracks = tracks.len(), frames = out.frames(), "audio mixed");
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, seconds: f64) -> AudioBuffer {
        let frames = (seconds * 100.0) as usize;
        AudioBuffer::new(100, 2, vec![value; frames * 2])
    }

    #[test]
    fn test_no_tracks_yields_none() {
        assert!(TrackMixer::new().mix(&[], 5.0).unwrap().is_none());
    }

    #[test]
    fn test_volume_and_placement() {
        let mut mixer = TrackMixer::new().with_sample_rate(100);
        mixer.set_source("a1", constant(0.5, 2.0));
        let mut track = AudioTrack::new("a1", 1.0, 1.0);
        track.volume = 0.5;

        let out = mixer.mix(&[track], 3.0).unwrap().unwrap();
        assert_eq!(out.frames(), 300);
        assert_eq!(out.samples[50 * 2], 0.0);
        assert!((out.samples[150 * 2] - 0.25).abs() < 1e-6);
        assert_eq!(out.samples[250 * 2], 0.0);
    }

    #[test]
    fn test_sum_is_clipped() {
        let mut mixer = TrackMixer::new().with_sample_rate(100);
        mixer.set_source("a", constant(0.8, 1.0));
        mixer.set_source("b", constant(0.8, 1.0));
        let tracks = [AudioTrack::new("a", 0.0, 1.0), AudioTrack::new("b", 0.0, 1.0)];
        let out = mixer.mix(&tracks, 1.0).unwrap().unwrap();
        assert_eq!(out.peak(), 1.0);
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let mut mixer = TrackMixer::new().with_sample_rate(100);
        let out = mixer.mix(&[AudioTrack::new("ghost", 0.0, 1.0)], 1.0).unwrap().unwrap();
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_fade_in_ramps() {
        let mut mixer = TrackMixer::new().with_sample_rate(100);
        mixer.set_source("a", constant(1.0, 2.0));
        let mut track = AudioTrack::new("a", 0.0, 2.0);
        track.fade_in = 1.0;
        let out = mixer.mix(&[track], 2.0).unwrap().unwrap();
        assert!((out.samples[50 * 2] - 0.5).abs() < 1e-6);
        assert!((out.samples[150 * 2] - 1.0).abs() < 1e-6);
    }
}
