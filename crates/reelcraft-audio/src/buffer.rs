//! Interleaved PCM buffers.

/// Sample rate used for mixdown and encoding.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples,
        }
    }

    /// Silence long enough to hold `seconds`.
    pub fn silent(sample_rate: u32, channels: u16, seconds: f64) -> Self {
        let frames = (seconds.max(0.0) * sample_rate as f64).ceil() as usize;
        Self::new(sample_rate, channels, vec![0.0; frames * channels.max(1) as usize])
    }

    /// Sample frames (one sample per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Raw little-endian bytes, as ffmpeg's `f32le` input expects.
    pub fn to_f32le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 4);
        for &sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// One channel, linearly interpolated at a fractional frame position.
    /// Mono sources feed every channel.
    pub(crate) fn sample_at(&self, position: f64, channel: u16) -> Option<f32> {
        let frames = self.frames();
        if frames == 0 || !position.is_finite() || position < 0.0 {
            return None;
        }
        let f0 = position.floor() as usize;
        if f0 >= frames {
            return None;
        }
        let f1 = (f0 + 1).min(frames - 1);
        let frac = (position - f0 as f64) as f32;
        let ch = if self.channels == 1 {
            0
        } else {
            channel.min(self.channels - 1) as usize
        };
        let stride = self.channels as usize;
        let v0 = self.samples[f0 * stride + ch];
        let v1 = self.samples[f1 * stride + ch];
        Some(v0 + (v1 - v0) * frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_duration() {
        let buf = AudioBuffer::silent(48_000, 2, 1.5);
        assert_eq!(buf.frames(), 72_000);
        assert_eq!(buf.duration(), 1.5);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_f32le_bytes() {
        let buf = AudioBuffer::new(48_000, 1, vec![1.0, -0.5]);
        let bytes = buf.to_f32le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
    }

    #[test]
    fn test_interpolated_sample() {
        let buf = AudioBuffer::new(10, 1, vec![0.0, 1.0]);
        assert_eq!(buf.sample_at(0.5, 1), Some(0.5));
        assert_eq!(buf.sample_at(2.0, 0), None);
    }
}
