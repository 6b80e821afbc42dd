//! Generated video source.
//!
//! Produces color bars that shift once per frame, so a frame is a pure
//! function of `(seed, frame index)`. Used by the demo and by tests that need
//! a video element without touching ffmpeg.

use crate::video::{VideoElement, VideoMetadata};
use reelcraft_core::{FrameBuffer, RationalTime, ReelcraftError, Result, SharedFrameBuffer};
use std::sync::Arc;

/// Deterministic synthetic video.
#[derive(Debug)]
pub struct PatternVideo {
    metadata: VideoMetadata,
    seed: u32,
    current_time: f64,
    paused: bool,
    released: bool,
    cached: Option<(i64, SharedFrameBuffer)>,
    fail_play: bool,
    fail_seek: bool,
    seeks: usize,
}

impl PatternVideo {
    pub fn new(metadata: VideoMetadata) -> Self {
        Self {
            metadata,
            seed: 0,
            current_time: 0.0,
            paused: true,
            released: false,
            cached: None,
            fail_play: false,
            fail_seek: false,
            seeks: 0,
        }
    }

    /// Offset the bar pattern so different sources look different.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Make `play` fail, like a source the platform refuses to start.
    pub fn set_fail_play(&mut self, fail: bool) {
        self.fail_play = fail;
    }

    /// Make seeking fail.
    pub fn set_fail_seek(&mut self, fail: bool) {
        self.fail_seek = fail;
    }

    /// Successful seeks since creation.
    pub fn seek_count(&self) -> usize {
        self.seeks
    }

    pub fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn frame_index(&self) -> i64 {
        RationalTime::from_seconds_f64(self.current_time).to_frames(self.metadata.fps)
    }
}

impl VideoElement for PatternVideo {
    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        if self.released {
            return Err(ReelcraftError::Media("seek on released source".into()));
        }
        if self.fail_seek {
            return Err(ReelcraftError::Decoder(format!("seek to {seconds:.3}s failed")));
        }
        self.current_time = seconds.clamp(0.0, self.metadata.duration);
        self.seeks += 1;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.released {
            return Err(ReelcraftError::Playback("play on released source".into()));
        }
        if self.fail_play {
            return Err(ReelcraftError::Playback("play() rejected".into()));
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn advance(&mut self, delta: f64) {
        if self.paused || self.released {
            return;
        }
        self.current_time = (self.current_time + delta).min(self.metadata.duration);
        if self.current_time >= self.metadata.duration {
            self.paused = true;
        }
    }

    fn duration(&self) -> f64 {
        self.metadata.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.metadata.width, self.metadata.height)
    }

    fn current_frame(&mut self) -> Option<SharedFrameBuffer> {
        if self.released {
            return None;
        }
        let index = self.frame_index();
        if let Some((cached, frame)) = &self.cached {
            if *cached == index {
                return Some(Arc::clone(frame));
            }
        }
        let phase = (self.seed as i64 + index).rem_euclid(8) as u32;
        let frame = Arc::new(FrameBuffer::test_pattern(
            self.metadata.width,
            self.metadata.height,
            phase,
        ));
        self.cached = Some((index, Arc::clone(&frame)));
        Some(frame)
    }

    fn release_source(&mut self) {
        self.released = true;
        self.cached = None;
    }

    fn reload_source(&mut self) -> Result<()> {
        self.released = false;
        Ok(())
    }

    fn has_source(&self) -> bool {
        !self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcraft_core::FrameRate;

    fn video() -> PatternVideo {
        PatternVideo::new(VideoMetadata {
            duration: 2.0,
            width: 16,
            height: 4,
            fps: FrameRate::FPS_30,
        })
    }

    #[test]
    fn test_frames_follow_time() {
        let mut v = video();
        let a = v.current_frame().unwrap();
        v.set_current_time(0.05).unwrap();
        let b = v.current_frame().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());

        v.set_current_time(0.0).unwrap();
        assert_eq!(v.current_frame().unwrap().as_bytes(), a.as_bytes());
    }

    #[test]
    fn test_advance_only_while_playing() {
        let mut v = video();
        v.advance(0.5);
        assert_eq!(v.current_time(), 0.0);
        v.play().unwrap();
        v.advance(0.5);
        assert_eq!(v.current_time(), 0.5);
        v.advance(5.0);
        assert_eq!(v.current_time(), 2.0);
        assert!(v.is_paused());
    }

    #[test]
    fn test_failures_are_reported() {
        let mut v = video();
        v.set_fail_play(true);
        v.set_fail_seek(true);
        assert!(v.play().is_err());
        assert!(v.set_current_time(1.0).is_err());
        assert_eq!(v.seek_count(), 0);
    }

    #[test]
    fn test_released_source_stops_decoding() {
        let mut v = video();
        v.release_source();
        assert!(v.current_frame().is_none());
        assert!(v.play().is_err());
        assert!(!v.has_source());
    }

    #[test]
    fn test_reload_keeps_position() {
        let mut v = video();
        v.set_current_time(1.5).unwrap();
        v.release_source();
        v.reload_source().unwrap();
        assert!(v.has_source());
        assert_eq!(v.current_time(), 1.5);
        assert!(v.current_frame().is_some());
    }

    #[test]
    fn test_seed_shifts_pattern() {
        let mut a = video();
        let mut b = video().with_seed(3);
        assert_ne!(
            a.current_frame().unwrap().as_bytes(),
            b.current_frame().unwrap().as_bytes()
        );
    }
}
