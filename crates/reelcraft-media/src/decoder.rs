//! Frame and audio decoding through an `ffmpeg` subprocess.
//!
//! Each frame request spawns ffmpeg with an input seek and reads one raw
//! RGBA frame from stdout. The last decoded frame is cached by frame index,
//! so repeated renders at the same time cost nothing.

use crate::video::{VideoElement, VideoMetadata};
use reelcraft_core::{FrameBuffer, RationalTime, ReelcraftError, Result, SharedFrameBuffer};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, warn};

/// Locate the ffmpeg binary on `PATH`.
pub fn ffmpeg_path() -> Result<PathBuf> {
    which::which("ffmpeg").map_err(|e| ReelcraftError::Media(format!("ffmpeg not available: {e}")))
}

/// Decode the frame shown at `seconds` as RGBA8.
pub fn decode_frame_at(path: &Path, metadata: &VideoMetadata, seconds: f64) -> Result<FrameBuffer> {
    let out = Command::new(ffmpeg_path()?)
        .args(["-v", "error", "-ss", &format!("{seconds:.6}")])
        .arg("-i")
        .arg(path)
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
        .output()?;

    if !out.status.success() {
        return Err(ReelcraftError::Decoder(format!(
            "ffmpeg frame decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected = metadata.width as usize * metadata.height as usize * 4;
    if expected == 0 || out.stdout.len() < expected {
        return Err(ReelcraftError::Decoder(format!(
            "decoded frame has {} bytes, expected {expected}",
            out.stdout.len()
        )));
    }
    let mut data = out.stdout;
    data.truncate(expected);
    FrameBuffer::from_raw(metadata.width, metadata.height, data)
}

/// Interleaved `f32` PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

/// Decode a file's audio to interleaved stereo `f32` at `sample_rate`.
///
/// A file without an audio stream decodes to empty PCM.
pub fn decode_audio_pcm(path: &Path, sample_rate: u32) -> Result<AudioPcm> {
    let out = Command::new(ffmpeg_path()?)
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        if msg.contains("matches no streams") || msg.contains("does not contain any stream") {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                samples: Vec::new(),
            });
        }
        return Err(ReelcraftError::Decoder(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        samples: pcm_from_le_bytes(&out.stdout),
    })
}

fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Video element backed by a file on disk.
pub struct FfmpegVideo {
    path: PathBuf,
    released: bool,
    metadata: VideoMetadata,
    current_time: f64,
    paused: bool,
    cached: Option<(i64, SharedFrameBuffer)>,
}

impl FfmpegVideo {
    pub fn open(path: impl AsRef<Path>, metadata: VideoMetadata) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReelcraftError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }
        debug!(path = %path.display(), "opened video");
        Ok(Self {
            path: path.to_path_buf(),
            released: false,
            metadata,
            current_time: 0.0,
            paused: true,
            cached: None,
        })
    }
}

impl VideoElement for FfmpegVideo {
    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        if self.released {
            return Err(ReelcraftError::Media("seek on released source".into()));
        }
        self.current_time = seconds.clamp(0.0, self.metadata.duration);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.released {
            return Err(ReelcraftError::Playback("play on released source".into()));
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
        let path = &self.path;
        let index = RationalTime::from_seconds_f64(self.current_time).to_frames(self.metadata.fps);
        if let Some((cached, frame)) = &self.cached {
            if *cached == index {
                return Some(Arc::clone(frame));
            }
        }
        match decode_frame_at(path, &self.metadata, self.current_time) {
            Ok(frame) => {
                let frame = Arc::new(frame);
                self.cached = Some((index, Arc::clone(&frame)));
                Some(frame)
            }
            Err(e) => {
                warn!(path = %path.display(), time = self.current_time, "frame decode failed: {e}");
                self.cached.as_ref().map(|(_, frame)| Arc::clone(frame))
            }
        }
    }

    fn release_source(&mut self) {
        self.released = true;
        self.cached = None;
    }

    fn reload_source(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Err(ReelcraftError::NotFound(format!(
                "File not found: {}",
                self.path.display()
            )));
        }
        self.released = false;
        debug!(path = %self.path.display(), "reopened video");
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

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            duration: 1.0,
            width: 2,
            height: 2,
            fps: FrameRate::FPS_24,
        }
    }

    #[test]
    fn test_pcm_from_le_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(0);
        assert_eq!(pcm_from_le_bytes(&bytes), vec![0.5, -1.0]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        assert!(FfmpegVideo::open("/no/such/file.mp4", metadata()).is_err());
    }

    #[test]
    fn test_clock_without_decoding() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut video = FfmpegVideo::open(file.path(), metadata()).unwrap();
        video.set_current_time(4.0).unwrap();
        assert_eq!(video.current_time(), 1.0);
        video.release_source();
        assert!(video.play().is_err());
        assert!(video.current_frame().is_none());

        video.reload_source().unwrap();
        assert!(video.has_source());
        assert_eq!(video.current_time(), 1.0);
    }
}
