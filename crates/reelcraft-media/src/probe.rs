//! Media file probing via `ffprobe`.

use crate::video::VideoMetadata;
use reelcraft_core::{FrameRate, ReelcraftError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    pub path: String,
    /// Seconds.
    pub duration: f64,
    pub video_streams: Vec<VideoStreamInfo>,
    pub audio_streams: Vec<AudioStreamInfo>,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

impl MediaProbe {
    /// Run ffprobe on `path`.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReelcraftError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }
        let ffprobe = which::which("ffprobe")
            .map_err(|e| ReelcraftError::Media(format!("ffprobe not available: {e}")))?;

        let out = Command::new(ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()?;
        if !out.status.success() {
            return Err(ReelcraftError::Media(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Self::from_json(&path.to_string_lossy(), &out.stdout)
    }

    /// Parse ffprobe's `-print_format json` output.
    pub fn from_json(path: &str, json: &[u8]) -> Result<Self> {
        let parsed: ProbeOut = serde_json::from_slice(json)?;

        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();
        let mut stream_duration = 0.0f64;
        for stream in &parsed.streams {
            let codec = stream.codec_name.clone().unwrap_or_default();
            match stream.codec_type.as_deref() {
                Some("video") => {
                    let (Some(width), Some(height)) = (stream.width, stream.height) else {
                        continue;
                    };
                    let frame_rate = stream
                        .r_frame_rate
                        .as_deref()
                        .and_then(parse_rate)
                        .unwrap_or_default();
                    video_streams.push(VideoStreamInfo {
                        index: stream.index,
                        codec,
                        width,
                        height,
                        frame_rate,
                    });
                }
                Some("audio") => audio_streams.push(AudioStreamInfo {
                    index: stream.index,
                    codec,
                    sample_rate: stream
                        .sample_rate
                        .as_deref()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(48_000),
                    channels: stream.channels.unwrap_or(2),
                }),
                _ => {}
            }
            if let Some(d) = stream.duration.as_deref().and_then(|d| d.parse::<f64>().ok()) {
                stream_duration = stream_duration.max(d);
            }
        }

        let format = parsed.format.as_ref();
        let duration = format
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(stream_duration);

        Ok(Self {
            path: path.to_string(),
            duration,
            video_streams,
            audio_streams,
            format: format
                .and_then(|f| f.format_name.clone())
                .unwrap_or_default(),
        })
    }

    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// Metadata of the primary video stream.
    pub fn video_metadata(&self) -> Option<VideoMetadata> {
        self.primary_video().map(|v| VideoMetadata {
            duration: self.duration,
            width: v.width,
            height: v.height,
            fps: v.frame_rate,
        })
    }
}

/// `"30000/1001"` -> 29.97 fps. Zero rates are rejected.
fn parse_rate(text: &str) -> Option<FrameRate> {
    let (num, den) = text.split_once('/').unwrap_or((text, "1"));
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    (num > 0 && den > 0).then(|| FrameRate::new(num, den))
}
