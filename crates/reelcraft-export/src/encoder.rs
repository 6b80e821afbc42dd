//! Encoder contract, format presets, and the ffmpeg pipe encoder.

use reelcraft_audio::AudioBuffer;
use reelcraft_core::{FrameBuffer, FrameRate, ReelcraftError, Result};
use reelcraft_media::decoder::ffmpeg_path;
use reelcraft_timeline::Project;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, warn};
use uuid::Uuid;

// ── Format presets ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::Vp9 => "libvpx-vp9",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::H264 | Self::H265 => "mp4",
            Self::Vp9 => "webm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Opus,
}

impl AudioCodec {
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Opus => "libopus",
        }
    }
}

/// Export quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityPreset {
    Draft,
    Normal,
    High,
}

impl QualityPreset {
    /// CRF used when the format does not set one.
    pub fn default_crf(self, codec: VideoCodec) -> u32 {
        let base = match self {
            Self::Draft => 28,
            Self::Normal => 23,
            Self::High => 18,
        };
        match codec {
            VideoCodec::Vp9 => base + 8,
            _ => base,
        }
    }

    /// x264/x265 speed preset.
    pub fn encoder_preset(self) -> &'static str {
        match self {
            Self::Draft => "veryfast",
            Self::Normal => "medium",
            Self::High => "slow",
        }
    }
}

/// Export format configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFormat {
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub quality: QualityPreset,
    /// CRF value (lower is better). Falls back to the quality preset.
    pub crf: Option<u32>,
    /// Bitrate in kbps, used instead of CRF when set.
    pub video_bitrate: Option<u32>,
    /// Audio bitrate in kbps.
    pub audio_bitrate: u32,
}

impl ExportFormat {
    /// Vertical 1080x1920 H.264 at 30 fps.
    pub fn h264_vertical() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            width: 1080,
            height: 1920,
            frame_rate: FrameRate::FPS_30,
            quality: QualityPreset::Normal,
            crf: None,
            video_bitrate: None,
            audio_bitrate: 192,
        }
    }

    pub fn h264_hd() -> Self {
        Self {
            width: 1920,
            height: 1080,
            crf: Some(18),
            ..Self::h264_vertical()
        }
    }

    pub fn h265_4k() -> Self {
        Self {
            video_codec: VideoCodec::H265,
            width: 3840,
            height: 2160,
            quality: QualityPreset::High,
            crf: Some(20),
            audio_bitrate: 256,
            ..Self::h264_vertical()
        }
    }

    /// Web-optimized VP9.
    pub fn vp9_web() -> Self {
        Self {
            video_codec: VideoCodec::Vp9,
            audio_codec: AudioCodec::Opus,
            width: 1920,
            height: 1080,
            crf: Some(30),
            audio_bitrate: 128,
            ..Self::h264_vertical()
        }
    }

    /// Bytes in one RGBA input frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Reject sizes the yuv420p output cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "export size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "export size must be even, got {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate.numerator == 0 || self.frame_rate.denominator == 0 {
            return Err(ReelcraftError::InvalidParameter("frame rate must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::h264_vertical()
    }
}

/// What to export and where the encoded file goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    pub format: ExportFormat,
    /// Written when set. Otherwise the encoded bytes are returned.
    pub output: Option<PathBuf>,
}

impl ExportSettings {
    /// The default format at the project's canvas size and frame rate.
    pub fn for_project(project: &Project) -> Self {
        Self {
            format: ExportFormat {
                width: project.width,
                height: project.height,
                frame_rate: project.fps,
                ..ExportFormat::default()
            },
            output: None,
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }
}

// ── Encoder contract ────────────────────────────────────────────

/// Turns an ordered stream of RGBA frames plus one mixed audio buffer into
/// an encoded file.
pub trait VideoEncoder: Send {
    /// Start a stream. Called once before any frame.
    fn begin(&mut self, format: &ExportFormat, audio: Option<&AudioBuffer>) -> Result<()>;

    /// Append the next frame. Frames arrive in presentation order.
    fn encode_frame(&mut self, frame: &FrameBuffer) -> Result<()>;

    /// Flush and return the encoded bytes. `progress` receives `0.0..=1.0`.
    fn finish(&mut self, progress: &mut dyn FnMut(f64)) -> Result<Vec<u8>>;

    /// Drop any partial output. Safe to call at any point.
    fn abort(&mut self);
}

fn check_frame(format: &ExportFormat, frame: &FrameBuffer) -> Result<()> {
    if (frame.width, frame.height) != (format.width, format.height) {
        return Err(ReelcraftError::Encoder(format!(
            "frame is {}x{}, stream is {}x{}",
            frame.width, frame.height, format.width, format.height
        )));
    }
    Ok(())
}

/// Concatenated raw RGBA frames. Needs no external tools.
#[derive(Debug, Default)]
pub struct RawVideoEncoder {
    format: Option<ExportFormat>,
    data: Vec<u8>,
    frames: u64,
    audio_samples: usize,
}

impl RawVideoEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames
    }

    /// Interleaved samples received with the last `begin`.
    pub fn audio_samples(&self) -> usize {
        self.audio_samples
    }
}

impl VideoEncoder for RawVideoEncoder {
    fn begin(&mut self, format: &ExportFormat, audio: Option<&AudioBuffer>) -> Result<()> {
        format.validate()?;
        self.format = Some(format.clone());
        self.data.clear();
        self.frames = 0;
        self.audio_samples = audio.map_or(0, |a| a.samples.len());
        Ok(())
    }

    fn encode_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        let format = self
            .format
            .as_ref()
            .ok_or_else(|| ReelcraftError::Encoder("encoder not started".into()))?;
        check_frame(format, frame)?;
        self.data.extend_from_slice(frame.as_bytes());
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self, progress: &mut dyn FnMut(f64)) -> Result<Vec<u8>> {
        if self.format.take().is_none() {
            return Err(ReelcraftError::Encoder("encoder not started".into()));
        }
        progress(1.0);
        Ok(std::mem::take(&mut self.data))
    }

    fn abort(&mut self) {
        self.format = None;
        self.data.clear();
    }
}

// ── FFmpeg pipe encoder ─────────────────────────────────────────

/// Build the ffmpeg argument list for a raw RGBA pipe input.
///
/// `audio` is the f32le file with its sample rate and channel count.
pub fn ffmpeg_args(format: &ExportFormat, audio: Option<(&Path, u32, u16)>, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", format.width, format.height),
        "-r".into(),
        format!("{}/{}", format.frame_rate.numerator, format.frame_rate.denominator),
        "-i".into(),
        "pipe:0".into(),
    ];

    if let Some((path, sample_rate, channels)) = audio {
        args.extend([
            "-f".into(),
            "f32le".into(),
            "-ar".into(),
            sample_rate.to_string(),
            "-ac".into(),
            channels.to_string(),
            "-i".into(),
            path.to_string_lossy().into_owned(),
        ]);
    }

    args.extend(["-c:v".into(), format.video_codec.ffmpeg_encoder().into()]);
    match format.video_bitrate {
        Some(kbps) => args.extend(["-b:v".into(), format!("{kbps}k")]),
        None => {
            let crf = format
                .crf
                .unwrap_or_else(|| format.quality.default_crf(format.video_codec));
            args.extend(["-crf".into(), crf.to_string()]);
            if format.video_codec == VideoCodec::Vp9 {
                args.extend(["-b:v".into(), "0".into()]);
            }
        }
    }
    if format.video_codec != VideoCodec::Vp9 {
        args.extend(["-preset".into(), format.quality.encoder_preset().into()]);
    }
    args.extend(["-pix_fmt".into(), "yuv420p".into()]);

    if audio.is_some() {
        args.extend([
            "-c:a".into(),
            format.audio_codec.ffmpeg_encoder().into(),
            "-b:a".into(),
            format!("{}k", format.audio_bitrate),
            "-shortest".into(),
        ]);
    } else {
        args.push("-an".into());
    }

    if format.video_codec.extension() == "mp4" {
        args.extend(["-movflags".into(), "+faststart".into()]);
    }
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Pipes frames into an `ffmpeg` child and reads back the finished file.
#[derive(Debug, Default)]
pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    format: Option<ExportFormat>,
    output: Option<PathBuf>,
    audio_file: Option<PathBuf>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an ffmpeg binary is on `PATH`.
    pub fn is_available() -> bool {
        ffmpeg_path().is_ok()
    }

    fn temp_path(extension: &str) -> PathBuf {
        std::env::temp_dir().join(format!("reelcraft-{}.{extension}", Uuid::new_v4()))
    }

    fn remove_temp_files(&mut self) {
        for path in [self.output.take(), self.audio_file.take()].into_iter().flatten() {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove temp file");
                }
            }
        }
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn begin(&mut self, format: &ExportFormat, audio: Option<&AudioBuffer>) -> Result<()> {
        format.validate()?;
        self.abort();
        let ffmpeg = ffmpeg_path().map_err(|e| ReelcraftError::Encoder(e.to_string()))?;

        let audio = audio.filter(|a| !a.is_empty());
        if let Some(buffer) = audio {
            let path = Self::temp_path("f32le");
            fs::write(&path, buffer.to_f32le_bytes())?;
            self.audio_file = Some(path);
        }
        let output = Self::temp_path(format.video_codec.extension());
        let audio_input = self
            .audio_file
            .as_deref()
            .zip(audio)
            .map(|(path, buffer)| (path, buffer.sample_rate, buffer.channels));
        let args = ffmpeg_args(format, audio_input, &output);
        self.output = Some(output);
        debug!(?args, "spawning ffmpeg");

        let mut child = match Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.remove_temp_files();
                return Err(ReelcraftError::Encoder(format!("failed to spawn ffmpeg: {e}")));
            }
        };
        self.stdin = child.stdin.take();
        self.child = Some(child);
        self.format = Some(format.clone());
        if self.stdin.is_none() {
            self.abort();
            return Err(ReelcraftError::Encoder("failed to open ffmpeg stdin".into()));
        }
        Ok(())
    }

    fn encode_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        let (Some(format), Some(stdin)) = (self.format.as_ref(), self.stdin.as_mut()) else {
            return Err(ReelcraftError::Encoder("encoder not started".into()));
        };
        check_frame(format, frame)?;
        stdin
            .write_all(frame.as_bytes())
            .map_err(|e| ReelcraftError::Encoder(format!("ffmpeg stdin write failed: {e}")))
    }

    fn finish(&mut self, progress: &mut dyn FnMut(f64)) -> Result<Vec<u8>> {
        // Closing stdin signals end of stream.
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| ReelcraftError::Encoder("encoder not started".into()))?;
        self.format = None;
        progress(0.1);

        let out = match child.wait_with_output() {
            Ok(out) => out,
            Err(e) => {
                self.remove_temp_files();
                return Err(ReelcraftError::Encoder(format!("ffmpeg wait failed: {e}")));
            }
        };
        if !out.status.success() {
            self.remove_temp_files();
            return Err(ReelcraftError::Encoder(format!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        progress(0.8);

        let data = match self.output.as_deref().map(fs::read) {
            Some(Ok(data)) => data,
            Some(Err(e)) => {
                self.remove_temp_files();
                return Err(e.into());
            }
            None => return Err(ReelcraftError::Internal("missing ffmpeg output path".into())),
        };
        self.remove_temp_files();
        progress(1.0);
        debug!(bytes = data.len(), "ffmpeg encode finished");
        Ok(data)
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.format = None;
        self.remove_temp_files();
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_without_audio() {
        let format = ExportFormat::h264_vertical();
        let args = ffmpeg_args(&format, None, Path::new("/tmp/out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 1080x1920 -r 30/1 -i pipe:0"));
        assert!(joined.contains("-c:v libx264 -crf 23 -preset medium -pix_fmt yuv420p"));
        assert!(joined.contains("-an"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_args_with_audio_and_bitrate() {
        let format = ExportFormat {
            video_bitrate: Some(8000),
            ..ExportFormat::h264_hd()
        };
        let args = ffmpeg_args(&format, Some((Path::new("/tmp/a.f32le"), 48_000, 2)), Path::new("o.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-f f32le -ar 48000 -ac 2 -i /tmp/a.f32le"));
        assert!(joined.contains("-b:v 8000k"));
        assert!(!joined.contains("-crf"));
        assert!(joined.contains("-c:a aac -b:a 192k -shortest"));
    }

    #[test]
    fn test_vp9_uses_constant_quality() {
        let args = ffmpeg_args(&ExportFormat::vp9_web(), None, Path::new("o.webm")).join(" ");
        assert!(args.contains("-c:v libvpx-vp9 -crf 30 -b:v 0"));
        assert!(!args.contains("-preset"));
        assert!(!args.contains("movflags"));
    }

    #[test]
    fn test_validate_rejects_odd_sizes() {
        let format = ExportFormat {
            width: 101,
            ..ExportFormat::default()
        };
        assert!(format.validate().is_err());
        assert!(ExportFormat::default().validate().is_ok());
    }

    #[test]
    fn test_raw_encoder_collects_frames() {
        let format = ExportFormat {
            width: 2,
            height: 2,
            ..ExportFormat::default()
        };
        let mut encoder = RawVideoEncoder::new();
        encoder.begin(&format, None).unwrap();
        encoder.encode_frame(&FrameBuffer::filled(2, 2, [1, 2, 3, 4])).unwrap();
        encoder.encode_frame(&FrameBuffer::filled(2, 2, [5, 6, 7, 8])).unwrap();
        assert!(encoder.encode_frame(&FrameBuffer::new(4, 4)).is_err());
        let mut last = 0.0;
        let data = encoder.finish(&mut |p| last = p).unwrap();
        assert_eq!(data.len(), 2 * 2 * 2 * 4);
        assert_eq!(&data[..4], &[1, 2, 3, 4]);
        assert_eq!(last, 1.0);
        assert_eq!(encoder.frames_encoded(), 2);
    }

    #[test]
    fn test_settings_follow_project() {
        let mut project = Project::new("p");
        project.width = 720;
        project.height = 1280;
        project.fps = FrameRate::FPS_24;
        let settings = ExportSettings::for_project(&project).with_output("/tmp/x.mp4");
        assert_eq!((settings.format.width, settings.format.height), (720, 1280));
        assert_eq!(settings.format.frame_rate, FrameRate::FPS_24);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["format"]["videoCodec"], "H264");
    }
}
