//! Export orchestration: mixdown, frame rendering, encoding.

use crate::capture::FrameCapture;
use crate::encoder::{ExportSettings, VideoEncoder};
use reelcraft_audio::AudioMixer;
use reelcraft_core::{ReelcraftError, Result};
use reelcraft_scene::{SceneManager, SharedScene, SyncMode};
use reelcraft_timeline::Project;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Handle for cancelling an in-progress export.
#[derive(Debug, Clone)]
pub struct ExportCancel(Arc<AtomicBool>);

impl ExportCancel {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation. Takes effect before the next frame.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ExportCancel {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Preparing,
    Rendering,
    Encoding,
    Complete,
}

impl ExportPhase {
    /// Percent range covered by the phase.
    pub fn range(self) -> (f64, f64) {
        match self {
            Self::Preparing => (0.0, 10.0),
            Self::Rendering => (10.0, 65.0),
            Self::Encoding => (70.0, 95.0),
            Self::Complete => (100.0, 100.0),
        }
    }

    fn at(self, fraction: f64) -> f64 {
        let (lo, hi) = self.range();
        lo + (hi - lo) * fraction.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// Overall completion, never decreasing within one export.
    pub percent: f64,
    /// Frames rendered so far.
    pub current_frame: u64,
    pub total_frames: u64,
    /// Estimated seconds left in the current phase.
    pub eta_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportResult {
    pub success: bool,
    /// Set when the export stopped because of `ExportCancel`.
    pub cancelled: bool,
    pub error: Option<String>,
    pub frames_rendered: u64,
    pub total_frames: u64,
    /// Where the encoded file was written.
    pub output: Option<PathBuf>,
    /// Encoded bytes, returned when no output path was given.
    pub data: Option<Vec<u8>>,
}

/// `elapsed / done * remaining`, or `None` before any work is done.
fn eta(elapsed: f64, done: f64, remaining: f64) -> Option<f64> {
    (done > 0.0).then(|| elapsed / done * remaining.max(0.0))
}

struct ProgressReporter<'a> {
    callback: &'a mut dyn FnMut(&ExportProgress),
    last_percent: f64,
    frames_rendered: u64,
    total_frames: u64,
}

impl ProgressReporter<'_> {
    fn report(&mut self, phase: ExportPhase, fraction: f64, eta_seconds: Option<f64>) {
        self.last_percent = self.last_percent.max(phase.at(fraction));
        (self.callback)(&ExportProgress {
            phase,
            percent: self.last_percent,
            current_frame: self.frames_rendered,
            total_frames: self.total_frames,
            eta_seconds,
        });
    }
}

/// Renders a project frame by frame through the shared scene and hands the
/// frames plus one audio mixdown to a `VideoEncoder`.
///
/// The scene lock is held for the whole export, so interactive ticks block
/// until it finishes.
pub struct ExportManager {
    scene: SharedScene,
    mixer: Box<dyn AudioMixer>,
    encoder: Box<dyn VideoEncoder>,
    capture: FrameCapture,
}

impl ExportManager {
    pub fn new(scene: SharedScene, mixer: Box<dyn AudioMixer>, encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            scene,
            mixer,
            encoder,
            capture: FrameCapture::new(),
        }
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    /// Export `project`. Never panics or returns early with an error: all
    /// failures, including cancellation, are folded into the result.
    pub fn export(
        &mut self,
        project: &Project,
        settings: &ExportSettings,
        cancel: &ExportCancel,
        mut on_progress: impl FnMut(&ExportProgress),
    ) -> ExportResult {
        let total_frames = settings.format.frame_rate.frame_count(project.duration());
        let mut reporter = ProgressReporter {
            callback: &mut on_progress,
            last_percent: 0.0,
            frames_rendered: 0,
            total_frames,
        };
        info!(
            project = %project.name,
            total_frames,
            width = settings.format.width,
            height = settings.format.height,
            "export started"
        );

        let scene = Arc::clone(&self.scene);
        let mut scene = scene.lock();
        let saved_time = scene.time();
        let outcome = self.run(&mut scene, project, settings, cancel, &mut reporter);
        self.capture.release(&mut scene);
        if let Err(e) = scene.set_time(saved_time, SyncMode::Force) {
            warn!(error = %e, "failed to restore scene time after export");
        }
        drop(scene);

        let mut result = ExportResult {
            frames_rendered: reporter.frames_rendered,
            total_frames,
            ..ExportResult::default()
        };
        match outcome {
            Ok(data) => {
                result.success = true;
                match &settings.output {
                    Some(path) => result.output = Some(path.clone()),
                    None => result.data = Some(data),
                }
                reporter.report(ExportPhase::Complete, 1.0, Some(0.0));
                info!(frames = result.frames_rendered, "export complete");
            }
            Err(ReelcraftError::Cancelled) => {
                self.encoder.abort();
                result.cancelled = true;
                info!(frames = result.frames_rendered, "export cancelled");
            }
            Err(e) => {
                self.encoder.abort();
                warn!(error = %e, frames = result.frames_rendered, "export failed");
                result.error = Some(e.to_string());
            }
        }
        result
    }

    fn run(
        &mut self,
        scene: &mut SceneManager,
        project: &Project,
        settings: &ExportSettings,
        cancel: &ExportCancel,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<Vec<u8>> {
        let format = &settings.format;
        let total = reporter.total_frames;

        // Preparing
        reporter.report(ExportPhase::Preparing, 0.0, None);
        format.validate()?;
        if total == 0 {
            return Err(ReelcraftError::InvalidParameter("project is empty".into()));
        }
        for clip in &project.clips {
            if scene.clip(&clip.id).is_none() {
                warn!(clip_id = %clip.id, "clip is not loaded in the scene, skipping");
            }
        }
        let audio = self.mixer.mix(&project.audio_tracks, project.duration())?;
        reporter.report(ExportPhase::Preparing, 0.5, None);
        self.encoder.begin(format, audio.as_ref())?;
        reporter.report(ExportPhase::Preparing, 1.0, None);

        // Rendering
        let started = Instant::now();
        for index in 0..total {
            if cancel.is_cancelled() {
                return Err(ReelcraftError::Cancelled);
            }
            let time = format.frame_rate.frame_time(0.0, index);
            let frame = self.capture.capture_frame(scene, time, format.width, format.height)?;
            self.encoder.encode_frame(&frame)?;
            reporter.frames_rendered = index + 1;

            let done = (index + 1) as f64;
            let remaining = (total - index - 1) as f64;
            let eta_seconds = eta(started.elapsed().as_secs_f64(), done, remaining);
            reporter.report(ExportPhase::Rendering, done / total as f64, eta_seconds);
        }

        // Encoding
        if cancel.is_cancelled() {
            return Err(ReelcraftError::Cancelled);
        }
        let started = Instant::now();
        reporter.report(ExportPhase::Encoding, 0.0, None);
        let data = self.encoder.finish(&mut |fraction| {
            let eta_seconds = eta(started.elapsed().as_secs_f64(), fraction, 1.0 - fraction);
            reporter.report(ExportPhase::Encoding, fraction, eta_seconds);
        })?;

        if let Some(path) = &settings.output {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &data)?;
        }
        Ok(data)
    }
}
