//! Reelcraft - headless 3D video compositor
//!
//! Builds a project (from files given on the command line, or generated
//! pattern videos), previews it through the scene in real time, then
//! exports it.

use anyhow::{Context, Result};
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use reelcraft_audio::{AudioBuffer, TrackMixer, MIX_SAMPLE_RATE};
use reelcraft_core::{FrameRate, OptimizationConfig, Transform3D};
use reelcraft_export::{
    ExportCancel, ExportManager, ExportPhase, ExportSettings, FfmpegEncoder, RawVideoEncoder,
    VideoEncoder,
};
use reelcraft_media::{
    share_element, ObjectUrlRegistry, PatternVideo, SharedVideoLibrary, VideoLibrary,
    VideoMetadata, VideoResource,
};
use reelcraft_playback::{PlaybackEvent, PreviewController};
use reelcraft_scene::{SceneConfig, SceneManager, SharedScene};
use reelcraft_timeline::{AspectRatioMode, AudioTrack, Project, Transition, TransitionKind, VideoClip};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// Longest slice of an imported file placed on the demo timeline.
const MAX_CLIP_SECONDS: f64 = 5.0;

struct Args {
    output: Option<PathBuf>,
    inputs: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut output = None;
    let mut inputs = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--out" => {
                output = Some(PathBuf::from(args.next().context("--out needs a path")?));
            }
            _ => inputs.push(PathBuf::from(arg)),
        }
    }
    Ok(Args { output, inputs })
}

fn load_config() -> OptimizationConfig {
    let Some(path) = OptimizationConfig::default_path().filter(|p| p.exists()) else {
        return OptimizationConfig::default();
    };
    match OptimizationConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable optimization config");
            OptimizationConfig::default()
        }
    }
}

/// Lay the videos out back to back, cross-fading between neighbours.
fn build_project(resources: &[VideoResource]) -> Project {
    let mut project = Project::new("Reelcraft Demo");
    project.width = 360;
    project.height = 640;
    project.fps = FrameRate::FPS_30;

    let modes = [
        AspectRatioMode::BlurBackground,
        AspectRatioMode::Fit,
        AspectRatioMode::Fill,
    ];
    let mut start = 0.0;
    for (i, resource) in resources.iter().enumerate() {
        let duration = resource.metadata.duration.min(MAX_CLIP_SECONDS);
        let mut clip = VideoClip::new(format!("clip-{i}"), &resource.id, start, duration);
        clip.aspect_ratio_adaptation = modes[i % modes.len()];
        clip.transform = Transform3D::from_position(Vec3::new(0.0, 0.0, -(i as f32) * 0.1));
        clip.transition_in = Some(Transition::new(TransitionKind::Fade, 0.5));
        clip.transition_out = Some(Transition::new(TransitionKind::Fade, 0.5));
        if let Err(e) = project.add_clip(clip) {
            warn!(error = %e, "skipping clip");
            continue;
        }
        start += duration;
    }
    let mut music = AudioTrack::new("music", 0.0, start);
    music.fade_in = 0.5;
    music.fade_out = 1.0;
    project.add_audio_track(music);
    project
}

fn load_videos(library: &mut VideoLibrary, inputs: &[PathBuf]) -> Vec<VideoResource> {
    if inputs.is_empty() {
        return [(1280, 720), (720, 1280), (1080, 1080)]
            .into_iter()
            .enumerate()
            .map(|(i, (width, height))| {
                let metadata = VideoMetadata {
                    duration: 2.0,
                    width,
                    height,
                    fps: FrameRate::FPS_30,
                };
                let element = PatternVideo::new(metadata).with_seed(i as u32);
                library.insert(
                    format!("pattern-{i}"),
                    format!("pattern-{i}.mp4"),
                    metadata,
                    share_element(element),
                )
            })
            .collect();
    }
    inputs
        .iter()
        .enumerate()
        .filter_map(|(i, path)| match library.import(format!("video-{i}"), path) {
            Ok(resource) => Some(resource),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to import video");
                None
            }
        })
        .collect()
}

/// 440 Hz stereo tone standing in for decoded music.
fn demo_tone(seconds: f64) -> AudioBuffer {
    let rate = MIX_SAMPLE_RATE;
    let frames = (seconds * rate as f64).ceil() as usize;
    let samples = (0..frames)
        .flat_map(|i| {
            let v = (i as f32 / rate as f32 * 440.0 * std::f32::consts::TAU).sin() * 0.2;
            [v, v]
        })
        .collect();
    AudioBuffer::new(rate, 2, samples)
}

#[cfg(feature = "gpu")]
async fn create_scene(config: SceneConfig, urls: ObjectUrlRegistry) -> Result<SceneManager> {
    use reelcraft_gpu::{GpuContext, WgpuAllocator};
    use reelcraft_scene::ProcHeapProbe;

    match GpuContext::new().await {
        Ok(context) => SceneManager::with_backends(
            config,
            urls,
            Box::new(ProcHeapProbe::new()),
            Box::new(WgpuAllocator::new(&context)),
        )
        .context("scene initialization failed"),
        Err(e) => {
            warn!(error = %e, "GPU unavailable, falling back to CPU textures");
            SceneManager::new(config, urls).context("scene initialization failed")
        }
    }
}

#[cfg(not(feature = "gpu"))]
async fn create_scene(config: SceneConfig, urls: ObjectUrlRegistry) -> Result<SceneManager> {
    SceneManager::new(config, urls).context("scene initialization failed")
}

async fn run_preview(preview: &mut PreviewController, scene: &SharedScene) {
    let events = preview.subscribe();
    scene.lock().start_render_loop();
    preview.play();

    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();
    'preview: loop {
        interval.tick().await;
        let now = Instant::now();
        let delta = now.duration_since(last).as_secs_f64();
        last = now;

        preview.update(delta);
        scene.lock().tick(delta);

        for event in events.try_iter() {
            match event {
                PlaybackEvent::Ended { time } => {
                    info!(time, "preview finished");
                    break 'preview;
                }
                PlaybackEvent::StateChanged { from, to } => info!(?from, ?to, "playback state"),
                PlaybackEvent::TimeUpdated { .. } => {}
            }
        }
    }
    scene.lock().stop_render_loop();

    let stats = scene.lock().stats();
    info!(
        frames = stats.frames_rendered,
        planes = stats.planes,
        culled = stats.optimizer.culling.culled,
        cache_hit_rate = stats.optimizer.cache.hit_rate,
        "preview stats"
    );
    for entry in preview.errors().entries() {
        warn!(category = ?entry.category, clip_id = ?entry.clip_id, "{}", entry.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Reelcraft starting...");
    let args = parse_args()?;

    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let resources = load_videos(&mut library, &args.inputs);
    anyhow::ensure!(!resources.is_empty(), "no videos to work with");
    let project = build_project(&resources);
    info!(clips = project.clips.len(), duration = project.duration(), "project ready");

    let config = SceneConfig {
        width: project.width,
        height: project.height,
        optimization: load_config(),
        ..SceneConfig::default()
    };
    let mut scene = create_scene(config, urls).await?;
    for clip in &project.clips {
        if let Some(resource) = library.get(&clip.video_id) {
            scene.add_clip(clip, resource)?;
        }
    }
    let scene: SharedScene = Arc::new(Mutex::new(scene));
    let library: SharedVideoLibrary = Arc::new(RwLock::new(library));

    let mut preview = PreviewController::new(Arc::clone(&library)).with_scene(Arc::clone(&scene));
    preview.load_project(&project);
    run_preview(&mut preview, &scene).await;
    preview.pause();

    let (encoder, extension): (Box<dyn VideoEncoder>, &str) = if FfmpegEncoder::is_available() {
        (Box::new(FfmpegEncoder::new()), "mp4")
    } else {
        warn!("ffmpeg not found, exporting raw RGBA frames");
        (Box::new(RawVideoEncoder::new()), "rgba")
    };
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("reelcraft-demo.{extension}")));
    let settings = ExportSettings::for_project(&project).with_output(&output);

    let mut mixer = TrackMixer::new();
    mixer.set_source("music", demo_tone(project.duration()));
    let mut manager = ExportManager::new(Arc::clone(&scene), Box::new(mixer), encoder);
    let cancel = ExportCancel::new();

    let result = tokio::task::block_in_place(|| {
        let mut last_logged = -1;
        manager.export(&project, &settings, &cancel, |progress| {
            let decile = (progress.percent / 10.0).floor() as i32;
            if decile > last_logged || progress.phase == ExportPhase::Complete {
                last_logged = decile;
                info!(
                    phase = ?progress.phase,
                    percent = progress.percent.round(),
                    frame = progress.current_frame,
                    total = progress.total_frames,
                    eta = ?progress.eta_seconds,
                    "export progress"
                );
            }
        })
    });

    if let Some(error) = result.error {
        anyhow::bail!("export failed after {} frames: {error}", result.frames_rendered);
    }
    info!(
        output = %output.display(),
        frames = result.frames_rendered,
        "export written"
    );
    Ok(())
}
