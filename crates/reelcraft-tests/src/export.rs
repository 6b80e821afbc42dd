//! Integration tests for deterministic capture and export.

use crate::fixtures;
use parking_lot::Mutex;
use reelcraft_audio::TrackMixer;
use reelcraft_core::{budget, FrameRate, OptimizationConfig};
use reelcraft_export::{
    ExportCancel, ExportManager, ExportSettings, FrameCapture, RawVideoEncoder,
};
use reelcraft_media::{ObjectUrlRegistry, VideoLibrary};
use reelcraft_scene::{SceneManager, SharedScene, SyncMode};
use reelcraft_timeline::{AspectRatioMode, Project, VideoClip};
use std::sync::Arc;

fn scene_with_clip(seconds: f64) -> (SceneManager, VideoClip) {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let (mut scene, _) = fixtures::scene(urls, 16, 16, OptimizationConfig::default());
    let video = fixtures::pattern_video(&mut library, "v", seconds);
    let mut clip = VideoClip::new("c", "v", 0.0, seconds);
    clip.aspect_ratio_adaptation = AspectRatioMode::BlurBackground;
    scene.add_clip(&clip, &video).unwrap();
    (scene, clip)
}

#[test]
fn capture_twice_is_byte_identical() {
    let (mut scene, _) = scene_with_clip(10.0);
    let mut capture = FrameCapture::new();
    let first = capture.capture_frame(&mut scene, 5.0, 100, 100).unwrap();
    let second = capture.capture_frame(&mut scene, 5.0, 100, 100).unwrap();
    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!((first.width, first.height), (100, 100));
}

#[test]
fn capture_restores_camera_aspect() {
    let (mut scene, _) = scene_with_clip(10.0);
    let before = scene.camera().aspect();
    FrameCapture::new().capture_frame(&mut scene, 1.0, 64, 16).unwrap();
    assert_eq!(scene.camera().aspect(), before);
}

#[test]
fn cancel_before_frame_100_of_1000() {
    // 40 s at 25 fps is exactly 1000 frames.
    let (scene, clip) = scene_with_clip(40.0);
    let mut project = Project::new("long");
    project.width = 16;
    project.height = 16;
    project.fps = FrameRate::FPS_25;
    project.add_clip(clip).unwrap();

    let scene: SharedScene = Arc::new(Mutex::new(scene));
    let mut manager = ExportManager::new(
        Arc::clone(&scene),
        Box::new(TrackMixer::new()),
        Box::new(RawVideoEncoder::new()),
    );
    let cancel = ExportCancel::new();
    let handle = cancel.clone();
    let result = manager.export(&project, &ExportSettings::for_project(&project), &cancel, |p| {
        if p.current_frame >= 99 {
            handle.cancel();
        }
    });

    assert_eq!(result.total_frames, 1000);
    assert!(result.cancelled);
    assert!(!result.success);
    assert!(result.error.is_none());
    assert!(result.frames_rendered <= 100);
}

#[test]
fn export_with_more_videos_than_the_cache_holds() {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let (mut scene, _) = fixtures::scene(urls.clone(), 16, 16, OptimizationConfig::default());
    let mut project = Project::new("crowded");
    project.width = 16;
    project.height = 16;
    project.fps = FrameRate::new(10, 1);

    let count = budget::MAX_CACHED_VIDEOS + 1;
    for i in 0..count {
        let video = fixtures::pattern_video(&mut library, &format!("v{i}"), 1.0);
        let clip = VideoClip::new(format!("c{i}"), format!("v{i}"), i as f64, 1.0);
        scene.add_clip(&clip, &video).unwrap();
        project.add_clip(clip).unwrap();
    }
    // The last import pushed the first video out.
    assert!(!scene.optimizer().is_video_cached("v0"));

    scene.set_time(0.5, SyncMode::Force).unwrap();
    assert!(scene.optimizer().is_video_cached("v0"));
    assert_eq!(urls.live_count(), budget::MAX_CACHED_VIDEOS);

    let scene: SharedScene = Arc::new(Mutex::new(scene));
    let mut manager = ExportManager::new(
        Arc::clone(&scene),
        Box::new(TrackMixer::new()),
        Box::new(RawVideoEncoder::new()),
    );
    let result = manager.export(
        &project,
        &ExportSettings::for_project(&project),
        &ExportCancel::new(),
        |_| {},
    );
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.total_frames, 110);
    assert_eq!(result.frames_rendered, 110);
}
