//! Integration tests for the preview state machine driving a scene.

use crate::fixtures;
use parking_lot::{Mutex, RwLock};
use reelcraft_core::{budget, OptimizationConfig};
use reelcraft_media::{ObjectUrlRegistry, SharedVideoLibrary, VideoLibrary};
use reelcraft_playback::{PlaybackEvent, PlaybackState, PreviewController};
use reelcraft_scene::SharedScene;
use reelcraft_timeline::VideoClip;
use std::sync::Arc;

/// A 20 second timeline: one clip per half, both bound into the scene.
fn preview() -> (PreviewController, SharedScene) {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let (mut scene, _) = fixtures::scene(urls, 32, 32, OptimizationConfig::default());

    let clips = vec![
        VideoClip::new("a", "va", 0.0, 10.0),
        VideoClip::new("b", "vb", 10.0, 10.0),
    ];
    for clip in &clips {
        let video = fixtures::pattern_video(&mut library, &clip.video_id, 10.0);
        scene.add_clip(clip, &video).unwrap();
    }

    let scene: SharedScene = Arc::new(Mutex::new(scene));
    let library: SharedVideoLibrary = Arc::new(RwLock::new(library));
    let mut preview = PreviewController::new(library).with_scene(Arc::clone(&scene));
    preview.set_timeline(clips, 20.0);
    (preview, scene)
}

#[test]
fn seek_clamps_to_timeline() {
    let (mut preview, scene) = preview();
    preview.seek(-5.0);
    assert_eq!(preview.current_time(), 0.0);
    preview.seek(25.0);
    assert_eq!(preview.current_time(), 20.0);
    assert_eq!(scene.lock().time(), 20.0);
}

#[test]
fn seek_while_playing_stays_playing() {
    let (mut preview, scene) = preview();
    let events = preview.subscribe();
    preview.play();
    preview.seek(12.5);

    assert_eq!(preview.state(), PlaybackState::Playing);
    assert_eq!(preview.current_time(), 12.5);
    assert!(scene.lock().plane("b").unwrap().active);
    assert!(!scene.lock().plane("a").unwrap().active);

    let states: Vec<_> = events
        .try_iter()
        .filter_map(|e| match e {
            PlaybackEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![PlaybackState::Playing]);
}

#[test]
fn playing_through_the_end_pauses() {
    let (mut preview, scene) = preview();
    let events = preview.subscribe();
    preview.seek(19.5);
    preview.play();
    preview.update(1.0);

    assert_eq!(preview.state(), PlaybackState::Paused);
    assert_eq!(preview.current_time(), 20.0);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, PlaybackEvent::Ended { time } if time == 20.0)));
    assert!(scene.lock().planes().values().all(|p| !p.active));
}

#[test]
fn update_moves_scene_time_with_playhead() {
    let (mut preview, scene) = preview();
    preview.play();
    for _ in 0..30 {
        preview.update(0.1);
    }
    assert!((preview.current_time() - 3.0).abs() < 1e-9);
    assert!((scene.lock().time() - 3.0).abs() < 1e-9);
    assert!(preview.errors().is_empty());
}

#[test]
fn playback_reopens_videos_evicted_from_the_cache() {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let (mut scene, _) = fixtures::scene(urls, 32, 32, OptimizationConfig::default());
    let count = budget::MAX_CACHED_VIDEOS + 1;
    let clips: Vec<VideoClip> = (0..count)
        .map(|i| VideoClip::new(format!("c{i}"), format!("v{i}"), i as f64, 1.0))
        .collect();
    for clip in &clips {
        let video = fixtures::pattern_video(&mut library, &clip.video_id, 1.0);
        scene.add_clip(clip, &video).unwrap();
    }

    let scene: SharedScene = Arc::new(Mutex::new(scene));
    let library: SharedVideoLibrary = Arc::new(RwLock::new(library));
    let mut preview = PreviewController::new(Arc::clone(&library)).with_scene(Arc::clone(&scene));
    preview.set_timeline(clips, count as f64);
    preview.play();
    while preview.is_playing() {
        preview.update(0.25);
        scene.lock().render_frame();
    }

    assert!(preview.errors().is_empty());
    assert_eq!(preview.current_time(), count as f64);
    // Every clip made it to the screen with real pixels.
    let scene = scene.lock();
    for plane in scene.planes().values() {
        assert!(plane.texture.as_ref().unwrap().has_content(), "{}", plane.id);
    }
}
