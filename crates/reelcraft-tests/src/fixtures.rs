//! Shared builders for the integration tests.

use reelcraft_core::{FrameRate, OptimizationConfig};
use reelcraft_gpu::CpuAllocator;
use reelcraft_media::{
    share_element, ObjectUrlRegistry, PatternVideo, VideoLibrary, VideoMetadata, VideoResource,
};
use reelcraft_scene::{ManualHeapProbe, SceneConfig, SceneManager};

pub fn metadata(duration: f64) -> VideoMetadata {
    VideoMetadata {
        duration,
        width: 16,
        height: 16,
        fps: FrameRate::FPS_30,
    }
}

/// Register a pattern video of `duration` seconds under `id`.
pub fn pattern_video(library: &mut VideoLibrary, id: &str, duration: f64) -> VideoResource {
    let meta = metadata(duration);
    library.insert(
        id,
        format!("/media/{id}.mp4"),
        meta,
        share_element(PatternVideo::new(meta)),
    )
}

/// Scene on a small canvas with a fake heap probe.
pub fn scene(
    urls: ObjectUrlRegistry,
    width: u32,
    height: u32,
    optimization: OptimizationConfig,
) -> (SceneManager, ManualHeapProbe) {
    let probe = ManualHeapProbe::new();
    let config = SceneConfig {
        width,
        height,
        optimization,
        ..SceneConfig::default()
    };
    let scene = SceneManager::with_backends(
        config,
        urls,
        Box::new(probe.clone()),
        Box::new(CpuAllocator::new()),
    )
    .expect("scene");
    (scene, probe)
}
