//! Integration tests for culling, LOD, activation and memory pressure.

use crate::fixtures;
use glam::Vec3;
use parking_lot::Mutex;
use proptest::prelude::*;
use reelcraft_core::{LodThresholds, OptimizationConfig, Transform3D};
use reelcraft_media::{ObjectUrlRegistry, VideoLibrary};
use reelcraft_scene::{
    tier_for_distance, LodTier, ManualHeapProbe, MemoryMonitor, MemoryWarningLevel, SyncMode,
};
use reelcraft_timeline::VideoClip;
use std::sync::Arc;

proptest! {
    #[test]
    fn lod_never_improves_with_distance(
        a in 0.0f32..200.0,
        b in 0.0f32..200.0,
        high in 0.0f32..50.0,
        spread in 0.0f32..50.0,
    ) {
        let thresholds = LodThresholds::new(high, high + spread).unwrap();
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(tier_for_distance(near, &thresholds) <= tier_for_distance(far, &thresholds));
    }
}

#[test]
fn lod_tiers_follow_plane_depth() {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let (mut scene, _) = fixtures::scene(urls, 32, 32, OptimizationConfig::default());

    for (id, z) in [("near", 0.0), ("mid", -15.0), ("far", -30.0)] {
        let video = fixtures::pattern_video(&mut library, id, 5.0);
        let mut clip = VideoClip::new(id, id, 0.0, 5.0);
        clip.transform = Transform3D::from_position(Vec3::new(0.0, 0.0, z));
        scene.add_clip(&clip, &video).unwrap();
    }
    scene.render_frame();

    assert_eq!(scene.plane("near").unwrap().lod, LodTier::High);
    assert_eq!(scene.plane("mid").unwrap().lod, LodTier::Medium);
    assert_eq!(scene.plane("far").unwrap().lod, LodTier::Low);
}

#[test]
fn culling_disabled_keeps_everything_visible() {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let config = OptimizationConfig {
        enable_frustum_culling: false,
        ..OptimizationConfig::default()
    };
    let (mut scene, _) = fixtures::scene(urls, 32, 32, config);

    let video = fixtures::pattern_video(&mut library, "v", 5.0);
    let mut clip = VideoClip::new("lost", "v", 0.0, 5.0);
    clip.transform = Transform3D::from_position(Vec3::new(1.0e5, -1.0e5, 500.0));
    scene.add_clip(&clip, &video).unwrap();
    scene.add_clip(&VideoClip::new("centre", "v", 0.0, 5.0), &video).unwrap();
    scene.render_frame();

    assert!(scene.planes().values().all(|p| p.visible));
    assert_eq!(scene.optimizer().culling().stats().culling_rate, 0.0);
}

#[test]
fn culling_enabled_hides_far_off_plane() {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let (mut scene, _) = fixtures::scene(urls, 32, 32, OptimizationConfig::default());

    let video = fixtures::pattern_video(&mut library, "v", 5.0);
    let mut clip = VideoClip::new("lost", "v", 0.0, 5.0);
    clip.transform = Transform3D::from_position(Vec3::new(1.0e5, 0.0, 0.0));
    scene.add_clip(&clip, &video).unwrap();
    scene.render_frame();

    assert!(!scene.plane("lost").unwrap().visible);
}

#[test]
fn clip_is_active_on_half_open_window() {
    let clip = VideoClip::new("c", "v", 10.0, 5.0);
    assert!(!clip.is_active_at(9.999));
    assert!(clip.is_active_at(10.0));
    assert!(clip.is_active_at(14.999));
    assert!(!clip.is_active_at(15.0));

    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let (mut scene, _) = fixtures::scene(urls, 32, 32, OptimizationConfig::default());
    let video = fixtures::pattern_video(&mut library, "v", 20.0);
    scene.add_clip(&clip, &video).unwrap();

    for (time, active) in [(9.999, false), (10.0, true), (14.999, true), (15.0, false)] {
        scene.set_time(time, SyncMode::Passive).unwrap();
        assert_eq!(scene.plane("c").unwrap().active, active, "at {time}");
    }
}

#[test]
fn memory_warnings_are_debounced() {
    let probe = ManualHeapProbe::new();
    let mut monitor = MemoryMonitor::new(Box::new(probe.clone()));
    let levels = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&levels);
    monitor.on_warning(move |level, _| sink.lock().push(level));

    for usage in [60.0, 75.0, 82.0, 76.0] {
        probe.set_usage_percent(usage);
        monitor.check_now();
    }
    assert_eq!(
        *levels.lock(),
        vec![MemoryWarningLevel::Normal, MemoryWarningLevel::Warning]
    );
}

#[test]
fn memory_pressure_shrinks_scene_budgets() {
    let urls = ObjectUrlRegistry::new();
    let (mut scene, probe) = fixtures::scene(urls, 32, 32, OptimizationConfig::default());

    probe.set_usage_percent(75.0);
    scene.optimizer_mut().check_memory_now();
    let stats = scene.optimizer().stats();
    assert_eq!(stats.cache.capacity, 7);

    probe.set_usage_percent(90.0);
    let check = scene.optimizer_mut().check_memory_now();
    assert!(check.cleanup_requested);
    assert_eq!(scene.optimizer().stats().cache.capacity, 5);
}
