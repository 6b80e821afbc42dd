//! Integration tests for the video cache and texture pool.

use crate::fixtures;
use parking_lot::Mutex;
use reelcraft_core::OptimizationConfig;
use reelcraft_gpu::{CpuAllocator, TexturePool};
use reelcraft_media::{ObjectUrlRegistry, VideoLibrary};
use reelcraft_scene::{LruCache, ManualHeapProbe, PerformanceOptimizer};
use std::sync::Arc;

#[test]
fn lru_evicts_first_inserted_key() {
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    let mut cache = LruCache::new(3).with_eviction_callback(move |key, _: u32| {
        sink.lock().push(key.to_owned());
    });
    cache.put("a", 1, None);
    cache.put("b", 2, None);
    cache.put("c", 3, None);
    cache.put("d", 4, None);
    assert_eq!(*evicted.lock(), vec!["a".to_string()]);
    assert!(cache.contains("b"));
}

#[test]
fn lru_get_protects_early_key() {
    let mut cache = LruCache::new(3);
    cache.put("a", 1, None);
    cache.put("b", 2, None);
    cache.put("c", 3, None);
    assert_eq!(cache.get("a"), Some(&1));
    cache.put("d", 4, None);
    assert!(cache.contains("a"));
    assert!(!cache.contains("b"));
}

#[test]
fn hit_rate_counts_every_get() {
    let mut cache: LruCache<u32> = LruCache::new(2);
    assert_eq!(cache.stats().hit_rate, 0.0);

    cache.put("a", 1, None);
    let _ = cache.get("a");
    let _ = cache.get("missing");
    let _ = cache.get("a");
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 3);
    assert!((stats.hit_rate - 200.0 / 3.0).abs() < 1e-9);
}

#[test]
fn texture_reused_for_matching_size_only() {
    let mut pool = TexturePool::new(Box::new(CpuAllocator::new()), 4);
    let first = pool.acquire(Some((64, 64))).unwrap();
    let first_id = first.id();
    assert!(pool.release(first).is_none());

    let again = pool.acquire(Some((64, 64))).unwrap();
    assert_eq!(again.id(), first_id);
    assert!(pool.release(again).is_none());

    let other = pool.acquire(Some((32, 32))).unwrap();
    assert_ne!(other.id(), first_id);
    let stats = pool.stats();
    assert_eq!(stats.reuses, 1);
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.available_textures, 1);
}

#[test]
fn cache_eviction_releases_video_and_revokes_url() {
    let urls = ObjectUrlRegistry::new();
    let mut library = VideoLibrary::new(urls.clone());
    let config = OptimizationConfig {
        max_cached_videos: 2,
        ..OptimizationConfig::default()
    };
    let mut optimizer = PerformanceOptimizer::new(
        config,
        urls.clone(),
        Box::new(ManualHeapProbe::new()),
        Box::new(CpuAllocator::new()),
    );

    let first = fixtures::pattern_video(&mut library, "v1", 5.0);
    let second = fixtures::pattern_video(&mut library, "v2", 5.0);
    let third = fixtures::pattern_video(&mut library, "v3", 5.0);
    optimizer.cache_video(first.clone());
    optimizer.cache_video(second);
    optimizer.cache_video(third);

    assert!(!optimizer.is_video_cached("v1"));
    assert!(!urls.is_live(&first.url));
    assert!(!first.element.lock().has_source());
    assert!(optimizer.is_video_cached("v3"));
}
