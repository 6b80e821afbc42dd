//! Per-frame optimization and memory-pressure handling.
//!
//! `PerformanceOptimizer` owns the video cache, the texture pool, the memory
//! monitor and the culling and LOD passes. The scene calls
//! [`PerformanceOptimizer::optimize_frame`] once per render and
//! [`PerformanceOptimizer::poll_memory`] between frames.

use crate::camera::PerspectiveCamera;
use crate::frustum::{CullingStats, FrustumCulling};
use crate::lod::{LodStats, LodSystem};
use crate::lru_cache::{CacheStats, LruCache};
use crate::memory::{HeapProbe, MemoryCheck, MemoryMonitor, MemoryStats, MemoryWarningLevel};
use crate::plane::PlaneMap;
use reelcraft_core::{OptimizationConfig, OptimizationConfigPatch, Result};
use reelcraft_gpu::{PoolStats, TextureAllocator, TexturePool};
use reelcraft_media::{ObjectUrlRegistry, VideoResource};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cache and pool floors after a warning-level shrink.
const WARNING_CACHE_FLOOR: usize = 5;
const WARNING_POOL_FLOOR: usize = 10;
/// Cache and pool floors after a critical-level shrink.
const CRITICAL_CACHE_FLOOR: usize = 3;
const CRITICAL_POOL_FLOOR: usize = 5;

/// Aggregate for UI polling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerStats {
    pub enabled: bool,
    pub frames_optimized: u64,
    pub culling: CullingStats,
    pub lod: LodStats,
    pub cache: CacheStats,
    pub texture_pool: PoolStats,
    pub memory: Option<MemoryStats>,
    pub memory_level: Option<MemoryWarningLevel>,
}

pub struct PerformanceOptimizer {
    config: OptimizationConfig,
    enabled: bool,
    culling: FrustumCulling,
    lod: LodSystem,
    video_cache: LruCache<VideoResource>,
    urls: ObjectUrlRegistry,
    texture_pool: TexturePool,
    memory: MemoryMonitor,
    last_memory: Option<MemoryCheck>,
    frames_optimized: u64,
}

impl PerformanceOptimizer {
    /// Evicted videos have their source released and their object URL
    /// revoked through `urls`.
    pub fn new(
        config: OptimizationConfig,
        urls: ObjectUrlRegistry,
        probe: Box<dyn HeapProbe>,
        allocator: Box<dyn TextureAllocator>,
    ) -> Self {
        let revoker = urls.clone();
        let video_cache = LruCache::new(config.max_cached_videos).with_eviction_callback(
            move |video_id: &str, resource: VideoResource| {
                resource.release();
                revoker.revoke(&resource.url);
                debug!(video_id, "video evicted from cache");
            },
        );
        let pool_size = if config.enable_texture_pooling {
            config.max_texture_pool_size
        } else {
            0
        };

        let mut optimizer = Self {
            config,
            enabled: true,
            culling: FrustumCulling::new(),
            lod: LodSystem::default(),
            video_cache,
            urls,
            texture_pool: TexturePool::new(allocator, pool_size),
            memory: MemoryMonitor::new(probe),
            last_memory: None,
            frames_optimized: 0,
        };
        optimizer.culling.set_enabled(config.enable_frustum_culling);
        optimizer.lod.set_enabled(config.enable_lod);
        if config.enable_memory_monitoring {
            optimizer.memory.start_monitoring();
        }
        optimizer
    }

    /// Cull and assign LOD tiers. Call once per frame before drawing.
    pub fn optimize_frame(&mut self, planes: &mut PlaneMap, camera: &PerspectiveCamera) {
        if !self.enabled {
            return;
        }
        self.culling.update_frustum(camera);
        self.culling.cull_planes(planes);
        self.lod.update_lod(planes, camera.position);
        self.frames_optimized += 1;
    }

    /// Run a memory check if one is due and react to it.
    pub fn poll_memory(&mut self, now: Instant) -> Option<MemoryCheck> {
        let check = self.memory.poll(now)?;
        self.react(check);
        Some(check)
    }

    /// Run a memory check immediately and react to it.
    pub fn check_memory_now(&mut self) -> MemoryCheck {
        let check = self.memory.check_now();
        self.react(check);
        check
    }

    fn react(&mut self, check: MemoryCheck) {
        self.last_memory = Some(check);
        if check.level_changed {
            match check.level {
                Some(MemoryWarningLevel::Warning) => self.shrink_for_warning(),
                Some(MemoryWarningLevel::Critical) => self.shrink_for_critical(),
                _ => {}
            }
        }
        if check.cleanup_requested {
            self.emergency_cleanup();
        }
    }

    fn shrink_for_warning(&mut self) {
        let cache = shrink(self.video_cache.capacity(), 0.7, WARNING_CACHE_FLOOR);
        let pool = shrink(self.texture_pool.max_pool_size(), 0.7, WARNING_POOL_FLOOR);
        warn!(cache, pool, "memory warning, shrinking cache and texture pool");
        self.video_cache.set_capacity(cache);
        self.texture_pool.set_max_pool_size(pool);
    }

    fn shrink_for_critical(&mut self) {
        let cache = ((self.config.max_cached_videos as f64 * 0.5) as usize)
            .max(CRITICAL_CACHE_FLOOR)
            .min(self.video_cache.capacity());
        let pool = ((self.config.max_texture_pool_size as f64 * 0.5) as usize)
            .max(CRITICAL_POOL_FLOOR)
            .min(self.texture_pool.max_pool_size());
        warn!(cache, pool, "memory critical, shrinking cache and texture pool");
        self.video_cache.set_capacity(cache);
        self.texture_pool.set_max_pool_size(pool);
    }

    fn emergency_cleanup(&mut self) {
        let evicted = self.video_cache.evict_lru();
        self.texture_pool.clear();
        warn!(evicted = ?evicted, "emergency memory cleanup");
    }

    /// Keep `resource` resident. Ignored while caching is disabled.
    pub fn cache_video(&mut self, resource: VideoResource) {
        if !self.config.enable_caching {
            return;
        }
        let id = resource.id.clone();
        let size = resource.metadata.width as usize * resource.metadata.height as usize * 4;
        self.video_cache.put(id, resource, Some(size));
    }

    /// Look up a cached video, marking it recently used.
    pub fn cached_video(&mut self, video_id: &str) -> Option<&VideoResource> {
        self.video_cache.get(video_id)
    }

    /// Make sure `resource` can be decoded, marking it recently used.
    ///
    /// A video evicted earlier gets its source reopened under a fresh object
    /// URL and goes back into the cache, which may evict another one.
    pub fn restore_video(&mut self, resource: &mut VideoResource) -> Result<()> {
        if self.video_cache.get(&resource.id).is_some() {
            return Ok(());
        }
        {
            let mut element = resource.element.lock();
            if !element.has_source() {
                element.reload_source()?;
                info!(video_id = %resource.id, "video source reloaded");
            }
        }
        if !self.urls.is_live(&resource.url) {
            resource.url = self.urls.create(&resource.file);
        }
        self.cache_video(resource.clone());
        Ok(())
    }

    pub fn is_video_cached(&self, video_id: &str) -> bool {
        self.video_cache.contains(video_id)
    }

    /// Drop a video from the cache, tearing it down. Returns whether it was cached.
    pub fn evict_video(&mut self, video_id: &str) -> bool {
        self.video_cache.remove(video_id)
    }

    pub fn texture_pool_mut(&mut self) -> &mut TexturePool {
        &mut self.texture_pool
    }

    pub fn texture_pool(&self) -> &TexturePool {
        &self.texture_pool
    }

    pub fn memory_monitor_mut(&mut self) -> &mut MemoryMonitor {
        &mut self.memory
    }

    pub fn culling(&self) -> &FrustumCulling {
        &self.culling
    }

    pub fn lod_mut(&mut self) -> &mut LodSystem {
        &mut self.lod
    }

    /// Apply a partial config. Capacity changes evict immediately.
    pub fn update_config(&mut self, patch: &OptimizationConfigPatch) {
        let config = self.config.merged(patch);
        self.culling.set_enabled(config.enable_frustum_culling);
        self.lod.set_enabled(config.enable_lod);

        if config.max_cached_videos != self.config.max_cached_videos {
            self.video_cache.set_capacity(config.max_cached_videos);
        }
        let pool_size = if config.enable_texture_pooling {
            config.max_texture_pool_size
        } else {
            0
        };
        if config.enable_texture_pooling != self.config.enable_texture_pooling
            || config.max_texture_pool_size != self.config.max_texture_pool_size
        {
            self.texture_pool.set_max_pool_size(pool_size);
        }

        if config.enable_memory_monitoring {
            self.memory.start_monitoring();
        } else {
            self.memory.stop_monitoring();
        }

        info!(?config, "optimization config updated");
        self.config = config;
    }

    pub fn config(&self) -> OptimizationConfig {
        self.config
    }

    /// Master switch for the per-frame pass.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            enabled: self.enabled,
            frames_optimized: self.frames_optimized,
            culling: self.culling.stats(),
            lod: self.lod.stats(),
            cache: self.video_cache.stats(),
            texture_pool: self.texture_pool.stats(),
            memory: self.last_memory.and_then(|c| c.stats),
            memory_level: self.last_memory.and_then(|c| c.level),
        }
    }
}

impl std::fmt::Debug for PerformanceOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceOptimizer")
            .field("config", &self.config)
            .field("enabled", &self.enabled)
            .field("video_cache", &self.video_cache)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

/// `floor(current * factor)`, raised to `floor` but never above `current`.
fn shrink(current: usize, factor: f64, floor: usize) -> usize {
    ((current as f64 * factor) as usize).max(floor).min(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ManualHeapProbe;
    use reelcraft_core::FrameRate;
    use reelcraft_gpu::CpuAllocator;
    use reelcraft_media::{share_element, PatternVideo, VideoLibrary, VideoMetadata};

    fn optimizer(config: OptimizationConfig) -> (PerformanceOptimizer, ManualHeapProbe, VideoLibrary) {
        let urls = ObjectUrlRegistry::new();
        let probe = ManualHeapProbe::new();
        let optimizer = PerformanceOptimizer::new(
            config,
            urls.clone(),
            Box::new(probe.clone()),
            Box::new(CpuAllocator::new()),
        );
        (optimizer, probe, VideoLibrary::new(urls))
    }

    fn import(library: &mut VideoLibrary, id: &str) -> VideoResource {
        let metadata = VideoMetadata {
            duration: 5.0,
            width: 8,
            height: 8,
            fps: FrameRate::FPS_30,
        };
        library.insert(id, format!("/media/{id}.mp4"), metadata, share_element(PatternVideo::new(metadata)))
    }

    #[test]
    fn test_eviction_releases_source_and_url() {
        let config = OptimizationConfig {
            max_cached_videos: 1,
            ..OptimizationConfig::default()
        };
        let (mut opt, _probe, mut library) = optimizer(config);
        let a = import(&mut library, "a");
        let b = import(&mut library, "b");
        opt.cache_video(a.clone());
        opt.cache_video(b.clone());

        assert!(!library.urls().is_live(&a.url));
        assert!(!a.element.lock().has_source());
        assert!(library.urls().is_live(&b.url));
        assert!(b.element.lock().has_source());
    }

    #[test]
    fn test_restore_reopens_evicted_video() {
        let config = OptimizationConfig {
            max_cached_videos: 1,
            ..OptimizationConfig::default()
        };
        let (mut opt, _probe, mut library) = optimizer(config);
        let mut a = import(&mut library, "a");
        let b = import(&mut library, "b");
        opt.cache_video(a.clone());
        opt.cache_video(b.clone());
        let old_url = a.url.clone();

        opt.restore_video(&mut a).unwrap();
        assert!(a.element.lock().has_source());
        assert_ne!(a.url, old_url);
        assert!(library.urls().is_live(&a.url));
        assert!(opt.is_video_cached("a"));
        // Restoring took the only slot.
        assert!(!b.element.lock().has_source());

        // Already resident: nothing changes.
        let url = a.url.clone();
        opt.restore_video(&mut a).unwrap();
        assert_eq!(a.url, url);
    }

    #[test]
    fn test_warning_then_critical_shrinks() {
        let (mut opt, probe, _library) = optimizer(OptimizationConfig::default());

        probe.set_usage_percent(75.0);
        opt.check_memory_now();
        assert_eq!(opt.video_cache.capacity(), 7);
        assert_eq!(opt.texture_pool.max_pool_size(), 14);

        // Same level again: debounced, no further shrink.
        opt.check_memory_now();
        assert_eq!(opt.video_cache.capacity(), 7);

        probe.set_usage_percent(90.0);
        opt.check_memory_now();
        assert_eq!(opt.video_cache.capacity(), 5);
        assert_eq!(opt.texture_pool.max_pool_size(), 10);
    }

    #[test]
    fn test_warning_floors() {
        let config = OptimizationConfig {
            max_cached_videos: 6,
            max_texture_pool_size: 12,
            ..OptimizationConfig::default()
        };
        let (mut opt, probe, _library) = optimizer(config);
        probe.set_usage_percent(72.0);
        opt.check_memory_now();
        assert_eq!(opt.video_cache.capacity(), 5);
        assert_eq!(opt.texture_pool.max_pool_size(), 10);
    }

    #[test]
    fn test_critical_cleanup_evicts_each_check() {
        let (mut opt, probe, mut library) = optimizer(OptimizationConfig::default());
        for id in ["a", "b", "c"] {
            let resource = import(&mut library, id);
            opt.cache_video(resource);
        }
        let texture = opt.texture_pool_mut().acquire(Some((4, 4))).unwrap();
        opt.texture_pool_mut().release(texture);
        assert_eq!(opt.texture_pool().stats().available_textures, 1);

        probe.set_usage_percent(95.0);
        opt.check_memory_now();
        assert!(!opt.is_video_cached("a"));
        assert_eq!(opt.texture_pool().stats().available_textures, 0);
        opt.check_memory_now();
        assert!(!opt.is_video_cached("b"));
        assert!(opt.is_video_cached("c"));
    }

    #[test]
    fn test_disabled_optimizer_skips_frame_pass() {
        let (mut opt, _probe, _library) = optimizer(OptimizationConfig::default());
        opt.set_enabled(false);
        let mut planes = PlaneMap::new();
        opt.optimize_frame(&mut planes, &PerspectiveCamera::default());
        assert_eq!(opt.stats().frames_optimized, 0);
    }

    #[test]
    fn test_update_config_cascades() {
        let (mut opt, _probe, mut library) = optimizer(OptimizationConfig::default());
        for id in ["a", "b", "c"] {
            let resource = import(&mut library, id);
            opt.cache_video(resource);
        }
        opt.update_config(&OptimizationConfigPatch {
            max_cached_videos: Some(1),
            enable_texture_pooling: Some(false),
            enable_frustum_culling: Some(false),
            ..OptimizationConfigPatch::default()
        });
        assert_eq!(opt.stats().cache.size, 1);
        assert!(opt.is_video_cached("c"));
        assert_eq!(opt.texture_pool().max_pool_size(), 0);
        assert!(!opt.culling().is_enabled());
        assert!(!opt.config().enable_frustum_culling);
    }

    #[test]
    fn test_stats_serialize_for_ui() {
        let (opt, _probe, _library) = optimizer(OptimizationConfig::default());
        let json = serde_json::to_value(opt.stats()).unwrap();
        assert!(json.get("texturePool").is_some());
        assert!(json.get("framesOptimized").is_some());
    }
}
