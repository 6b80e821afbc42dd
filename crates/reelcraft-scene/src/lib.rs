//! Reelcraft Scene - 3D scene graph and performance optimization
//!
//! This crate provides:
//! - Video planes, the perspective camera and aspect adaptation
//! - An LRU video cache with eviction teardown
//! - Memory monitoring with debounced warnings
//! - Frustum culling and distance-based LOD
//! - The `SceneManager` render loop

pub mod aspect;
pub mod camera;
pub mod frustum;
pub mod lod;
pub mod lru_cache;
pub mod memory;
pub mod optimizer;
pub mod plane;
pub mod scene_manager;

pub use aspect::PlaneLayout;
pub use camera::PerspectiveCamera;
pub use frustum::{CullingStats, FrustumCulling};
pub use lod::{tier_for_distance, LodSettings, LodStats, LodSystem, LodTier};
pub use lru_cache::{CacheEntry, CacheStats, LruCache};
pub use memory::{
    HeapProbe, HeapSample, ListenerId, ManualHeapProbe, MemoryCheck, MemoryMonitor, MemoryStats,
    MemoryWarningLevel, ProcHeapProbe,
};
pub use optimizer::{OptimizerStats, PerformanceOptimizer};
pub use plane::{PlaneMap, RenderablePlane};
pub use scene_manager::{SceneConfig, SceneManager, SceneStats, SharedScene, SyncMode};
