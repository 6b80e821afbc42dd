//! Reelcraft Core - Foundation types for the 3D video compositor
//!
//! This crate provides the fundamental types used throughout Reelcraft:
//! - Error type and result alias
//! - Time representation (RationalTime, FrameRate)
//! - 3D geometry (Transform3D, Aabb, Frustum)
//! - RGBA frame buffers
//! - Easing curves
//! - Optimization configuration

pub mod config;
pub mod easing;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod time;

pub use config::{LodThresholds, MemoryThresholds, OptimizationConfig, OptimizationConfigPatch};
pub use easing::{CubicBezier, Easing};
pub use error::{ReelcraftError, Result};
pub use frame::{FrameBuffer, SharedFrameBuffer};
pub use geometry::{Aabb, Frustum, FrustumPlane, Transform3D};
pub use time::{FrameRate, RationalTime};

/// Default budgets and thresholds shared by the scene and playback layers.
pub mod budget {
    use std::time::Duration;

    /// Videos kept decoded in the LRU cache.
    pub const MAX_CACHED_VIDEOS: usize = 10;

    /// Idle textures kept in the pool.
    pub const MAX_TEXTURE_POOL_SIZE: usize = 20;

    /// Texture size handed out when a caller does not ask for one.
    pub const DEFAULT_TEXTURE_SIZE: (u32, u32) = (1920, 1080);

    /// Memory usage that triggers a warning.
    pub const MEMORY_WARNING_PERCENT: f64 = 70.0;

    /// Memory usage that triggers emergency cleanup.
    pub const MEMORY_CRITICAL_PERCENT: f64 = 85.0;

    /// How often the memory monitor samples the heap.
    pub const MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(5);

    /// Planes closer than this render at full quality.
    pub const LOD_HIGH_DISTANCE: f32 = 20.0;

    /// Planes farther than this render at the lowest quality.
    pub const LOD_MEDIUM_DISTANCE: f32 = 40.0;

    /// Drift between a video element and the timeline before it is re-seeked.
    pub const SYNC_TOLERANCE_SECS: f64 = 0.1;

    /// Playback errors retained for diagnostics.
    pub const MAX_ERROR_LOG_ENTRIES: usize = 100;
}
