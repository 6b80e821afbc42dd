//! Reelcraft GPU - Texture resources and plane rendering
//!
//! Provides:
//! - Textures with per-texture filter and resolution settings
//! - A dimension-keyed texture pool with a separate video texture path
//! - A deterministic software rasterizer for textured planes
//! - An optional wgpu-backed allocator (feature `wgpu`)

pub mod allocator;
pub mod renderer;
pub mod texture;
pub mod texture_pool;
#[cfg(feature = "wgpu")]
pub mod wgpu_backend;

pub use allocator::{CpuAllocator, TextureAllocator};
pub use renderer::{DrawItem, RenderStats, RenderTarget, SoftwareRenderer};
pub use texture::{FilterMode, Texture, TextureId, TextureKind};
pub use texture_pool::{PoolStats, TexturePool};
#[cfg(feature = "wgpu")]
pub use wgpu_backend::{GpuContext, WgpuAllocator};
