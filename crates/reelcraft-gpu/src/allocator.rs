//! Texture allocation backends.

use crate::texture::{Texture, TextureId, TextureKind};
use reelcraft_core::{ReelcraftError, Result};
use tracing::trace;

/// Creates and destroys texture resources.
///
/// Allocation is the expensive step the pool exists to avoid, so
/// implementations are free to talk to a GPU driver here.
pub trait TextureAllocator: Send {
    fn allocate(&mut self, width: u32, height: u32, kind: TextureKind) -> Result<Texture>;

    fn dispose(&mut self, texture: Texture);

    /// Textures allocated and not yet disposed.
    fn live_textures(&self) -> usize;
}

/// Allocator for CPU-backed textures.
#[derive(Debug, Default)]
pub struct CpuAllocator {
    next_id: u64,
    live: usize,
    max_dimension: u32,
}

impl CpuAllocator {
    /// Largest edge accepted by default (matches common GPU limits).
    pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: 0,
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            ..Self::new()
        }
    }

    pub(crate) fn next_id(&mut self) -> TextureId {
        let id = TextureId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }
}

impl TextureAllocator for CpuAllocator {
    fn allocate(&mut self, width: u32, height: u32, kind: TextureKind) -> Result<Texture> {
        let max = if self.max_dimension == 0 {
            Self::DEFAULT_MAX_DIMENSION
        } else {
            self.max_dimension
        };
        if width == 0 || height == 0 || width > max || height > max {
            return Err(ReelcraftError::Gpu(format!(
                "cannot allocate {width}x{height} texture (limit {max})"
            )));
        }
        let id = self.next_id();
        self.live += 1;
        trace!(%id, width, height, ?kind, "texture allocated");
        Ok(Texture::new(id, width, height, kind))
    }

    fn dispose(&mut self, texture: Texture) {
        self.live = self.live.saturating_sub(1);
        trace!(id = %texture.id(), "texture disposed");
    }

    fn live_textures(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut alloc = CpuAllocator::new();
        let a = alloc.allocate(4, 4, TextureKind::Pooled).unwrap();
        let b = alloc.allocate(4, 4, TextureKind::Pooled).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(alloc.live_textures(), 2);
        alloc.dispose(a);
        assert_eq!(alloc.live_textures(), 1);
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        let mut alloc = CpuAllocator::with_max_dimension(64);
        assert!(alloc.allocate(0, 4, TextureKind::Pooled).is_err());
        assert!(alloc.allocate(65, 4, TextureKind::Video).is_err());
        assert_eq!(alloc.live_textures(), 0);
    }
}
