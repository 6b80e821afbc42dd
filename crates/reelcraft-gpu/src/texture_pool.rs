//! Texture pool for reusing render textures across clip swaps.
//!
//! Idle textures sit in a free list and are handed back out when a caller
//! asks for the same dimensions. Video textures take a separate path: they
//! are bound to one decoding source and are always allocated and disposed
//! directly.

use crate::allocator::TextureAllocator;
use crate::texture::{Texture, TextureId, TextureKind};
use reelcraft_core::{budget, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Counters exposed to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total_textures: usize,
    pub available_textures: usize,
    pub in_use_textures: usize,
    pub video_textures: usize,
    pub allocations: u64,
    pub reuses: u64,
    /// `reuses / (allocations + reuses) * 100`, 0 when nothing was acquired.
    pub reuse_rate: f64,
}

/// Pool of reusable textures.
pub struct TexturePool {
    allocator: Box<dyn TextureAllocator>,
    available: Vec<Texture>,
    in_use: HashSet<TextureId>,
    video_textures: HashSet<TextureId>,
    max_pool_size: usize,
    default_size: (u32, u32),
    allocations: u64,
    reuses: u64,
}

impl TexturePool {
    pub fn new(allocator: Box<dyn TextureAllocator>, max_pool_size: usize) -> Self {
        Self {
            allocator,
            available: Vec::new(),
            in_use: HashSet::new(),
            video_textures: HashSet::new(),
            max_pool_size,
            default_size: budget::DEFAULT_TEXTURE_SIZE,
            allocations: 0,
            reuses: 0,
        }
    }

    /// Dimensions used when `acquire` is called without a size.
    pub fn set_default_size(&mut self, width: u32, height: u32) {
        self.default_size = (width, height);
    }

    /// Hand out a texture of the requested (or default) size.
    ///
    /// An idle texture with matching dimensions is reused; otherwise a new
    /// cleared one is allocated.
    pub fn acquire(&mut self, size: Option<(u32, u32)>) -> Result<Texture> {
        let wanted = size.unwrap_or(self.default_size);

        if let Some(index) = self
            .available
            .iter()
            .position(|tex| tex.dimensions() == wanted)
        {
            let texture = self.available.swap_remove(index);
            self.in_use.insert(texture.id());
            self.reuses += 1;
            debug!(id = %texture.id(), width = wanted.0, height = wanted.1, "texture reused");
            return Ok(texture);
        }

        let texture = self
            .allocator
            .allocate(wanted.0, wanted.1, TextureKind::Pooled)?;
        self.in_use.insert(texture.id());
        self.allocations += 1;
        debug!(id = %texture.id(), width = wanted.0, height = wanted.1, "texture allocated");
        Ok(texture)
    }

    /// Return a texture obtained from [`acquire`](Self::acquire).
    ///
    /// A texture the pool did not hand out is returned unchanged as
    /// `Some(texture)` and nothing else happens.
    pub fn release(&mut self, mut texture: Texture) -> Option<Texture> {
        if !self.in_use.remove(&texture.id()) {
            warn!(id = %texture.id(), "release of texture not in use by the pool ignored");
            return Some(texture);
        }

        if self.available.len() < self.max_pool_size {
            texture.clear();
            self.available.push(texture);
        } else {
            self.allocator.dispose(texture);
        }
        None
    }

    /// Allocate a texture bound to one video source. Never pooled.
    pub fn acquire_video_texture(&mut self, width: u32, height: u32) -> Result<Texture> {
        let texture = self.allocator.allocate(width, height, TextureKind::Video)?;
        self.video_textures.insert(texture.id());
        Ok(texture)
    }

    /// Dispose a video texture. Non-video textures are handed back.
    pub fn release_video_texture(&mut self, texture: Texture) -> Option<Texture> {
        if texture.kind() != TextureKind::Video || !self.video_textures.remove(&texture.id()) {
            warn!(id = %texture.id(), "release of unknown video texture ignored");
            return Some(texture);
        }
        self.allocator.dispose(texture);
        None
    }

    /// Shrink or grow the idle list limit, disposing overflow.
    pub fn set_max_pool_size(&mut self, max_pool_size: usize) {
        self.max_pool_size = max_pool_size;
        self.trim();
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Dispose every idle texture. In-use textures are not touched.
    pub fn clear(&mut self) {
        let count = self.available.len();
        for texture in self.available.drain(..) {
            self.allocator.dispose(texture);
        }
        if count > 0 {
            debug!(count, "texture pool cleared");
        }
    }

    fn trim(&mut self) {
        while self.available.len() > self.max_pool_size {
            if let Some(texture) = self.available.pop() {
                self.allocator.dispose(texture);
            }
        }
    }

    pub fn is_in_use(&self, id: TextureId) -> bool {
        self.in_use.contains(&id)
    }

    pub fn stats(&self) -> PoolStats {
        let acquired = self.allocations + self.reuses;
        let reuse_rate = if acquired == 0 {
            0.0
        } else {
            self.reuses as f64 / acquired as f64 * 100.0
        };
        PoolStats {
            total_textures: self.available.len() + self.in_use.len(),
            available_textures: self.available.len(),
            in_use_textures: self.in_use.len(),
            video_textures: self.video_textures.len(),
            allocations: self.allocations,
            reuses: self.reuses,
            reuse_rate,
        }
    }

    /// Textures still alive in the allocator, pooled or not.
    pub fn live_textures(&self) -> usize {
        self.allocator.live_textures()
    }
}

impl Drop for TexturePool {
    fn drop(&mut self) {
        self.clear();
    }
}
