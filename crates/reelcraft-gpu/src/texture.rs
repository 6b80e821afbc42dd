//! Texture resources backed by a CPU surface.
//!
//! A `Texture` keeps the last full-resolution source frame it was given so
//! that a quality change can rebuild the surface without waiting for the
//! decoder to produce a new frame.

use reelcraft_core::{FrameBuffer, SharedFrameBuffer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// Sampling filter, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    Nearest,
    Linear,
    /// Bilinear over a full-resolution surface.
    #[default]
    Trilinear,
}

/// Where a texture came from, which decides how it is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Generic render texture that can be returned to the pool.
    Pooled,
    /// Bound to one decoding source; never repurposed.
    Video,
}

/// A sampled image with its own filter and resolution settings.
pub struct Texture {
    id: TextureId,
    kind: TextureKind,
    width: u32,
    height: u32,
    surface: FrameBuffer,
    source: Option<SharedFrameBuffer>,
    filter: FilterMode,
    resolution_scale: f32,
    needs_update: bool,
    version: u64,
}

impl Texture {
    /// A cleared texture with a `width`x`height` surface.
    pub fn new(id: TextureId, width: u32, height: u32, kind: TextureKind) -> Self {
        Self {
            id,
            kind,
            width,
            height,
            surface: FrameBuffer::new(width, height),
            source: None,
            filter: FilterMode::default(),
            resolution_scale: 1.0,
            needs_update: false,
            version: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Allocated dimensions; the pool matches on these.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn surface(&self) -> &FrameBuffer {
        &self.surface
    }

    #[inline]
    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn set_filter(&mut self, filter: FilterMode) {
        self.filter = filter;
    }

    #[inline]
    pub fn resolution_scale(&self) -> f32 {
        self.resolution_scale
    }

    /// Change the surface resolution relative to the source frame.
    pub fn set_resolution_scale(&mut self, scale: f32) {
        let scale = scale.clamp(0.01, 1.0);
        if (scale - self.resolution_scale).abs() < f32::EPSILON {
            return;
        }
        self.resolution_scale = scale;
        if let Some(source) = &self.source {
            self.surface = source.downsample(scale);
            self.version += 1;
        }
    }

    /// Ask for a fresh frame on the next render.
    #[inline]
    pub fn mark_needs_update(&mut self) {
        self.needs_update = true;
    }

    #[inline]
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Bumped on every surface change.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the contents with `frame`, applying the resolution scale.
    pub fn upload(&mut self, frame: SharedFrameBuffer) {
        self.surface = if self.resolution_scale < 1.0 {
            frame.downsample(self.resolution_scale)
        } else {
            FrameBuffer::clone(&frame)
        };
        self.source = Some(frame);
        self.needs_update = false;
        self.version += 1;
    }

    /// Wipe the surface and forget the source frame.
    pub fn clear(&mut self) {
        if self.surface.width == self.width && self.surface.height == self.height {
            self.surface.fill([0, 0, 0, 0]);
        } else {
            self.surface = FrameBuffer::new(self.width, self.height);
        }
        self.source = None;
        self.needs_update = false;
        self.resolution_scale = 1.0;
        self.filter = FilterMode::default();
        self.version += 1;
    }

    /// Lend the surface out, leaving an empty one until it is restored.
    pub(crate) fn take_surface(&mut self) -> FrameBuffer {
        self.version += 1;
        std::mem::replace(&mut self.surface, FrameBuffer::new(0, 0))
    }

    pub(crate) fn restore_surface(&mut self, surface: FrameBuffer) {
        self.surface = surface;
        self.version += 1;
    }

    pub fn has_content(&self) -> bool {
        self.source.is_some()
    }

    /// Approximate bytes held (surface plus retained source).
    pub fn memory_size(&self) -> usize {
        self.surface.memory_size() + self.source.as_ref().map_or(0, |s| s.memory_size())
    }

    /// Sample at normalized `(u, v)`, `v = 0` being the top row.
    ///
    /// Returns straight-alpha RGBA in `0.0..=255.0`.
    pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let w = self.surface.width;
        let h = self.surface.height;
        if w == 0 || h == 0 {
            return [0.0; 4];
        }
        match self.filter {
            FilterMode::Nearest => {
                let x = (u * w as f32).floor() as i64;
                let y = (v * h as f32).floor() as i64;
                let p = self.surface.pixel_clamped(x, y);
                [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
            }
            FilterMode::Linear | FilterMode::Trilinear => {
                let fx = u * w as f32 - 0.5;
                let fy = v * h as f32 - 0.5;
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let p00 = self.surface.pixel_clamped(x0, y0);
                let p10 = self.surface.pixel_clamped(x0 + 1, y0);
                let p01 = self.surface.pixel_clamped(x0, y0 + 1);
                let p11 = self.surface.pixel_clamped(x0 + 1, y0 + 1);
                let mut out = [0.0f32; 4];
                for (c, slot) in out.iter_mut().enumerate() {
                    let top = p00[c] as f32 * (1.0 - tx) + p10[c] as f32 * tx;
                    let bottom = p01[c] as f32 * (1.0 - tx) + p11[c] as f32 * tx;
                    *slot = top * (1.0 - ty) + bottom * ty;
                }
                out
            }
        }
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("size", &(self.width, self.height))
            .field("filter", &self.filter)
            .field("resolution_scale", &self.resolution_scale)
            .field("version", &self.version)
            .finish()
    }
}
