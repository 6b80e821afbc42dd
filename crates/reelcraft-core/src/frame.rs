//! RGBA8 frame buffers in CPU memory.
//!
//! Rows are tightly packed (stride = width * 4) so a buffer can be handed to
//! an encoder pipe or compared byte-for-byte without repacking.

use crate::error::{ReelcraftError, Result};
use std::sync::Arc;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// An RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// A transparent black frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// A frame filled with one color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut frame = Self::new(width, height);
        frame.fill(rgba);
        frame
    }

    /// Wrap existing RGBA8 bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(ReelcraftError::InvalidParameter(format!(
                "frame {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn pixels(&self) -> &[[u8; 4]] {
        bytemuck::cast_slice(&self.data)
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [[u8; 4]] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    /// Pixel at `(x, y)`; coordinates are clamped to the edge.
    #[inline]
    pub fn pixel_clamped(&self, x: i64, y: i64) -> [u8; 4] {
        if self.width == 0 || self.height == 0 {
            return [0; 4];
        }
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.pixels()[y * self.width as usize + x]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let w = self.width as usize;
        self.pixels_mut()[y as usize * w + x as usize] = rgba;
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels_mut() {
            *px = rgba;
        }
    }

    /// Reset every byte to zero.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Box-filtered copy at `scale` of the original size (minimum 1x1).
    pub fn downsample(&self, scale: f32) -> Self {
        if scale >= 1.0 || self.width == 0 || self.height == 0 {
            return self.clone();
        }
        let w = ((self.width as f32 * scale).round() as u32).max(1);
        let h = ((self.height as f32 * scale).round() as u32).max(1);
        let mut out = Self::new(w, h);
        let sx = self.width as f32 / w as f32;
        let sy = self.height as f32 / h as f32;
        let src = self.pixels();
        let src_w = self.width as usize;

        for y in 0..h {
            let y0 = (y as f32 * sy) as u32;
            let y1 = (((y + 1) as f32 * sy).ceil() as u32).clamp(y0 + 1, self.height);
            for x in 0..w {
                let x0 = (x as f32 * sx) as u32;
                let x1 = (((x + 1) as f32 * sx).ceil() as u32).clamp(x0 + 1, self.width);
                let mut acc = [0u32; 4];
                for yy in y0..y1 {
                    for xx in x0..x1 {
                        let p = src[yy as usize * src_w + xx as usize];
                        for c in 0..4 {
                            acc[c] += p[c] as u32;
                        }
                    }
                }
                let n = (x1 - x0) * (y1 - y0);
                out.set_pixel(
                    x,
                    y,
                    [
                        (acc[0] / n) as u8,
                        (acc[1] / n) as u8,
                        (acc[2] / n) as u8,
                        (acc[3] / n) as u8,
                    ],
                );
            }
        }
        out
    }

    /// Color bars, rotated by `phase` bars. Phase 0 starts with white.
    pub fn test_pattern(width: u32, height: u32, phase: u32) -> Self {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255],
            [255, 255, 0, 255],
            [0, 255, 255, 255],
            [0, 255, 0, 255],
            [255, 0, 255, 255],
            [255, 0, 0, 255],
            [0, 0, 255, 255],
            [0, 0, 0, 255],
        ];
        let mut frame = Self::new(width, height);
        let w = width.max(1);
        for y in 0..height {
            for x in 0..width {
                let bar = ((x * 8 / w + phase) % 8) as usize;
                frame.set_pixel(x, y, BARS[bar]);
            }
        }
        frame
    }
}

/// Arc-wrapped frame buffer for shared ownership.
pub type SharedFrameBuffer = Arc<FrameBuffer>;
