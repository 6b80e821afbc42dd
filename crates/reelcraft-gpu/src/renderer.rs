//! Software rasterizer for textured planes.
//!
//! Draws quads back to front with perspective-correct texture coordinates
//! and straight-alpha "over" blending. Rows are shaded in parallel; every
//! pixel depends only on its inputs, so output is identical across runs.

use crate::texture::Texture;
use glam::{Mat4, Vec2, Vec3, Vec4};
use rayon::prelude::*;
use reelcraft_core::FrameBuffer;
use serde::Serialize;

/// Offscreen color buffer.
///
/// Either owns its pixels or borrows the surface of a pooled texture, which
/// [`into_texture`](Self::into_texture) gives back for release to the pool.
#[derive(Debug)]
pub struct RenderTarget {
    color: FrameBuffer,
    backing: Option<Texture>,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            color: FrameBuffer::new(width, height),
            backing: None,
        }
    }

    /// Render into `texture`'s surface.
    pub fn from_texture(mut texture: Texture) -> Self {
        Self {
            color: texture.take_surface(),
            backing: Some(texture),
        }
    }

    /// The backing texture with the rendered pixels, if there is one.
    pub fn into_texture(self) -> Option<Texture> {
        let mut texture = self.backing?;
        if texture.dimensions() == (self.color.width, self.color.height) {
            texture.restore_surface(self.color);
        } else {
            texture.clear();
        }
        Some(texture)
    }

    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.backing.is_some()
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.color.width, self.color.height)
    }

    /// Reallocate when the size changes; contents are undefined afterwards.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.size() != (width, height) {
            self.color = FrameBuffer::new(width, height);
        }
    }

    #[inline]
    pub fn color(&self) -> &FrameBuffer {
        &self.color
    }

    /// Copy the pixels out.
    pub fn read_pixels(&self) -> FrameBuffer {
        self.color.clone()
    }
}

/// One plane to draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawItem<'a> {
    /// Local-to-world transform of a unit-centered quad in the XY plane.
    pub model: Mat4,
    pub width: f32,
    pub height: f32,
    pub texture: Option<&'a Texture>,
    /// Used when there is no texture content yet.
    pub fallback_color: [u8; 4],
    pub opacity: f32,
    /// Multiplies the sampled RGB, e.g. for dip-to-color transitions.
    pub tint: [f32; 3],
    pub outline: Option<[u8; 4]>,
}

impl<'a> DrawItem<'a> {
    pub fn new(model: Mat4, width: f32, height: f32, texture: Option<&'a Texture>) -> Self {
        Self {
            model,
            width,
            height,
            texture,
            fallback_color: [40, 40, 40, 255],
            opacity: 1.0,
            tint: [1.0; 3],
            outline: None,
        }
    }
}

/// Per-frame draw counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    pub draw_calls: usize,
    pub triangles: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    clip: Vec4,
    uv: Vec2,
}

#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    pos: Vec2,
    inv_w: f32,
    uv_over_w: Vec2,
}

const OUTLINE_WIDTH: f32 = 0.015;

/// CPU renderer writing into a [`RenderTarget`].
#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    stats: RenderStats,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Clear to `clear_color` and draw `items` sorted far to near.
    pub fn render(
        &mut self,
        target: &mut RenderTarget,
        view_projection: Mat4,
        clear_color: [u8; 4],
        items: &[DrawItem<'_>],
    ) {
        self.stats = RenderStats::default();
        target.color.fill(clear_color);

        let mut order: Vec<(usize, f32)> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let center = item.model.transform_point3(Vec3::ZERO);
                (i, (view_projection * center.extend(1.0)).w)
            })
            .collect();
        // Farthest first; stable so equal depths keep caller order.
        order.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (index, _) in order {
            let item = &items[index];
            if item.opacity <= 0.0 || item.width <= 0.0 || item.height <= 0.0 {
                self.stats.skipped += 1;
                continue;
            }
            self.draw_quad(target, view_projection, item);
        }
    }

    fn draw_quad(&mut self, target: &mut RenderTarget, view_projection: Mat4, item: &DrawItem<'_>) {
        let mvp = view_projection * item.model;
        let hw = item.width * 0.5;
        let hh = item.height * 0.5;
        let corners = [
            (Vec3::new(-hw, hh, 0.0), Vec2::new(0.0, 0.0)),
            (Vec3::new(hw, hh, 0.0), Vec2::new(1.0, 0.0)),
            (Vec3::new(hw, -hh, 0.0), Vec2::new(1.0, 1.0)),
            (Vec3::new(-hw, -hh, 0.0), Vec2::new(0.0, 1.0)),
        ];
        let quad: Vec<ClipVertex> = corners
            .iter()
            .map(|&(p, uv)| ClipVertex {
                clip: mvp * p.extend(1.0),
                uv,
            })
            .collect();

        let polygon = clip_near(&quad);
        if polygon.len() < 3 {
            self.stats.skipped += 1;
            return;
        }

        let (width, height) = target.size();
        let screen: Vec<ScreenVertex> = polygon
            .iter()
            .map(|v| {
                let inv_w = 1.0 / v.clip.w;
                let ndc = v.clip.truncate() * inv_w;
                ScreenVertex {
                    pos: Vec2::new(
                        (ndc.x * 0.5 + 0.5) * width as f32,
                        (0.5 - ndc.y * 0.5) * height as f32,
                    ),
                    inv_w,
                    uv_over_w: v.uv * inv_w,
                }
            })
            .collect();

        self.stats.draw_calls += 1;
        for i in 1..screen.len() - 1 {
            self.stats.triangles += 1;
            rasterize_triangle(target, [screen[0], screen[i], screen[i + 1]], item);
        }
    }
}

/// Sutherland-Hodgman against the near plane (`z >= 0` in clip space).
fn clip_near(polygon: &[ClipVertex]) -> Vec<ClipVertex> {
    const EPS: f32 = 1e-6;
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        let a_in = a.clip.z >= EPS;
        let b_in = b.clip.z >= EPS;
        if a_in {
            out.push(a);
        }
        if a_in != b_in {
            let t = (EPS - a.clip.z) / (b.clip.z - a.clip.z);
            out.push(ClipVertex {
                clip: a.clip.lerp(b.clip, t),
                uv: a.uv.lerp(b.uv, t),
            });
        }
    }
    out
}

#[inline]
fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top-left fill rule so the shared diagonal of a quad is shaded once.
#[inline]
fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    (d.y == 0.0 && d.x > 0.0) || d.y < 0.0
}

#[inline]
fn covers(w: f32, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

fn rasterize_triangle(target: &mut RenderTarget, mut tri: [ScreenVertex; 3], item: &DrawItem<'_>) {
    let mut area = edge(tri[0].pos, tri[1].pos, tri[2].pos);
    if area.abs() < f32::EPSILON {
        return;
    }
    if area < 0.0 {
        tri.swap(1, 2);
        area = -area;
    }
    let (a, b, c) = (tri[0], tri[1], tri[2]);
    let (width, height) = target.size();
    if width == 0 || height == 0 {
        return;
    }

    let min_x = a.pos.x.min(b.pos.x).min(c.pos.x).floor().max(0.0) as u32;
    let max_x = (a.pos.x.max(b.pos.x).max(c.pos.x).ceil().max(0.0) as u32).min(width);
    let min_y = a.pos.y.min(b.pos.y).min(c.pos.y).floor().max(0.0) as u32;
    let max_y = (a.pos.y.max(b.pos.y).max(c.pos.y).ceil().max(0.0) as u32).min(height);
    if min_x >= max_x || min_y >= max_y {
        return;
    }

    let tl_bc = is_top_left(b.pos, c.pos);
    let tl_ca = is_top_left(c.pos, a.pos);
    let tl_ab = is_top_left(a.pos, b.pos);
    let opacity = item.opacity.clamp(0.0, 1.0);
    let inv_area = 1.0 / area;
    let row_len = width as usize;

    target
        .color
        .pixels_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .skip(min_y as usize)
        .take((max_y - min_y) as usize)
        .for_each(|(y, row)| {
            let py = y as f32 + 0.5;
            for x in min_x..max_x {
                let p = Vec2::new(x as f32 + 0.5, py);
                let w0 = edge(b.pos, c.pos, p);
                let w1 = edge(c.pos, a.pos, p);
                let w2 = edge(a.pos, b.pos, p);
                if !(covers(w0, tl_bc) && covers(w1, tl_ca) && covers(w2, tl_ab)) {
                    continue;
                }
                let (l0, l1, l2) = (w0 * inv_area, w1 * inv_area, w2 * inv_area);
                let inv_w = l0 * a.inv_w + l1 * b.inv_w + l2 * c.inv_w;
                if inv_w <= 0.0 {
                    continue;
                }
                let uv = (a.uv_over_w * l0 + b.uv_over_w * l1 + c.uv_over_w * l2) / inv_w;
                let src = shade(item, uv);
                blend_over(&mut row[x as usize], src, opacity);
            }
        });
}

fn shade(item: &DrawItem<'_>, uv: Vec2) -> [f32; 4] {
    if let Some(outline) = item.outline {
        if uv.x < OUTLINE_WIDTH
            || uv.x > 1.0 - OUTLINE_WIDTH
            || uv.y < OUTLINE_WIDTH
            || uv.y > 1.0 - OUTLINE_WIDTH
        {
            return outline.map(|c| c as f32);
        }
    }
    let mut texel = match item.texture {
        Some(tex) if tex.has_content() => tex.sample(uv.x.clamp(0.0, 1.0), uv.y.clamp(0.0, 1.0)),
        _ => item.fallback_color.map(|c| c as f32),
    };
    for c in 0..3 {
        texel[c] *= item.tint[c];
    }
    texel
}

#[inline]
fn blend_over(dst: &mut [u8; 4], src: [f32; 4], opacity: f32) {
    let sa = (src[3] / 255.0) * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    for c in 0..3 {
        let v = src[c] * sa + dst[c] as f32 * (1.0 - sa);
        dst[c] = (v + 0.5).clamp(0.0, 255.0) as u8;
    }
    let out_a = sa + da * (1.0 - sa);
    dst[3] = (out_a * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
}
