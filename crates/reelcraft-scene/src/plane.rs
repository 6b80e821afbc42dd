//! Video planes placed in the scene.

use crate::lod::LodTier;
use glam::{Mat4, Quat, Vec3};
use reelcraft_core::{Aabb, Transform3D};
use reelcraft_gpu::Texture;
use reelcraft_timeline::{AspectRatioMode, PlaneModifier};
use std::collections::BTreeMap;

/// Planes keyed by clip id. Ordered so every pass visits them the same way.
pub type PlaneMap = BTreeMap<String, RenderablePlane>;

/// A rectangle in the XY plane showing one clip's current frame.
#[derive(Debug)]
pub struct RenderablePlane {
    pub id: String,
    pub video_id: String,
    /// World units before `transform.scale`.
    pub base_width: f32,
    pub base_height: f32,
    pub transform: Transform3D,
    pub opacity: f32,
    /// Inside the camera frustum (or culling disabled).
    pub visible: bool,
    /// The clip covers the current scene time.
    pub active: bool,
    pub highlighted: bool,
    pub lod: LodTier,
    /// Source seconds currently shown.
    pub video_time: f64,
    pub aspect_mode: AspectRatioMode,
    pub modifier: PlaneModifier,
    pub texture: Option<Texture>,
    /// Blurred fill layer for `AspectRatioMode::BlurBackground`.
    pub backdrop: Option<Texture>,
    pub backdrop_width: f32,
    pub backdrop_height: f32,
}

impl RenderablePlane {
    pub fn new(id: impl Into<String>, video_id: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            id: id.into(),
            video_id: video_id.into(),
            base_width: width,
            base_height: height,
            transform: Transform3D::IDENTITY,
            opacity: 1.0,
            visible: true,
            active: false,
            highlighted: false,
            lod: LodTier::High,
            video_time: 0.0,
            aspect_mode: AspectRatioMode::Fit,
            modifier: PlaneModifier::IDENTITY,
            texture: None,
            backdrop: None,
            backdrop_width: width,
            backdrop_height: height,
        }
    }

    /// Model matrix including the active transition modifier.
    pub fn world_matrix(&self) -> Mat4 {
        let m = self.modifier;
        let base = self.transform.matrix();
        if m.is_identity() {
            return base;
        }
        Mat4::from_translation(m.offset)
            * base
            * Mat4::from_scale_rotation_translation(
                Vec3::new(m.scale, m.scale, 1.0),
                Quat::from_rotation_z(m.rotation_z),
                Vec3::ZERO,
            )
    }

    /// World-space center.
    #[inline]
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix().transform_point3(Vec3::ZERO)
    }

    /// World-space bounds of the plane, backdrop included.
    pub fn world_aabb(&self) -> Aabb {
        let w = self.base_width.max(self.backdrop_width_if_any()) * 0.5;
        let h = self.base_height.max(self.backdrop_height_if_any()) * 0.5;
        let m = self.world_matrix();
        Aabb::from_points(&[
            m.transform_point3(Vec3::new(-w, -h, 0.0)),
            m.transform_point3(Vec3::new(w, -h, 0.0)),
            m.transform_point3(Vec3::new(w, h, 0.0)),
            m.transform_point3(Vec3::new(-w, h, 0.0)),
        ])
    }

    #[inline]
    pub fn effective_opacity(&self) -> f32 {
        (self.opacity * self.modifier.opacity).clamp(0.0, 1.0)
    }

    /// Should be drawn this frame.
    #[inline]
    pub fn is_renderable(&self) -> bool {
        self.active && self.visible && self.effective_opacity() > 0.0
    }

    fn backdrop_width_if_any(&self) -> f32 {
        if self.backdrop.is_some() {
            self.backdrop_width
        } else {
            0.0
        }
    }

    fn backdrop_height_if_any(&self) -> f32 {
        if self.backdrop.is_some() {
            self.backdrop_height
        } else {
            0.0
        }
    }
}
