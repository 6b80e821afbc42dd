//! View-frustum culling for video planes.

use crate::camera::PerspectiveCamera;
use crate::plane::{PlaneMap, RenderablePlane};
use reelcraft_core::Frustum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CullingStats {
    pub total: usize,
    pub visible: usize,
    pub culled: usize,
    /// `culled / total * 100`.
    pub culling_rate: f64,
}

/// Tests plane bounds against the camera frustum.
///
/// Disabled culling reports everything visible rather than skipping the
/// pass, so turning the optimization off never hides content.
#[derive(Debug)]
pub struct FrustumCulling {
    frustum: Frustum,
    enabled: bool,
    visible_ids: Vec<String>,
    stats: CullingStats,
}

impl FrustumCulling {
    pub fn new() -> Self {
        Self {
            frustum: Frustum::default(),
            enabled: true,
            visible_ids: Vec::new(),
            stats: CullingStats::default(),
        }
    }

    /// Recompute the planes from the camera; call once per frame.
    pub fn update_frustum(&mut self, camera: &PerspectiveCamera) {
        self.frustum = Frustum::from_view_projection(&camera.view_projection());
    }

    /// Set each plane's `visible` flag and return the visible ids.
    pub fn cull_planes(&mut self, planes: &mut PlaneMap) -> &[String] {
        self.visible_ids.clear();
        for (id, plane) in planes.iter_mut() {
            plane.visible = !self.enabled || self.frustum.intersects_aabb(&plane.world_aabb());
            if plane.visible {
                self.visible_ids.push(id.clone());
            }
        }

        let total = planes.len();
        let visible = self.visible_ids.len();
        let culled = total - visible;
        self.stats = CullingStats {
            total,
            visible,
            culled,
            culling_rate: if total == 0 {
                0.0
            } else {
                culled as f64 / total as f64 * 100.0
            },
        };
        &self.visible_ids
    }

    /// Single-plane query against the last computed frustum.
    pub fn is_visible(&self, plane: &RenderablePlane) -> bool {
        !self.enabled || self.frustum.intersects_aabb(&plane.world_aabb())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> CullingStats {
        self.stats
    }
}

impl Default for FrustumCulling {
    fn default() -> Self {
        Self::new()
    }
}
