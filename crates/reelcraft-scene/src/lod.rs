//! Distance-based level of detail.
//!
//! Tiers are recomputed every frame but texture settings are written only
//! when a plane's tier changes, since each write may rebuild the surface.

use crate::plane::PlaneMap;
use glam::Vec3;
use reelcraft_core::LodThresholds;
use reelcraft_gpu::FilterMode;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LodTier {
    #[default]
    High,
    Medium,
    Low,
}

/// Texture settings for a tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodSettings {
    pub resolution_scale: f32,
    pub filter: FilterMode,
}

impl LodTier {
    pub fn settings(self) -> LodSettings {
        match self {
            Self::High => LodSettings {
                resolution_scale: 1.0,
                filter: FilterMode::Trilinear,
            },
            Self::Medium => LodSettings {
                resolution_scale: 0.5,
                filter: FilterMode::Linear,
            },
            Self::Low => LodSettings {
                resolution_scale: 0.25,
                filter: FilterMode::Nearest,
            },
        }
    }
}

/// Tier for a camera distance. Boundaries belong to the better tier.
pub fn tier_for_distance(distance: f32, thresholds: &LodThresholds) -> LodTier {
    if distance <= thresholds.high_distance {
        LodTier::High
    } else if distance <= thresholds.medium_distance {
        LodTier::Medium
    } else {
        LodTier::Low
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LodStats {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug)]
pub struct LodSystem {
    thresholds: LodThresholds,
    enabled: bool,
    tiers: HashMap<String, LodTier>,
    reset_pending: bool,
    stats: LodStats,
}

impl LodSystem {
    pub fn new(thresholds: LodThresholds) -> Self {
        Self {
            thresholds,
            enabled: true,
            tiers: HashMap::new(),
            reset_pending: false,
            stats: LodStats::default(),
        }
    }

    /// Assign tiers by distance from `camera_position`.
    pub fn update_lod(&mut self, planes: &mut PlaneMap, camera_position: Vec3) {
        if !self.enabled {
            if self.reset_pending {
                for plane in planes.values_mut() {
                    apply(plane, LodTier::High);
                }
                self.reset_pending = false;
                debug!(planes = planes.len(), "LOD disabled, restored full quality");
            }
            self.stats = LodStats {
                high: planes.len(),
                ..LodStats::default()
            };
            return;
        }

        let mut stats = LodStats::default();
        for (id, plane) in planes.iter_mut() {
            let distance = camera_position.distance(plane.world_position());
            let tier = tier_for_distance(distance, &self.thresholds);
            match tier {
                LodTier::High => stats.high += 1,
                LodTier::Medium => stats.medium += 1,
                LodTier::Low => stats.low += 1,
            }
            if self.tiers.get(id.as_str()) != Some(&tier) {
                self.tiers.insert(id.clone(), tier);
                apply(plane, tier);
            }
        }
        self.stats = stats;
    }

    /// Turning LOD off drops cached tiers and restores full quality on the
    /// next update.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.tiers.clear();
        self.reset_pending = !enabled;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// New thresholds take effect on the next update for every plane.
    pub fn set_thresholds(&mut self, thresholds: LodThresholds) {
        self.thresholds = thresholds;
        self.tiers.clear();
    }

    pub fn thresholds(&self) -> LodThresholds {
        self.thresholds
    }

    /// Drop the cached tier of a removed plane.
    pub fn forget(&mut self, id: &str) {
        self.tiers.remove(id);
    }

    pub fn stats(&self) -> LodStats {
        self.stats
    }
}

impl Default for LodSystem {
    fn default() -> Self {
        Self::new(LodThresholds::default())
    }
}

fn apply(plane: &mut crate::plane::RenderablePlane, tier: LodTier) {
    plane.lod = tier;
    let settings = tier.settings();
    for texture in [plane.texture.as_mut(), plane.backdrop.as_mut()].into_iter().flatten() {
        texture.set_filter(settings.filter);
        texture.set_resolution_scale(settings.resolution_scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::RenderablePlane;
    use proptest::prelude::*;
    use reelcraft_gpu::{Texture, TextureId, TextureKind};

    fn plane_at(z: f32) -> RenderablePlane {
        let mut plane = RenderablePlane::new("p", "v", 1.0, 1.0);
        plane.transform.position = Vec3::new(0.0, 0.0, z);
        plane.texture = Some(Texture::new(TextureId(1), 4, 4, TextureKind::Video));
        plane
    }

    #[test]
    fn test_tier_boundaries() {
        let t = LodThresholds::default();
        assert_eq!(tier_for_distance(0.0, &t), LodTier::High);
        assert_eq!(tier_for_distance(20.0, &t), LodTier::High);
        assert_eq!(tier_for_distance(20.5, &t), LodTier::Medium);
        assert_eq!(tier_for_distance(40.0, &t), LodTier::Medium);
        assert_eq!(tier_for_distance(40.5, &t), LodTier::Low);
    }

    #[test]
    fn test_settings_applied_on_change() {
        let mut lod = LodSystem::default();
        let mut planes = PlaneMap::new();
        planes.insert("p".into(), plane_at(-30.0));
        lod.update_lod(&mut planes, Vec3::ZERO);

        let plane = &planes["p"];
        assert_eq!(plane.lod, LodTier::Medium);
        let texture = plane.texture.as_ref().unwrap();
        assert_eq!(texture.filter(), FilterMode::Linear);
        assert_eq!(texture.resolution_scale(), 0.5);
        assert_eq!(lod.stats(), LodStats { high: 0, medium: 1, low: 0 });
    }

    #[test]
    fn test_unchanged_tier_is_not_reapplied() {
        let mut lod = LodSystem::default();
        let mut planes = PlaneMap::new();
        planes.insert("p".into(), plane_at(-50.0));
        lod.update_lod(&mut planes, Vec3::ZERO);

        // A manual change survives because the tier stays Low.
        if let Some(texture) = planes.get_mut("p").and_then(|p| p.texture.as_mut()) {
            texture.set_filter(FilterMode::Trilinear);
        }
        lod.update_lod(&mut planes, Vec3::ZERO);
        let texture = planes["p"].texture.as_ref().unwrap();
        assert_eq!(texture.filter(), FilterMode::Trilinear);
    }

    #[test]
    fn test_disable_restores_full_quality() {
        let mut lod = LodSystem::default();
        let mut planes = PlaneMap::new();
        planes.insert("p".into(), plane_at(-100.0));
        lod.update_lod(&mut planes, Vec3::ZERO);
        assert_eq!(planes["p"].lod, LodTier::Low);

        lod.set_enabled(false);
        lod.update_lod(&mut planes, Vec3::ZERO);
        assert_eq!(planes["p"].lod, LodTier::High);
        let texture = planes["p"].texture.as_ref().unwrap();
        assert_eq!(texture.filter(), FilterMode::Trilinear);
        assert_eq!(texture.resolution_scale(), 1.0);

        lod.set_enabled(true);
        lod.update_lod(&mut planes, Vec3::ZERO);
        assert_eq!(planes["p"].lod, LodTier::Low);
    }

    proptest! {
        #[test]
        fn prop_closer_never_lowers_quality(a in 0.0f32..200.0, b in 0.0f32..200.0) {
            let t = LodThresholds::default();
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            // Derived Ord puts High first, so better quality compares lower.
            prop_assert!(tier_for_distance(near, &t) <= tier_for_distance(far, &t));
        }
    }
}
