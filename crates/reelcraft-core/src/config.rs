//! Runtime-tunable optimization settings.
//!
//! All fields are plain booleans and integers so the config can be persisted
//! verbatim as JSON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::budget;
use crate::error::{ReelcraftError, Result};

/// Toggles and capacities for the optimization subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationConfig {
    #[serde(rename = "enableLOD")]
    pub enable_lod: bool,
    pub enable_frustum_culling: bool,
    pub enable_caching: bool,
    pub enable_texture_pooling: bool,
    pub enable_memory_monitoring: bool,
    pub max_cached_videos: usize,
    pub max_texture_pool_size: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enable_lod: true,
            enable_frustum_culling: true,
            enable_caching: true,
            enable_texture_pooling: true,
            enable_memory_monitoring: true,
            max_cached_videos: budget::MAX_CACHED_VIDEOS,
            max_texture_pool_size: budget::MAX_TEXTURE_POOL_SIZE,
        }
    }
}

impl OptimizationConfig {
    /// `<config dir>/reelcraft/optimization.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("reelcraft").join("optimization.json"))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "loaded optimization config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "saved optimization config");
        Ok(())
    }

    /// Apply the fields present in `patch`, returning the merged config.
    pub fn merged(mut self, patch: &OptimizationConfigPatch) -> Self {
        if let Some(v) = patch.enable_lod {
            self.enable_lod = v;
        }
        if let Some(v) = patch.enable_frustum_culling {
            self.enable_frustum_culling = v;
        }
        if let Some(v) = patch.enable_caching {
            self.enable_caching = v;
        }
        if let Some(v) = patch.enable_texture_pooling {
            self.enable_texture_pooling = v;
        }
        if let Some(v) = patch.enable_memory_monitoring {
            self.enable_memory_monitoring = v;
        }
        if let Some(v) = patch.max_cached_videos {
            self.max_cached_videos = v;
        }
        if let Some(v) = patch.max_texture_pool_size {
            self.max_texture_pool_size = v;
        }
        self
    }
}

/// Partial update for [`OptimizationConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationConfigPatch {
    #[serde(rename = "enableLOD", skip_serializing_if = "Option::is_none")]
    pub enable_lod: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_frustum_culling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_caching: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_texture_pooling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_memory_monitoring: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cached_videos: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_texture_pool_size: Option<usize>,
}

/// Usage percentages at which memory pressure escalates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl MemoryThresholds {
    pub fn new(warning: f64, critical: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&warning) || !(0.0..=100.0).contains(&critical) {
            return Err(ReelcraftError::Config(format!(
                "memory thresholds must be percentages, got {warning}/{critical}"
            )));
        }
        if warning > critical {
            return Err(ReelcraftError::Config(format!(
                "warning threshold {warning} exceeds critical threshold {critical}"
            )));
        }
        Ok(Self { warning, critical })
    }
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            warning: budget::MEMORY_WARNING_PERCENT,
            critical: budget::MEMORY_CRITICAL_PERCENT,
        }
    }
}

/// Camera distances separating the LOD tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LodThresholds {
    pub high_distance: f32,
    pub medium_distance: f32,
}

impl LodThresholds {
    pub fn new(high_distance: f32, medium_distance: f32) -> Result<Self> {
        if !(high_distance >= 0.0 && medium_distance >= high_distance) {
            return Err(ReelcraftError::Config(format!(
                "LOD thresholds must satisfy 0 <= high <= medium, got {high_distance}/{medium_distance}"
            )));
        }
        Ok(Self {
            high_distance,
            medium_distance,
        })
    }
}

impl Default for LodThresholds {
    fn default() -> Self {
        Self {
            high_distance: budget::LOD_HIGH_DISTANCE,
            medium_distance: budget::LOD_MEDIUM_DISTANCE,
        }
    }
}
