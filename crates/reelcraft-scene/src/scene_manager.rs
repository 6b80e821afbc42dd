//! The 3D scene: one textured plane per clip, a camera, and the render loop.
//!
//! Per frame the order is fixed: dirty video textures are refreshed from
//! their elements, the optimizer culls and assigns LOD tiers, then visible
//! planes are drawn into the viewport. Scene time only moves through
//! [`SceneManager::set_time`].

use crate::aspect::{self, BACKDROP_SCALE};
use crate::camera::PerspectiveCamera;
use crate::memory::{HeapProbe, MemoryCheck, ProcHeapProbe};
use crate::optimizer::{OptimizerStats, PerformanceOptimizer};
use crate::plane::{PlaneMap, RenderablePlane};
use glam::{Mat4, Vec3};
use parking_lot::Mutex;
use reelcraft_core::{
    FrameBuffer, OptimizationConfig, OptimizationConfigPatch, ReelcraftError, Result, Transform3D,
};
use reelcraft_gpu::{
    CpuAllocator, DrawItem, RenderStats, RenderTarget, SoftwareRenderer, Texture, TextureAllocator,
    TexturePool,
};
use reelcraft_media::{ObjectUrlRegistry, VideoResource};
use reelcraft_timeline::VideoClip;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub type SharedScene = Arc<Mutex<SceneManager>>;

const HIGHLIGHT_COLOR: [u8; 4] = [255, 196, 0, 255];
/// Backdrops sit this far behind their plane so they always draw first.
const BACKDROP_DEPTH: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneConfig {
    /// Canvas size in pixels; also the initial viewport size.
    pub width: u32,
    pub height: u32,
    pub background: [u8; 4],
    pub fov_y_degrees: f32,
    /// World units spanned vertically by the canvas.
    pub world_height: f32,
    pub optimization: OptimizationConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            background: [0, 0, 0, 255],
            fov_y_degrees: 50.0,
            world_height: 10.0,
            optimization: OptimizationConfig::default(),
        }
    }
}

impl SceneConfig {
    fn world_frame(&self) -> (f32, f32) {
        let aspect = self.width as f32 / self.height as f32;
        (self.world_height * aspect, self.world_height)
    }
}

/// How `set_time` treats video elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Elements are driven elsewhere; only scene state follows the time.
    Passive,
    /// Seek every active element to its exact local time.
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneStats {
    pub time: f64,
    pub planes: usize,
    pub active_planes: usize,
    pub visible_planes: usize,
    pub frames_rendered: u64,
    pub render: RenderStats,
    pub optimizer: OptimizerStats,
}

struct ClipBinding {
    clip: VideoClip,
    resource: VideoResource,
    video_aspect: f32,
    source_size: (u32, u32),
}

pub struct SceneManager {
    config: SceneConfig,
    camera: PerspectiveCamera,
    planes: PlaneMap,
    clips: BTreeMap<String, ClipBinding>,
    optimizer: PerformanceOptimizer,
    renderer: SoftwareRenderer,
    viewport: RenderTarget,
    time: f64,
    rendering: bool,
    frames_rendered: u64,
}

impl SceneManager {
    /// Scene with the process heap probe and CPU textures.
    pub fn new(config: SceneConfig, urls: ObjectUrlRegistry) -> Result<Self> {
        Self::with_backends(
            config,
            urls,
            Box::new(ProcHeapProbe::new()),
            Box::new(CpuAllocator::new()),
        )
    }

    pub fn with_backends(
        config: SceneConfig,
        urls: ObjectUrlRegistry,
        probe: Box<dyn HeapProbe>,
        allocator: Box<dyn TextureAllocator>,
    ) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "canvas size must be non-zero, got {}x{}",
                config.width, config.height
            )));
        }
        if config.world_height.is_nan() || config.world_height <= 0.0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "world height must be positive, got {}",
                config.world_height
            )));
        }

        let aspect = config.width as f32 / config.height as f32;
        let camera = PerspectiveCamera::framing(config.world_height, config.fov_y_degrees, aspect);
        let mut optimizer = PerformanceOptimizer::new(config.optimization, urls, probe, allocator);
        let pool = optimizer.texture_pool_mut();
        pool.set_default_size(config.width, config.height);
        let viewport = RenderTarget::from_texture(pool.acquire(None)?);

        info!(width = config.width, height = config.height, "scene created");
        Ok(Self {
            config,
            camera,
            planes: PlaneMap::new(),
            clips: BTreeMap::new(),
            optimizer,
            renderer: SoftwareRenderer::new(),
            viewport,
            time: 0.0,
            rendering: false,
            frames_rendered: 0,
        })
    }

    /// Place `clip` in the scene, replacing any plane with the same id.
    pub fn add_clip(&mut self, clip: &VideoClip, resource: &VideoResource) -> Result<()> {
        if self.planes.contains_key(&clip.id) {
            debug!(clip_id = %clip.id, "replacing existing plane");
            self.remove_clip(&clip.id);
        }

        let source_size = (resource.metadata.width.max(1), resource.metadata.height.max(1));
        let video_aspect = resource.metadata.aspect_ratio();
        let mut plane = RenderablePlane::new(&clip.id, &clip.video_id, 1.0, 1.0);
        plane.texture = Some(
            self.optimizer
                .texture_pool_mut()
                .acquire_video_texture(source_size.0, source_size.1)?,
        );
        self.planes.insert(clip.id.clone(), plane);
        self.clips.insert(
            clip.id.clone(),
            ClipBinding {
                clip: clip.clone(),
                resource: resource.clone(),
                video_aspect,
                source_size,
            },
        );
        self.optimizer.cache_video(resource.clone());

        if let Err(err) = self.sync_plane_layout(&clip.id) {
            self.remove_clip(&clip.id);
            return Err(err);
        }
        self.apply_clip_state(&clip.id);
        info!(clip_id = %clip.id, video_id = %clip.video_id, "clip added");
        Ok(())
    }

    /// Remove a clip's plane and free its textures.
    pub fn remove_clip(&mut self, id: &str) -> bool {
        self.clips.remove(id);
        let Some(plane) = self.planes.remove(id) else {
            return false;
        };
        self.release_plane(plane);
        self.optimizer.lod_mut().forget(id);
        debug!(clip_id = id, "clip removed");
        true
    }

    /// Remove every clip and rewind to 0.
    pub fn reset(&mut self) {
        let ids: Vec<String> = self.planes.keys().cloned().collect();
        for id in ids {
            self.remove_clip(&id);
        }
        self.time = 0.0;
        info!("scene reset");
    }

    /// Replace a clip's timing, transform and adaptation.
    pub fn update_clip(&mut self, clip: &VideoClip) -> Result<()> {
        let binding = self
            .clips
            .get_mut(&clip.id)
            .ok_or_else(|| ReelcraftError::NotFound(format!("clip {}", clip.id)))?;
        binding.clip = clip.clone();
        self.sync_plane_layout(&clip.id)?;
        self.apply_clip_state(&clip.id);
        Ok(())
    }

    pub fn update_transform(&mut self, id: &str, transform: Transform3D) -> bool {
        let (Some(binding), Some(plane)) = (self.clips.get_mut(id), self.planes.get_mut(id)) else {
            return false;
        };
        binding.clip.transform = transform;
        plane.transform = transform;
        true
    }

    /// Outline one plane, or none. Returns whether `id` was found.
    pub fn set_highlighted(&mut self, id: Option<&str>) -> bool {
        let mut found = false;
        for (plane_id, plane) in self.planes.iter_mut() {
            plane.highlighted = Some(plane_id.as_str()) == id;
            found |= plane.highlighted;
        }
        found
    }

    pub fn set_opacity(&mut self, id: &str, opacity: f32) -> bool {
        let (Some(binding), Some(plane)) = (self.clips.get_mut(id), self.planes.get_mut(id)) else {
            return false;
        };
        let opacity = opacity.clamp(0.0, 1.0);
        binding.clip.opacity = opacity;
        plane.opacity = opacity;
        true
    }

    /// Move the scene to `time` seconds.
    ///
    /// Every plane's activation and transition state follows. Active planes
    /// get their textures marked dirty; in [`SyncMode::Force`] their elements
    /// are also seeked to the exact local time. Seek failures do not stop
    /// the other planes and are reported together.
    pub fn set_time(&mut self, time: f64, mode: SyncMode) -> Result<()> {
        self.time = time.max(0.0);
        let ids: Vec<String> = self.clips.keys().cloned().collect();
        let mut failures = Vec::new();
        for id in &ids {
            let Some(local) = self.apply_clip_state(id) else {
                continue;
            };
            if mode == SyncMode::Force {
                if let Some(binding) = self.clips.get(id) {
                    if let Err(err) = binding.resource.element.lock().set_current_time(local) {
                        warn!(clip_id = %id, error = %err, "seek failed");
                        failures.push(format!("{id}: {err}"));
                    }
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReelcraftError::Render(failures.join("; ")))
        }
    }

    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn start_render_loop(&mut self) {
        if !self.rendering {
            self.rendering = true;
            debug!("render loop started");
        }
    }

    pub fn stop_render_loop(&mut self) {
        if self.rendering {
            self.rendering = false;
            debug!("render loop stopped");
        }
    }

    #[inline]
    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// One render loop iteration. Returns whether a frame was drawn.
    ///
    /// Runs whether or not playback is advancing, so edits show up while
    /// paused. Memory checks that are due run after the frame.
    pub fn tick(&mut self, _delta: f64) -> bool {
        if !self.rendering {
            return false;
        }
        self.render_frame();
        self.optimizer.poll_memory(Instant::now());
        true
    }

    /// Draw one frame into the viewport.
    pub fn render_frame(&mut self) {
        self.upload_dirty_textures();
        self.optimizer.optimize_frame(&mut self.planes, &self.camera);
        draw_planes(
            &mut self.renderer,
            &mut self.viewport,
            &self.camera,
            &self.planes,
            self.config.background,
        );
        self.frames_rendered += 1;
    }

    /// Draw into `target`, using its aspect ratio for the camera.
    ///
    /// The viewport camera aspect is restored afterwards.
    pub fn render_into(&mut self, target: &mut RenderTarget) {
        let (width, height) = target.size();
        let saved = self.camera.aspect();
        self.camera.set_aspect(width as f32 / height.max(1) as f32);

        self.upload_dirty_textures();
        self.optimizer.optimize_frame(&mut self.planes, &self.camera);
        draw_planes(
            &mut self.renderer,
            target,
            &self.camera,
            &self.planes,
            self.config.background,
        );

        self.camera.set_aspect(saved);
    }

    /// Resize the viewport; the camera follows its aspect.
    ///
    /// The old viewport texture goes back to the pool and one of the new
    /// size is taken from it.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.viewport.size() == (width, height) {
            return Ok(());
        }
        let viewport = self.acquire_render_target(width, height)?;
        let old = std::mem::replace(&mut self.viewport, viewport);
        self.release_render_target(old);
        self.camera.set_aspect(width as f32 / height as f32);
        debug!(width, height, "viewport resized");
        Ok(())
    }

    /// Offscreen target backed by a texture from the pool.
    pub fn acquire_render_target(&mut self, width: u32, height: u32) -> Result<RenderTarget> {
        if width == 0 || height == 0 {
            return Err(ReelcraftError::InvalidParameter(format!(
                "render target size must be non-zero, got {width}x{height}"
            )));
        }
        let texture = self
            .optimizer
            .texture_pool_mut()
            .acquire(Some((width, height)))?;
        Ok(RenderTarget::from_texture(texture))
    }

    /// Give a target from [`acquire_render_target`](Self::acquire_render_target)
    /// back to the pool. Targets that own their pixels are just dropped.
    pub fn release_render_target(&mut self, target: RenderTarget) {
        let Some(texture) = target.into_texture() else {
            return;
        };
        if let Some(texture) = self.optimizer.texture_pool_mut().release(texture) {
            warn!(id = %texture.id(), "render target texture was not from this pool, dropped");
        }
    }

    /// Pixels of the last viewport frame.
    pub fn viewport_pixels(&self) -> &FrameBuffer {
        self.viewport.color()
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            time: self.time,
            planes: self.planes.len(),
            active_planes: self.planes.values().filter(|p| p.active).count(),
            visible_planes: self.planes.values().filter(|p| p.is_renderable()).count(),
            frames_rendered: self.frames_rendered,
            render: self.renderer.stats(),
            optimizer: self.optimizer.stats(),
        }
    }

    pub fn planes(&self) -> &PlaneMap {
        &self.planes
    }

    pub fn plane(&self, id: &str) -> Option<&RenderablePlane> {
        self.planes.get(id)
    }

    pub fn clip(&self, id: &str) -> Option<&VideoClip> {
        self.clips.get(id).map(|b| &b.clip)
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut PerspectiveCamera {
        &mut self.camera
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &PerformanceOptimizer {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut PerformanceOptimizer {
        &mut self.optimizer
    }

    pub fn apply_config(&mut self, patch: &OptimizationConfigPatch) {
        self.optimizer.update_config(patch);
        self.config.optimization = self.optimizer.config();
    }

    pub fn poll_memory(&mut self, now: Instant) -> Option<MemoryCheck> {
        self.optimizer.poll_memory(now)
    }

    /// Resolve a clip's activation, transition and source time at the
    /// current scene time. Returns the local time when active.
    fn apply_clip_state(&mut self, id: &str) -> Option<f64> {
        let binding = self.clips.get_mut(id)?;
        let plane = self.planes.get_mut(id)?;
        let clip = &binding.clip;

        plane.transform = clip.transform;
        plane.opacity = clip.opacity;
        plane.active = clip.is_active_at(self.time);
        plane.modifier = clip.transition_modifier(self.time);
        if !plane.active {
            return None;
        }

        let local = clip.local_time(self.time);
        plane.video_time = local;
        for texture in [plane.texture.as_mut(), plane.backdrop.as_mut()].into_iter().flatten() {
            texture.mark_needs_update();
        }
        restore_source(&mut self.optimizer, binding, id);
        Some(local)
    }

    /// Size the plane for its clip's adaptation mode, adding or dropping
    /// the blur backdrop as needed.
    fn sync_plane_layout(&mut self, id: &str) -> Result<()> {
        let Some(binding) = self.clips.get(id) else {
            return Ok(());
        };
        let (frame_width, frame_height) = self.config.world_frame();
        let mode = binding.clip.aspect_ratio_adaptation;
        let layout = aspect::layout(mode, binding.video_aspect, frame_width, frame_height);
        let (source_width, source_height) = binding.source_size;

        let Some(plane) = self.planes.get_mut(id) else {
            return Ok(());
        };
        plane.aspect_mode = mode;
        plane.base_width = layout.width;
        plane.base_height = layout.height;

        match (layout.backdrop, plane.backdrop.is_some()) {
            (Some((width, height)), had_backdrop) => {
                plane.backdrop_width = width;
                plane.backdrop_height = height;
                if !had_backdrop {
                    let w = ((source_width as f32 * BACKDROP_SCALE).round() as u32).max(1);
                    let h = ((source_height as f32 * BACKDROP_SCALE).round() as u32).max(1);
                    let mut backdrop = self.optimizer.texture_pool_mut().acquire_video_texture(w, h)?;
                    backdrop.mark_needs_update();
                    plane.backdrop = Some(backdrop);
                    // Re-apply the plane's tier so the new backdrop picks it up.
                    self.optimizer.lod_mut().forget(id);
                }
            }
            (None, true) => {
                if let Some(backdrop) = plane.backdrop.take() {
                    release_texture(self.optimizer.texture_pool_mut(), backdrop);
                }
            }
            (None, false) => {}
        }
        Ok(())
    }

    /// Refresh every dirty texture of an active plane from its element.
    fn upload_dirty_textures(&mut self) {
        for (id, plane) in self.planes.iter_mut() {
            if !plane.active {
                continue;
            }
            let main_dirty = plane.texture.as_ref().is_some_and(Texture::needs_update);
            let backdrop_dirty = plane.backdrop.as_ref().is_some_and(Texture::needs_update);
            if !main_dirty && !backdrop_dirty {
                continue;
            }
            let Some(binding) = self.clips.get_mut(id) else {
                continue;
            };
            if !restore_source(&mut self.optimizer, binding, id) {
                continue;
            }
            let Some(frame) = binding.resource.element.lock().current_frame() else {
                debug!(clip_id = %id, "no frame available");
                continue;
            };
            if main_dirty {
                if let Some(texture) = plane.texture.as_mut() {
                    texture.upload(Arc::clone(&frame));
                }
            }
            if backdrop_dirty {
                if let Some(backdrop) = plane.backdrop.as_mut() {
                    backdrop.upload(Arc::new(aspect::blurred_backdrop(&frame)));
                }
            }
        }
    }

    fn release_plane(&mut self, mut plane: RenderablePlane) {
        let pool = self.optimizer.texture_pool_mut();
        for texture in [plane.texture.take(), plane.backdrop.take()].into_iter().flatten() {
            release_texture(pool, texture);
        }
    }
}

impl Drop for SceneManager {
    fn drop(&mut self) {
        let ids: Vec<String> = self.planes.keys().cloned().collect();
        for id in ids {
            self.remove_clip(&id);
        }
        let viewport = std::mem::replace(&mut self.viewport, RenderTarget::new(0, 0));
        self.release_render_target(viewport);
    }
}

impl std::fmt::Debug for SceneManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneManager")
            .field("config", &self.config)
            .field("time", &self.time)
            .field("planes", &self.planes.len())
            .field("rendering", &self.rendering)
            .finish_non_exhaustive()
    }
}

/// Keep the clip's video cached and decodable, reloading it after an
/// eviction. Returns whether the source is usable.
fn restore_source(optimizer: &mut PerformanceOptimizer, binding: &mut ClipBinding, clip_id: &str) -> bool {
    match optimizer.restore_video(&mut binding.resource) {
        Ok(()) => true,
        Err(err) => {
            warn!(clip_id, video_id = %binding.resource.id, error = %err, "video source unavailable");
            false
        }
    }
}

fn release_texture(pool: &mut TexturePool, texture: Texture) {
    if let Some(texture) = pool.release_video_texture(texture) {
        warn!(id = %texture.id(), "texture was not a pool video texture, dropped");
    }
}

fn draw_planes(
    renderer: &mut SoftwareRenderer,
    target: &mut RenderTarget,
    camera: &PerspectiveCamera,
    planes: &PlaneMap,
    background: [u8; 4],
) {
    let mut items = Vec::with_capacity(planes.len() * 2);
    for plane in planes.values().filter(|p| p.is_renderable()) {
        let model = plane.world_matrix();
        let opacity = plane.effective_opacity();
        let tint = plane.modifier.tint;

        if let Some(backdrop) = plane.backdrop.as_ref() {
            let behind = model * Mat4::from_translation(Vec3::new(0.0, 0.0, -BACKDROP_DEPTH));
            let mut item = DrawItem::new(behind, plane.backdrop_width, plane.backdrop_height, Some(backdrop));
            item.opacity = opacity;
            item.tint = tint;
            items.push(item);
        }

        let mut item = DrawItem::new(model, plane.base_width, plane.base_height, plane.texture.as_ref());
        item.opacity = opacity;
        item.tint = tint;
        if plane.highlighted {
            item.outline = Some(HIGHLIGHT_COLOR);
        }
        items.push(item);
    }
    renderer.render(target, camera.view_projection(), background, &items);
}
