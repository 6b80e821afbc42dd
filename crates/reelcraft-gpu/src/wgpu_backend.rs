//! GPU-mirrored textures via wgpu.

use crate::allocator::{CpuAllocator, TextureAllocator};
use crate::texture::{Texture, TextureId, TextureKind};
use reelcraft_core::{ReelcraftError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Device and queue shared by the allocator.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Fails when no adapter is available; this is an initialization error.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| ReelcraftError::Gpu("No suitable GPU adapter found".to_string()))?;

        info!("Using GPU adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Reelcraft Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: CpuAllocator::DEFAULT_MAX_DIMENSION,
                        ..wgpu::Limits::default()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| ReelcraftError::Gpu(format!("Failed to create device: {}", e)))?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }
}

/// Allocator that backs every texture with a `wgpu::Texture`.
pub struct WgpuAllocator {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    cpu: CpuAllocator,
    gpu_textures: HashMap<TextureId, wgpu::Texture>,
}

impl WgpuAllocator {
    pub fn new(context: &GpuContext) -> Self {
        let max = context.device.limits().max_texture_dimension_2d;
        Self {
            device: Arc::clone(&context.device),
            queue: Arc::clone(&context.queue),
            cpu: CpuAllocator::with_max_dimension(max),
            gpu_textures: HashMap::new(),
        }
    }

    /// Copy the texture's current surface to its GPU mirror.
    pub fn upload(&self, texture: &Texture) -> Result<()> {
        let gpu = self
            .gpu_textures
            .get(&texture.id())
            .ok_or_else(|| ReelcraftError::NotFound(format!("gpu texture {}", texture.id())))?;
        let surface = texture.surface();
        let width = surface.width.min(gpu.width());
        let height = surface.height.min(gpu.height());
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: gpu,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            surface.as_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(surface.width * 4),
                rows_per_image: Some(surface.height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    pub fn gpu_texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.gpu_textures.get(&id)
    }
}

impl TextureAllocator for WgpuAllocator {
    fn allocate(&mut self, width: u32, height: u32, kind: TextureKind) -> Result<Texture> {
        let texture = self.cpu.allocate(width, height, kind)?;
        let gpu = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Reelcraft Plane Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        debug!(id = %texture.id(), width, height, "gpu texture created");
        self.gpu_textures.insert(texture.id(), gpu);
        Ok(texture)
    }

    fn dispose(&mut self, texture: Texture) {
        if let Some(gpu) = self.gpu_textures.remove(&texture.id()) {
            gpu.destroy();
        }
        self.cpu.dispose(texture);
    }

    fn live_textures(&self) -> usize {
        self.cpu.live_textures()
    }
}
