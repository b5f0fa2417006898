use std::collections::HashMap;
use std::sync::Arc;

use image::imageops::FilterType;

use super::cpu_render_context::CpuRenderContext;
use crate::rendering::domain::render_context::RenderContext;
use crate::rendering::domain::scene::{OverlayMesh, OverlayTexture, PerspectiveCamera, Scene};
use crate::shared::surface::RenderSurface;

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Packed uniforms matching the WGSL layout (80 bytes).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadUniforms {
    mvp: [[f32; 4]; 4],
    opacity: f32,
    _pad: [f32; 3],
}

/// Texture and bind group uploaded for one overlay mesh.
struct MeshResources {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// Offscreen render target plus its read-back buffer.
struct Target {
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

/// wgpu renderer drawing the overlay quad offscreen and reading it back.
///
/// Overlay images larger than the device's 2D texture limit are downscaled on
/// upload. Surfaces beyond the limit are drawn by the software renderer.
pub struct GpuRenderContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniforms: wgpu::Buffer,
    target: Target,
    meshes: HashMap<u64, MeshResources>,
    max_texture_dim: u32,
    oversize: CpuRenderContext,
}

impl GpuRenderContext {
    /// Returns `None` if no suitable adapter is available.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("overlay-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .ok()?;

        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let max_texture_dim = device.limits().max_texture_dimension_2d;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("overlay-quad-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/overlay_quad.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("overlay-bind-group-layout"),
            entries: &[
                // uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // overlay texture
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("overlay-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("overlay-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    // Straight alpha over a cleared target: write as-is.
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("overlay-sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("overlay-uniforms"),
            size: std::mem::size_of::<QuadUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let target = create_target(
            &device,
            width.min(max_texture_dim),
            height.min(max_texture_dim),
        );

        Some(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            uniforms,
            target,
            meshes: HashMap::new(),
            max_texture_dim,
            oversize: CpuRenderContext::new(),
        })
    }

    /// Whether a `width` x `height` target fits the device's texture limit.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    fn ensure_mesh(&mut self, mesh: &OverlayMesh) {
        if self.meshes.contains_key(&mesh.id()) {
            return;
        }
        let scaled = fit_texture(mesh.texture(), self.max_texture_dim);
        if scaled.is_some() {
            log::warn!(
                "Overlay {}x{} exceeds GPU texture limit {}, downscaling",
                mesh.texture().width(),
                mesh.texture().height(),
                self.max_texture_dim
            );
        }
        let image: &OverlayTexture = match &scaled {
            Some(texture) => texture,
            None => mesh.texture().as_ref(),
        };
        let size = wgpu::Extent3d {
            width: image.width().max(1),
            height: image.height().max(1),
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("overlay-texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if image.width() > 0 && image.height() > 0 {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.rgba(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(image.width() * 4),
                    rows_per_image: Some(image.height()),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("overlay-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        log::debug!("Uploaded overlay texture for mesh {}", mesh.id());
        self.meshes.insert(
            mesh.id(),
            MeshResources {
                _texture: texture,
                bind_group,
            },
        );
    }

    /// Copy the target into `surface`, dropping row padding.
    fn read_back(&self, surface: &mut RenderSurface) -> Result<(), Box<dyn std::error::Error>> {
        let target = &self.target;
        let row_bytes = target.width as usize * 4;
        if surface.pixels().len() != row_bytes * target.height as usize {
            return Err("surface size does not match render target".into());
        }

        let slice = target.readback.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        self.device.poll(wgpu::Maintain::Wait);

        {
            let mapped = slice.get_mapped_range();
            for (y, row) in surface.pixels_mut().chunks_exact_mut(row_bytes).enumerate() {
                let start = y * target.padded_bytes_per_row as usize;
                row.copy_from_slice(&mapped[start..start + row_bytes]);
            }
        }
        target.readback.unmap();
        Ok(())
    }
}

impl RenderContext for GpuRenderContext {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if !self.fits(width, height) {
            return;
        }
        if self.target.width != width || self.target.height != height {
            self.target = create_target(&self.device, width, height);
        }
    }

    fn clear(&mut self, surface: &mut RenderSurface) {
        surface.clear();
    }

    fn draw(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
        surface: &mut RenderSurface,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let Some(mesh) = scene.mesh() else {
            surface.clear();
            return Ok(());
        };
        if surface.width() == 0 || surface.height() == 0 {
            return Ok(());
        }
        if !self.fits(surface.width(), surface.height()) {
            return self.oversize.draw(scene, camera, surface);
        }
        self.resize(surface.width(), surface.height());
        self.ensure_mesh(mesh);

        let mvp = camera.view_projection() * mesh.world_matrix();
        let uniforms = QuadUniforms {
            mvp: mvp.as_mat4().to_cols_array_2d(),
            opacity: mesh.opacity.clamp(0.0, 1.0),
            _pad: [0.0; 3],
        };
        self.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = &self
            .meshes
            .get(&mesh.id())
            .ok_or("overlay mesh resources missing")?
            .bind_group;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("overlay-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("overlay-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.target.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.target.padded_bytes_per_row),
                    rows_per_image: Some(self.target.height),
                },
            },
            wgpu::Extent3d {
                width: self.target.width,
                height: self.target.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        self.read_back(surface)
    }

    fn release(&mut self, mesh_id: u64) {
        if self.meshes.remove(&mesh_id).is_some() {
            log::debug!("Released GPU resources for mesh {mesh_id}");
        }
    }

    fn dispose(&mut self) {
        self.meshes.clear();
    }
}

/// Downscaled copy of `texture` whose sides fit `max_dim`, keeping the aspect
/// ratio. `None` when it already fits.
fn fit_texture(texture: &OverlayTexture, max_dim: u32) -> Option<OverlayTexture> {
    let (w, h) = (texture.width(), texture.height());
    if w <= max_dim && h <= max_dim {
        return None;
    }
    let ratio = max_dim as f64 / w.max(h) as f64;
    let nw = ((w as f64 * ratio).round() as u32).clamp(1, max_dim);
    let nh = ((h as f64 * ratio).round() as u32).clamp(1, max_dim);

    let source = image::RgbaImage::from_raw(w, h, texture.rgba().to_vec())?;
    let resized = image::imageops::resize(&source, nw, nh, FilterType::Triangle);
    Some(OverlayTexture::new(nw, nh, resized.into_raw()))
}

fn create_target(device: &wgpu::Device, width: u32, height: u32) -> Target {
    let width = width.max(1);
    let height = height.max(1);
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("overlay-target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let padded_bytes_per_row = padded_row_bytes(width);
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("overlay-readback"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    Target {
        width,
        height,
        texture,
        view,
        readback,
        padded_bytes_per_row,
    }
}

/// RGBA row size rounded up to the copy alignment (256 bytes).
fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::domain::ar_transform::ArTransform;
    use crate::rendering::domain::scene::OverlayTexture;

    #[test]
    fn test_padded_row_bytes() {
        assert_eq!(padded_row_bytes(1), 256);
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
    }

    #[test]
    fn test_fit_texture_keeps_small_overlay() {
        let texture = OverlayTexture::new(4, 2, vec![255; 4 * 2 * 4]);
        assert!(fit_texture(&texture, 2048).is_none());
    }

    #[test]
    fn test_fit_texture_downscales_wide_overlay() {
        let texture = OverlayTexture::new(3000, 1000, vec![255; 3000 * 1000 * 4]);

        let scaled = fit_texture(&texture, 2048).unwrap();

        assert_eq!((scaled.width(), scaled.height()), (2048, 683));
        assert_eq!(scaled.rgba().len(), 2048 * 683 * 4);
    }

    #[test]
    fn test_oversized_surface_draws_in_software() {
        let mut ctx = match GpuRenderContext::new(8, 8) {
            Some(c) => c,
            None => return,
        };
        let side = ctx.max_texture_dim + 1;
        assert!(!ctx.fits(side, 1));

        let mut surface = RenderSurface::new(side, 1);
        ctx.draw(&scene(1.0), &PerspectiveCamera::new(side as f64), &mut surface)
            .unwrap();

        assert!(ctx.meshes.is_empty());
        assert_eq!(ctx.target.width, 8);
    }

    #[test]
    fn test_uniform_layout_size() {
        assert_eq!(std::mem::size_of::<QuadUniforms>(), 80);
    }

    fn scene(opacity: f32) -> Scene {
        let mut rgba = Vec::new();
        for _ in 0..4 {
            rgba.extend_from_slice(&[255, 0, 0, 255]);
        }
        let mut mesh = OverlayMesh::from_texture(Arc::new(OverlayTexture::new(2, 2, rgba)));
        mesh.transform = ArTransform::default();
        mesh.opacity = opacity;
        let mut scene = Scene::default();
        scene.install(mesh);
        scene
    }

    #[test]
    fn test_draws_centered_quad() {
        let mut ctx = match GpuRenderContext::new(64, 64) {
            Some(c) => c,
            None => return,
        };
        let mut surface = RenderSurface::new(64, 64);

        ctx.draw(&scene(1.0), &PerspectiveCamera::new(1.0), &mut surface)
            .unwrap();

        assert_eq!(surface.pixel(32, 32), [255, 0, 0, 255]);
        assert_eq!(surface.pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_empty_scene_clears_surface() {
        let mut ctx = match GpuRenderContext::new(8, 8) {
            Some(c) => c,
            None => return,
        };
        let mut surface = RenderSurface::new(8, 8);
        surface.pixels_mut().fill(200);

        ctx.draw(&Scene::default(), &PerspectiveCamera::new(1.0), &mut surface)
            .unwrap();

        assert!(surface.is_transparent());
    }

    #[test]
    fn test_release_drops_cached_mesh() {
        let mut ctx = match GpuRenderContext::new(16, 16) {
            Some(c) => c,
            None => return,
        };
        let scene = scene(1.0);
        let id = scene.mesh().unwrap().id();
        let mut surface = RenderSurface::new(16, 16);

        ctx.draw(&scene, &PerspectiveCamera::new(1.0), &mut surface)
            .unwrap();
        assert!(ctx.meshes.contains_key(&id));

        ctx.release(id);
        assert!(!ctx.meshes.contains_key(&id));
    }
}
