use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::{
    camera::Camera,
    decal::DecalProjector,
    environment::Environment,
    highlight::HighlightUniform,
    mesh::Model,
    occlusion::{gpu::GpuOcclusionQueries, BatchResult, QueryBatch},
    shaders::{ShaderGenerator, ShaderKind},
};

mod gpu_resources;
mod pipeline;
mod types;

pub use gpu_resources::DEPTH_FORMAT;
pub(crate) use types::VertexShaderLocations;

use gpu_resources::{GpuDecals, GpuModel, GpuTexture};
use types::{CameraResources, MaterialBindGroupLayouts, PipelineCacheKey, PipelineLayouts, SceneResources};

/// Outcome of [`Renderer::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A frame was presented. `queries_recorded` is false when an occlusion batch
    /// was passed in but could not be recorded.
    Rendered { queries_recorded: bool },
    /// No frame this time (surface lost, outdated or timed out). Nothing was recorded.
    Skipped,
}

pub(crate) struct Renderer<'a> {
    // Core GPU resources
    pub surface: wgpu::Surface<'a>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: (u32, u32),

    // Grouped resources
    camera: CameraResources,
    scene: SceneResources,
    material_layouts: MaterialBindGroupLayouts,
    pipelines: PipelineLayouts,
    white: GpuTexture,
    depth: GpuTexture,

    // Other
    shader_generator: ShaderGenerator,
    pipeline_cache: HashMap<PipelineCacheKey, wgpu::RenderPipeline>,
    /// Cleared once the highlight shader fails to build.
    region_highlight: bool,
    decal_pipeline: Option<wgpu::RenderPipeline>,
    model: Option<GpuModel>,
    decals: GpuDecals,
    occlusion: GpuOcclusionQueries,
    clear_color: wgpu::Color,
}

impl<'a> Renderer<'a> {
    // Creating some of the wgpu types requires async code
    // The target parameter can be a Window or any type implementing the necessary traits
    pub async fn new<T>(target: T, width: u32, height: u32, clear_color: [f32; 4]) -> Result<Renderer<'a>>
    where
        T: Into<wgpu::SurfaceTarget<'a>>,
    {
        let size = (width.max(1), height.max(1));

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(target).context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No compatible GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
                experimental_features: Default::default(),
            })
            .await
            .context("Failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("Surface reports no formats")?;

        // Prefer Fifo (vsync) to avoid tearing/flickering
        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0,
            height: size.1,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);

        let camera = CameraResources::new(&device);
        let scene = SceneResources::new(&device);
        let material_layouts = MaterialBindGroupLayouts::new(&device);
        let pipelines = PipelineLayouts::new(
            &device,
            &camera.bind_group_layout,
            &material_layouts,
            &scene.bind_group_layout,
        );
        let white = gpu_resources::create_solid_color_texture(&device, &queue, [255; 4], "White Texture");
        let depth = gpu_resources::create_depth_texture(&device, &config, "depth_texture");

        let mut shader_generator = ShaderGenerator::new()?;
        let occlusion_shader = shader_generator.generate_shader(&device, ShaderKind::Occlusion)?;
        let occlusion = GpuOcclusionQueries::new(&device, &occlusion_shader, &camera.bind_group_layout);

        let [r, g, b, a] = clear_color.map(f64::from);
        let mut renderer = Self {
            surface,
            device,
            queue,
            config,
            size,
            camera,
            scene,
            material_layouts,
            pipelines,
            white,
            depth,
            shader_generator,
            pipeline_cache: HashMap::new(),
            region_highlight: true,
            decal_pipeline: None,
            model: None,
            decals: GpuDecals::default(),
            occlusion,
            clear_color: wgpu::Color { r, g, b, a },
        };

        // Decals are optional: the model still renders without them.
        match renderer.create_decal_pipeline() {
            Ok(pipeline) => renderer.decal_pipeline = Some(pipeline),
            Err(e) => log::error!("Decal shader unavailable, regions will not be drawn: {e:#}"),
        }

        Ok(renderer)
    }

    pub fn resize(&mut self, new_size: (u32, u32)) {
        let (width, height) = new_size;
        if width > 0 && height > 0 {
            self.size = (width, height);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
            self.depth = gpu_resources::create_depth_texture(&self.device, &self.config, "depth_texture");
        }
    }

    pub fn write_camera(&self, camera: &Camera) {
        self.queue
            .write_buffer(&self.camera.buffer, 0, bytemuck::bytes_of(&camera.to_uniform()));
    }

    pub fn write_lighting(&self, environment: &Environment) {
        self.scene.write_lighting(&self.queue, &environment.to_uniform());
    }

    pub fn write_highlight(&self, uniform: &HighlightUniform) {
        self.scene.write_highlight(&self.queue, uniform);
    }

    /// Replaces the GPU copy of the model.
    pub fn upload_model(&mut self, model: &Model) {
        // Compile both variants up front so the closure below only reads the cache.
        let plain = self.decorate_material(false);
        let textured = self.decorate_material(true);

        let gpu_model = gpu_resources::upload_model(
            &self.device,
            &self.queue,
            &self.material_layouts.material,
            &self.white,
            model,
            |has_texture| if has_texture { textured } else { plain },
        );
        log::info!(
            "Uploaded model: {} parts, {} materials",
            gpu_model.parts.len(),
            gpu_model.materials.len()
        );
        self.model = Some(gpu_model);
    }

    pub fn clear_model(&mut self) {
        self.model = None;
        self.decals.clear();
    }

    /// Re-uploads decal geometry when the projector changed since the last sync.
    pub fn sync_decals(&mut self, projector: &DecalProjector) {
        if self.decals.generation == Some(projector.generation()) {
            return;
        }
        self.decals.sync(
            &self.device,
            &self.queue,
            &self.material_layouts.decal,
            projector.decals(),
            projector.generation(),
        );
    }

    /// Queries the next occlusion batch may hold.
    pub fn occlusion_capacity(&self) -> usize {
        self.occlusion.available_capacity()
    }

    /// Draws the model and decals, records `batch` against the resulting depth
    /// buffer, submits and presents.
    pub fn render(&mut self, batch: Option<&QueryBatch>) -> Result<RenderStatus> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(RenderStatus::Skipped);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timed out acquiring the next frame");
                return Ok(RenderStatus::Skipped);
            }
            Err(e) => return Err(e).context("Failed to acquire the next frame"),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.render_main_pass(&view, &mut encoder);

        let queries_recorded = match batch {
            Some(batch) => self.occlusion.record(
                &self.queue,
                &mut encoder,
                &self.depth.view,
                &self.camera.bind_group,
                batch,
            ),
            None => true,
        };

        // submit will accept anything that implements IntoIter
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.occlusion.after_submit();

        Ok(RenderStatus::Rendered { queries_recorded })
    }

    fn render_main_pass(&self, view: &wgpu::TextureView, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Main Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        let Some(model) = &self.model else {
            return;
        };

        pass.set_bind_group(0, &self.camera.bind_group, &[]);
        pass.set_bind_group(2, &self.scene.bind_group, &[]);

        for part in &model.parts {
            let Some(material) = model.materials.get(part.material) else {
                continue;
            };
            let Some(pipeline) = self.pipeline_cache.get(&material.pipeline) else {
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, &material.bind_group, &[]);
            pass.set_vertex_buffer(0, part.vertex_buffer.slice(..));
            pass.set_index_buffer(part.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..part.index_count, 0, 0..1);
        }

        if let Some(decal_pipeline) = &self.decal_pipeline {
            if !self.decals.is_empty() {
                pass.set_pipeline(decal_pipeline);
                self.decals.draw(&mut pass);
            }
        }
    }

    /// Drives pending map callbacks without blocking.
    pub fn poll(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("Device poll failed: {e}");
        }
    }

    /// Occlusion batches whose read-back finished since the last call.
    pub fn collect_queries(&mut self) -> Vec<BatchResult> {
        self.occlusion.collect()
    }
}
