use crate::mesh::Vertex;
use crate::shaders::ShaderKind;

use super::gpu_resources::DEPTH_FORMAT;
use super::types::PipelineCacheKey;
use super::Renderer;

impl<'a> Renderer<'a> {
    /// Compiles the material pipeline for `key` unless it is cached.
    ///
    /// Shader compilation and pipeline validation errors are caught with an
    /// error scope and returned instead of reaching the device error handler.
    pub(super) fn ensure_pipeline(&mut self, key: PipelineCacheKey) -> anyhow::Result<()> {
        if self.pipeline_cache.contains_key(&key) {
            return Ok(());
        }

        let kind = ShaderKind::Material {
            has_texture: key.has_texture,
            region_highlight: key.region_highlight,
        };
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self.shader_generator.generate_shader(&self.device, kind);
        let pipeline = shader.map(|shader| {
            self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Material Pipeline"),
                layout: Some(&self.pipelines.material),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::desc()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    // Scanned parts are often open shells; both sides are shaded.
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
        });
        let validation = futures::executor::block_on(self.device.pop_error_scope());

        let pipeline = pipeline?;
        if let Some(error) = validation {
            anyhow::bail!("Material pipeline {key:?} failed validation: {error}");
        }
        self.pipeline_cache.insert(key, pipeline);
        Ok(())
    }

    /// Decorates a material with the region highlight shader, falling back to
    /// the undecorated variant when that fails to build.
    pub(super) fn decorate_material(&mut self, has_texture: bool) -> PipelineCacheKey {
        let decorated = PipelineCacheKey {
            has_texture,
            region_highlight: self.region_highlight,
        };
        match self.ensure_pipeline(decorated) {
            Ok(()) => return decorated,
            Err(e) if decorated.region_highlight => {
                log::error!("Region highlight shader unavailable, drawing undecorated: {e:#}");
                self.region_highlight = false;
            }
            Err(e) => log::error!("Material shader unavailable: {e:#}"),
        }

        let plain = PipelineCacheKey {
            has_texture,
            region_highlight: false,
        };
        if let Err(e) = self.ensure_pipeline(plain) {
            log::error!("Material shader unavailable: {e:#}");
        }
        plain
    }

    /// Alpha-blended decal pipeline drawn over the main pass without writing depth.
    pub(super) fn create_decal_pipeline(&mut self) -> anyhow::Result<wgpu::RenderPipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self.shader_generator.generate_shader(&self.device, ShaderKind::Decal);
        let pipeline = shader.map(|shader| {
            self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Decal Pipeline"),
                layout: Some(&self.pipelines.decal),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::desc()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.config.format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState {
                        constant: -2,
                        slope_scale: -1.0,
                        clamp: 0.0,
                    },
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            })
        });
        let validation = futures::executor::block_on(self.device.pop_error_scope());

        let pipeline = pipeline?;
        if let Some(error) = validation {
            anyhow::bail!("Decal pipeline failed validation: {error}");
        }
        Ok(pipeline)
    }
}
