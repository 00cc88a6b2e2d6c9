use wgpu::util::DeviceExt;

use crate::camera::CameraUniform;
use crate::environment::{Environment, LightingUniform};
use crate::highlight::HighlightUniform;

// Vertex shader attribute locations
pub(crate) enum VertexShaderLocations {
    VertexPosition = 0,
    TextureCoords,
    VertexNormal,
}

/// GPU resources for the view/projection uniform (bind group 0).
pub(super) struct CameraResources {
    pub(super) buffer: wgpu::Buffer,
    pub(super) bind_group_layout: wgpu::BindGroupLayout,
    pub(super) bind_group: wgpu::BindGroup,
}

impl CameraResources {
    pub(super) fn new(device: &wgpu::Device) -> CameraResources {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[CameraUniform::new()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("camera_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        CameraResources {
            buffer,
            bind_group_layout,
            bind_group,
        }
    }
}

/// Lighting and region highlight uniforms (bind group 2).
pub(super) struct SceneResources {
    pub(super) lighting_buffer: wgpu::Buffer,
    pub(super) highlight_buffer: wgpu::Buffer,
    pub(super) bind_group_layout: wgpu::BindGroupLayout,
    pub(super) bind_group: wgpu::BindGroup,
}

impl SceneResources {
    pub(super) fn new(device: &wgpu::Device) -> SceneResources {
        let lighting_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lighting Buffer"),
            contents: bytemuck::bytes_of(&Environment::neutral().to_uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let highlight_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Region Highlight Buffer"),
            size: std::mem::size_of::<HighlightUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[uniform_entry(0), uniform_entry(1)],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: lighting_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: highlight_buffer.as_entire_binding(),
                },
            ],
        });

        SceneResources {
            lighting_buffer,
            highlight_buffer,
            bind_group_layout,
            bind_group,
        }
    }

    pub(super) fn write_lighting(&self, queue: &wgpu::Queue, uniform: &LightingUniform) {
        queue.write_buffer(&self.lighting_buffer, 0, bytemuck::bytes_of(uniform));
    }

    pub(super) fn write_highlight(&self, queue: &wgpu::Queue, uniform: &HighlightUniform) {
        queue.write_buffer(&self.highlight_buffer, 0, bytemuck::bytes_of(uniform));
    }
}

/// Bind group layouts for group 1.
pub(super) struct MaterialBindGroupLayouts {
    /// Uniform + base color texture + sampler.
    pub(super) material: wgpu::BindGroupLayout,
    /// Decal texture + sampler.
    pub(super) decal: wgpu::BindGroupLayout,
}

impl MaterialBindGroupLayouts {
    pub(super) fn new(device: &wgpu::Device) -> MaterialBindGroupLayouts {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                sampler_entry(2),
            ],
        });

        let decal = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Decal Bind Group Layout"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });

        MaterialBindGroupLayouts { material, decal }
    }
}

/// Pipeline layouts: camera, group 1, scene.
pub(super) struct PipelineLayouts {
    pub(super) material: wgpu::PipelineLayout,
    pub(super) decal: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub(super) fn new(
        device: &wgpu::Device,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        material_layouts: &MaterialBindGroupLayouts,
        scene_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> PipelineLayouts {
        let material = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Material Pipeline Layout"),
            bind_group_layouts: &[
                camera_bind_group_layout,
                &material_layouts.material,
                scene_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let decal = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Decal Pipeline Layout"),
            bind_group_layouts: &[
                camera_bind_group_layout,
                &material_layouts.decal,
                scene_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        PipelineLayouts { material, decal }
    }
}

/// Cache key for material pipelines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineCacheKey {
    pub(crate) has_texture: bool,
    /// Region highlight decoration compiled in.
    pub(crate) region_highlight: bool,
}
