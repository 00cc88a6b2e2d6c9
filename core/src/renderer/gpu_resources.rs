//! GPU resources for the loaded model and its decals.
//!
//! Everything here is created from CPU-side [`Model`] / [`Decal`] data and dropped
//! wholesale when the mesh is swapped, so there is no per-resource sync state.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use wgpu::util::{BufferInitDescriptor, DeviceExt};

use crate::decal::Decal;
use crate::mesh::{MaterialDesc, MeshPart, Model};

use super::types::PipelineCacheKey;

/// Depth format shared by the main pass, decals and occlusion probes.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// A texture with its view and sampler.
pub(crate) struct GpuTexture {
    pub(crate) _texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
}

/// Material uniform at bind group 1, binding 0.
///
/// # Memory Layout (16 bytes)
///
/// | Offset | Size | Field      |
/// |--------|------|------------|
/// | 0      | 16   | base_color |
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct MaterialUniform {
    pub base_color: [f32; 4],
}

impl MaterialUniform {
    pub fn from_material(material: &MaterialDesc) -> Self {
        Self { base_color: material.base_color.to_array() }
    }
}

pub(crate) struct GpuMaterial {
    _uniform: wgpu::Buffer,
    _texture: Option<GpuTexture>,
    pub(crate) bind_group: wgpu::BindGroup,
    /// Pipeline chosen when the material was decorated.
    pub(crate) pipeline: PipelineCacheKey,
}

pub(crate) struct GpuMeshPart {
    pub(crate) vertex_buffer: wgpu::Buffer,
    pub(crate) index_buffer: wgpu::Buffer,
    pub(crate) index_count: u32,
    pub(crate) material: usize,
}

/// GPU copy of the current model.
pub(crate) struct GpuModel {
    pub(crate) parts: Vec<GpuMeshPart>,
    pub(crate) materials: Vec<GpuMaterial>,
}

struct GpuDecal {
    kind: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// Decal geometry plus one texture bind group per decal kind.
#[derive(Default)]
pub(crate) struct GpuDecals {
    decals: Vec<GpuDecal>,
    /// kind -> (source image, bind group). The image pointer detects catalog reloads.
    textures: HashMap<String, (Arc<RgbaImage>, GpuTexture, wgpu::BindGroup)>,
    pub(crate) generation: Option<u64>,
}

impl GpuDecals {
    /// Rebuilds decal buffers from the projector's current set.
    pub(crate) fn sync<'d>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        decals: impl IntoIterator<Item = &'d Decal>,
        generation: u64,
    ) {
        self.decals.clear();
        for decal in decals {
            if decal.indices.is_empty() {
                continue;
            }
            let cached = self
                .textures
                .get(&decal.kind)
                .is_some_and(|(image, _, _)| Arc::ptr_eq(image, &decal.texture));
            if !cached {
                let texture = create_rgba_texture(device, queue, &decal.texture, &format!("Decal Texture {}", decal.kind));
                let bind_group = create_decal_bind_group(device, layout, &texture);
                self.textures.insert(decal.kind.clone(), (Arc::clone(&decal.texture), texture, bind_group));
            }
            self.decals.push(GpuDecal {
                kind: decal.kind.clone(),
                vertex_buffer: device.create_buffer_init(&BufferInitDescriptor {
                    label: Some("Decal Vertex Buffer"),
                    contents: bytemuck::cast_slice(&decal.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                index_buffer: device.create_buffer_init(&BufferInitDescriptor {
                    label: Some("Decal Index Buffer"),
                    contents: bytemuck::cast_slice(&decal.indices),
                    usage: wgpu::BufferUsages::INDEX,
                }),
                index_count: decal.indices.len() as u32,
            });
        }
        self.generation = Some(generation);
        log::debug!("Synced {} decals to the GPU", self.decals.len());
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.decals.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.decals.clear();
        self.generation = None;
    }

    /// Draws every decal. The decal pipeline and scene bind groups must already be set.
    pub(crate) fn draw(&self, pass: &mut wgpu::RenderPass) {
        for decal in &self.decals {
            let Some((_, _, bind_group)) = self.textures.get(&decal.kind) else {
                continue;
            };
            pass.set_bind_group(1, bind_group, &[]);
            pass.set_vertex_buffer(0, decal.vertex_buffer.slice(..));
            pass.set_index_buffer(decal.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..decal.index_count, 0, 0..1);
        }
    }
}

/// Uploads every part of `model` that has triangles. `pipeline_for` picks the
/// pipeline of each material from whether it has a texture.
pub(crate) fn upload_model(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    material_layout: &wgpu::BindGroupLayout,
    white: &GpuTexture,
    model: &Model,
    mut pipeline_for: impl FnMut(bool) -> PipelineCacheKey,
) -> GpuModel {
    let materials = model
        .materials()
        .iter()
        .enumerate()
        .map(|(i, material)| {
            let has_texture = material.base_color_texture.is_some();
            upload_material(device, queue, material_layout, white, material, i, pipeline_for(has_texture))
        })
        .collect();

    let parts = model
        .parts()
        .iter()
        .filter(|part| part.has_triangles())
        .map(|part| upload_part(device, part))
        .collect();

    GpuModel { parts, materials }
}

fn upload_part(device: &wgpu::Device, part: &MeshPart) -> GpuMeshPart {
    let label = part.name.as_deref().unwrap_or("Mesh Part");
    GpuMeshPart {
        vertex_buffer: device.create_buffer_init(&BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&part.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }),
        index_buffer: device.create_buffer_init(&BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(&part.indices),
            usage: wgpu::BufferUsages::INDEX,
        }),
        index_count: part.indices.len() as u32,
        material: part.material,
    }
}

fn upload_material(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    white: &GpuTexture,
    material: &MaterialDesc,
    index: usize,
    pipeline: PipelineCacheKey,
) -> GpuMaterial {
    let uniform = device.create_buffer_init(&BufferInitDescriptor {
        label: Some(&format!("Material {index} Uniform")),
        contents: bytemuck::bytes_of(&MaterialUniform::from_material(material)),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let texture = material
        .base_color_texture
        .as_ref()
        .map(|image| create_rgba_texture(device, queue, image, &format!("Material {index} Base Color")));
    let bound = texture.as_ref().unwrap_or(white);

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("Material {index} Bind Group")),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&bound.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&bound.sampler),
            },
        ],
    });

    GpuMaterial {
        _uniform: uniform,
        _texture: texture,
        bind_group,
        pipeline,
    }
}

fn create_decal_bind_group(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, texture: &GpuTexture) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Decal Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            },
        ],
    })
}

/// Uploads an sRGB RGBA8 image.
pub(crate) fn create_rgba_texture(device: &wgpu::Device, queue: &wgpu::Queue, image: &RgbaImage, label: &str) -> GpuTexture {
    let (width, height) = image.dimensions();
    let size = wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    if width > 0 && height > 0 {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );
    }

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    GpuTexture { _texture: texture, view, sampler }
}

/// A 1x1 texture bound where a material has no base color texture.
pub(crate) fn create_solid_color_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    color: [u8; 4],
    label: &str,
) -> GpuTexture {
    let pixel = RgbaImage::from_pixel(1, 1, image::Rgba(color));
    create_rgba_texture(device, queue, &pixel, label)
}

/// Depth buffer matching the surface size.
pub(crate) fn create_depth_texture(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    label: &str,
) -> GpuTexture {
    let size = wgpu::Extent3d {
        width: config.width.max(1),
        height: config.height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        compare: Some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    });

    GpuTexture { _texture: texture, view, sampler }
}
