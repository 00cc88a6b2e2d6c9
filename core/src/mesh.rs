//! CPU-side mesh model: the inspected object as world-space parts.
//!
//! A [`Model`] is immutable once loaded and shared (`Arc<Model>`) between the
//! renderer, the decal projector and cursor picking.

use std::sync::Arc;

use cgmath::{InnerSpace, Point3, Vector3};

use crate::common::{Aabb, Ray, RgbaColor};
use crate::renderer::VertexShaderLocations;

/// GPU-compatible vertex: position, texture coordinates and normal.
///
/// 32 bytes: 12 position + 8 tex_coords + 12 normal.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// World-space position [x, y, z]
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    /// World-space normal [x, y, z]
    pub normal: [f32; 3],
}

impl Vertex {
    /// Vertex buffer layout matching `VertexShaderLocations`.
    pub(crate) fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: VertexShaderLocations::VertexPosition as u32,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: VertexShaderLocations::TextureCoords as u32,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: VertexShaderLocations::VertexNormal as u32,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }

    pub fn point(&self) -> Point3<f32> {
        Point3::from(self.position)
    }
}

/// Base color material of a mesh part.
#[derive(Debug, Clone)]
pub struct MaterialDesc {
    pub name: Option<String>,
    pub base_color: RgbaColor,
    pub base_color_texture: Option<Arc<image::RgbaImage>>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: None,
            base_color: RgbaColor::rgb(0.8, 0.8, 0.8),
            base_color_texture: None,
        }
    }
}

/// Closest ray hit on a model surface.
#[derive(Debug, Copy, Clone)]
pub struct SurfaceHit {
    pub distance: f32,
    pub point: Point3<f32>,
    /// Unit face normal, flipped to face the ray origin.
    pub normal: Vector3<f32>,
    pub part: usize,
    pub triangle: usize,
}

/// One renderable triangle list with a single material.
#[derive(Debug, Clone)]
pub struct MeshPart {
    pub name: Option<String>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: usize,
    bounds: Option<Aabb>,
}

impl MeshPart {
    pub fn new(name: Option<String>, vertices: Vec<Vertex>, indices: Vec<u32>, material: usize) -> Self {
        let bounds = Aabb::from_points(vertices.iter().map(Vertex::point));
        Self { name, vertices, indices, material, bounds }
    }

    /// Axis-aligned box centered at `center`.
    pub fn cuboid(center: Point3<f32>, width: f32, height: f32, depth: f32) -> Self {
        struct Face {
            normal: [f32; 3],
            corners: [[f32; 3]; 4],
        }

        let hw = width / 2.0;
        let hh = height / 2.0;
        let hd = depth / 2.0;

        let faces = [
            Face { normal: [0.0, 0.0, 1.0], corners: [[-hw, -hh, hd], [hw, -hh, hd], [hw, hh, hd], [-hw, hh, hd]] },
            Face { normal: [0.0, 0.0, -1.0], corners: [[hw, -hh, -hd], [-hw, -hh, -hd], [-hw, hh, -hd], [hw, hh, -hd]] },
            Face { normal: [0.0, 1.0, 0.0], corners: [[-hw, hh, hd], [hw, hh, hd], [hw, hh, -hd], [-hw, hh, -hd]] },
            Face { normal: [0.0, -1.0, 0.0], corners: [[-hw, -hh, -hd], [hw, -hh, -hd], [hw, -hh, hd], [-hw, -hh, hd]] },
            Face { normal: [1.0, 0.0, 0.0], corners: [[hw, -hh, hd], [hw, -hh, -hd], [hw, hh, -hd], [hw, hh, hd]] },
            Face { normal: [-1.0, 0.0, 0.0], corners: [[-hw, -hh, -hd], [-hw, -hh, hd], [-hw, hh, hd], [-hw, hh, -hd]] },
        ];
        let uvs: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for face in &faces {
            let base = vertices.len() as u32;
            for (corner, uv) in face.corners.iter().zip(uvs) {
                vertices.push(Vertex {
                    position: [corner[0] + center.x, corner[1] + center.y, corner[2] + center.z],
                    tex_coords: uv,
                    normal: face.normal,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(Some("cuboid".into()), vertices, indices, 0)
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn has_triangles(&self) -> bool {
        self.triangle_count() > 0
    }

    /// Corner positions of triangle `i`.
    pub fn triangle(&self, i: usize) -> Option<[Point3<f32>; 3]> {
        let idx = self.indices.get(i * 3..i * 3 + 3)?;
        let fetch = |k: u32| self.vertices.get(k as usize).map(Vertex::point);
        Some([fetch(idx[0])?, fetch(idx[1])?, fetch(idx[2])?])
    }

    /// Nearest double-sided hit along the ray.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<SurfaceHit> {
        self.bounds?.intersects_ray(ray)?;

        let mut best: Option<SurfaceHit> = None;
        for triangle in 0..self.triangle_count() {
            let Some([v0, v1, v2]) = self.triangle(triangle) else {
                continue;
            };
            let Some((t, _, _)) = ray.intersect_triangle(v0, v1, v2) else {
                continue;
            };
            if best.as_ref().is_some_and(|b| b.distance <= t) {
                continue;
            }
            let mut normal = (v1 - v0).cross(v2 - v0);
            if normal.magnitude2() == 0.0 {
                continue;
            }
            normal = normal.normalize();
            if normal.dot(ray.direction) > 0.0 {
                normal = -normal;
            }
            best = Some(SurfaceHit {
                distance: t,
                point: ray.point_at(t),
                normal,
                part: 0,
                triangle,
            });
        }
        best
    }
}

/// A loaded mesh: world-space parts plus their materials.
#[derive(Debug, Clone)]
pub struct Model {
    parts: Vec<MeshPart>,
    materials: Vec<MaterialDesc>,
    bounds: Option<Aabb>,
}

impl Model {
    /// Builds a model. Parts pointing at a missing material fall back to material 0,
    /// which is a default gray when the list is empty.
    pub fn new(mut parts: Vec<MeshPart>, mut materials: Vec<MaterialDesc>) -> Self {
        if materials.is_empty() {
            materials.push(MaterialDesc::default());
        }
        for part in &mut parts {
            if part.material >= materials.len() {
                part.material = 0;
            }
        }
        let bounds = parts
            .iter()
            .filter_map(MeshPart::bounds)
            .reduce(|a, b| a.merge(&b));
        Self { parts, materials, bounds }
    }

    pub fn parts(&self) -> &[MeshPart] {
        &self.parts
    }

    pub fn materials(&self) -> &[MaterialDesc] {
        &self.materials
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(MeshPart::triangle_count).sum()
    }

    /// Nearest hit over all parts.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<SurfaceHit> {
        self.parts
            .iter()
            .enumerate()
            .filter_map(|(index, part)| {
                part.intersect_ray(ray).map(|hit| SurfaceHit { part: index, ..hit })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn unit_cube_model() -> Model {
        Model::new(vec![MeshPart::cuboid(Point3::new(0.0, 0.0, 0.0), 2.0, 2.0, 2.0)], vec![])
    }

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_cuboid_counts_and_bounds() {
        let part = MeshPart::cuboid(Point3::new(1.0, 0.0, 0.0), 2.0, 4.0, 6.0);
        assert_eq!(part.vertices.len(), 24);
        assert_eq!(part.triangle_count(), 12);
        let bounds = part.bounds().unwrap();
        assert_eq!(bounds.min, Point3::new(0.0, -2.0, -3.0));
        assert_eq!(bounds.max, Point3::new(2.0, 2.0, 3.0));
    }

    #[test]
    fn test_model_defaults_material() {
        let model = unit_cube_model();
        assert_eq!(model.materials().len(), 1);
        assert_eq!(model.parts()[0].material, 0);
    }

    #[test]
    fn test_model_bounds_merge_parts() {
        let model = Model::new(
            vec![
                MeshPart::cuboid(Point3::new(0.0, 0.0, 0.0), 1.0, 1.0, 1.0),
                MeshPart::cuboid(Point3::new(5.0, 0.0, 0.0), 1.0, 1.0, 1.0),
            ],
            vec![],
        );
        let bounds = model.bounds().unwrap();
        assert!((bounds.largest_extent() - 6.0).abs() < EPSILON);
    }

    #[test]
    fn test_intersect_ray_front_face() {
        let model = unit_cube_model();
        let ray = Ray::new(Point3::new(0.2, 0.1, 10.0), Vector3::new(0.0, 0.0, -1.0));
        let hit = model.intersect_ray(&ray).unwrap();
        assert!((hit.distance - 9.0).abs() < EPSILON);
        assert!((hit.point.z - 1.0).abs() < EPSILON);
        assert!((hit.normal.z - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_intersect_ray_picks_nearest_part() {
        let model = Model::new(
            vec![
                MeshPart::cuboid(Point3::new(0.0, 0.0, -5.0), 1.0, 1.0, 1.0),
                MeshPart::cuboid(Point3::new(0.0, 0.0, 0.0), 1.0, 1.0, 1.0),
            ],
            vec![],
        );
        let ray = Ray::new(Point3::new(0.0, 0.0, 10.0), Vector3::new(0.0, 0.0, -1.0));
        let hit = model.intersect_ray(&ray).unwrap();
        assert_eq!(hit.part, 1);
    }

    #[test]
    fn test_intersect_ray_miss() {
        let model = unit_cube_model();
        let ray = Ray::new(Point3::new(5.0, 5.0, 10.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(model.intersect_ray(&ray).is_none());
    }
}
