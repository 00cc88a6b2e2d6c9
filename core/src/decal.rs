//! Decal projection onto mesh surfaces.
//!
//! A decal is a textured patch of the target part's own triangles, clipped to a
//! box oriented along the inverted surface normal. Geometry lives on the CPU; the
//! renderer uploads it whenever [`DecalProjector::generation`] changes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};
use image::RgbaImage;

use crate::common::{Aabb, ConvexPolyhedron, Ray};
use crate::mesh::{MeshPart, Model, Vertex};
use crate::region::DecalKind;

/// Depth of the projection box relative to the decal size.
pub const DECAL_DEPTH_FACTOR: f32 = 0.6;

/// Offset along the surface normal, relative to the decal size.
const DECAL_NORMAL_OFFSET: f32 = 0.002;

/// Handle to a live decal owned by a [`DecalProjector`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecalHandle(u64);

/// Which part of the loaded model a decal is projected onto.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SurfaceTarget {
    /// First part of the model that has triangles.
    #[default]
    Model,
    Part(usize),
}

/// Where a decal texture comes from.
#[derive(Debug, Clone)]
pub enum DecalTextureSource {
    Path(PathBuf),
    Bytes(Arc<Vec<u8>>),
    Image(Arc<RgbaImage>),
}

impl DecalTextureSource {
    fn load(&self) -> Result<Arc<RgbaImage>> {
        match self {
            DecalTextureSource::Path(path) => {
                let image = image::open(path)
                    .with_context(|| format!("Failed to open decal texture {}", path.display()))?;
                Ok(Arc::new(image.to_rgba8()))
            }
            DecalTextureSource::Bytes(bytes) => {
                let image = image::load_from_memory(bytes).context("Failed to decode decal texture")?;
                Ok(Arc::new(image.to_rgba8()))
            }
            DecalTextureSource::Image(image) => Ok(image.clone()),
        }
    }
}

/// Decal kind name to texture source.
#[derive(Debug, Clone, Default)]
pub struct DecalCatalog {
    entries: HashMap<String, DecalTextureSource>,
}

impl DecalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: impl Into<String>, source: DecalTextureSource) -> Self {
        self.insert(kind, source);
        self
    }

    pub fn insert(&mut self, kind: impl Into<String>, source: DecalTextureSource) {
        self.entries.insert(kind.into(), source);
    }

    pub fn get(&self, kind: &str) -> Option<&DecalTextureSource> {
        self.entries.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Per-kind texture cache. Failures are cached too, so a broken kind is reported once.
#[derive(Debug, Default)]
struct DecalTextureCache {
    entries: HashMap<String, Option<Arc<RgbaImage>>>,
}

impl DecalTextureCache {
    fn get_or_load(&mut self, kind: &str, catalog: &DecalCatalog) -> Option<Arc<RgbaImage>> {
        if let Some(entry) = self.entries.get(kind) {
            return entry.clone();
        }
        let loaded = match catalog.get(kind) {
            Some(source) => match source.load() {
                Ok(image) => Some(image),
                Err(e) => {
                    log::warn!("Decal texture '{kind}' unavailable: {e:#}");
                    None
                }
            },
            None => {
                log::warn!("No decal texture configured for kind '{kind}'");
                None
            }
        };
        self.entries.insert(kind.to_string(), loaded.clone());
        loaded
    }
}

/// A projected decal: world-space geometry plus its texture.
#[derive(Debug, Clone)]
pub struct Decal {
    pub handle: DecalHandle,
    pub kind: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub texture: Arc<RgbaImage>,
}

/// Orthonormal decal frame. `z` is the projection axis (the inverted normal).
#[derive(Debug, Copy, Clone)]
struct DecalFrame {
    origin: Point3<f32>,
    x: Vector3<f32>,
    y: Vector3<f32>,
    z: Vector3<f32>,
}

impl DecalFrame {
    fn new(origin: Point3<f32>, normal: Vector3<f32>) -> Option<Self> {
        if normal.magnitude2() == 0.0 {
            return None;
        }
        let z = -normal.normalize();
        let helper = if z.y.abs() >= 0.99 { Vector3::unit_x() } else { Vector3::unit_y() };
        let x = helper.cross(z).normalize();
        let y = z.cross(x);
        Some(Self { origin, x, y, z })
    }

    fn to_local(&self, point: Point3<f32>) -> Point3<f32> {
        let d = point - self.origin;
        Point3::new(d.dot(self.x), d.dot(self.y), d.dot(self.z))
    }

    fn to_world(&self, local: Point3<f32>) -> Point3<f32> {
        self.origin + self.x * local.x + self.y * local.y + self.z * local.z
    }
}

/// Clips `part` to the decal box and returns world-space vertices and indices.
///
/// Returns `None` when nothing of the surface falls inside the box.
pub fn project_onto_part(
    part: &MeshPart,
    position: Point3<f32>,
    normal: Vector3<f32>,
    size: f32,
) -> Option<(Vec<Vertex>, Vec<u32>)> {
    if !(size > 0.0) {
        return None;
    }
    let frame = DecalFrame::new(position, normal)?;
    let half = Vector3::new(size * 0.5, size * 0.5, size * DECAL_DEPTH_FACTOR * 0.5);
    let bounds = Aabb::new(Point3::from_vec(-half), Point3::from_vec(half));
    let volume = ConvexPolyhedron::from_aabb(&bounds);
    let world_box = Aabb::from_center_size(position, size.max(size * DECAL_DEPTH_FACTOR) * 1.8);
    let offset = -frame.z * (size * DECAL_NORMAL_OFFSET);

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for triangle in 0..part.triangle_count() {
        let Some(corners) = part.triangle(triangle) else {
            continue;
        };
        let Some(tri_bounds) = Aabb::from_points(corners) else {
            continue;
        };
        if !tri_bounds.intersects(&world_box) {
            continue;
        }
        let face = (corners[1] - corners[0]).cross(corners[2] - corners[0]);
        if face.magnitude2() == 0.0 || face.dot(-frame.z) <= 0.0 {
            continue;
        }
        let face = face.normalize();

        let polygon: Vec<Point3<f32>> = corners.iter().map(|c| frame.to_local(*c)).collect();
        let clipped = volume.clip_polygon(polygon, |p| *p, |a, b, t| *a + (*b - *a) * t);
        if clipped.len() < 3 {
            continue;
        }

        let base = vertices.len() as u32;
        for local in &clipped {
            vertices.push(Vertex {
                position: (frame.to_world(*local) + offset).into(),
                tex_coords: [local.x / size + 0.5, 0.5 - local.y / size],
                normal: face.into(),
            });
        }
        for k in 1..clipped.len() as u32 - 1 {
            indices.extend_from_slice(&[base, base + k, base + k + 1]);
        }
    }

    (!indices.is_empty()).then_some((vertices, indices))
}

/// Builds and owns decals for the current model.
pub struct DecalProjector {
    model: Option<Arc<Model>>,
    catalog: DecalCatalog,
    textures: DecalTextureCache,
    decals: HashMap<DecalHandle, Decal>,
    next_handle: u64,
    view_origin: Option<Point3<f32>>,
    generation: u64,
}

impl DecalProjector {
    pub fn new(catalog: DecalCatalog) -> Self {
        Self {
            model: None,
            catalog,
            textures: DecalTextureCache::default(),
            decals: HashMap::new(),
            next_handle: 1,
            view_origin: None,
            generation: 0,
        }
    }

    /// Swaps the projection surface. All existing decals are released.
    pub fn set_model(&mut self, model: Option<Arc<Model>>) {
        self.model = model;
        if !self.decals.is_empty() {
            self.decals.clear();
            self.generation += 1;
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Camera eye used when a decal is recomputed from its stored anchor.
    pub fn set_view_origin(&mut self, origin: Point3<f32>) {
        self.view_origin = Some(origin);
    }

    pub fn create_decal(
        &mut self,
        position: Point3<f32>,
        normal: Vector3<f32>,
        size: f32,
        kind: &DecalKind,
        target: SurfaceTarget,
    ) -> Option<DecalHandle> {
        let DecalKind::Named(kind) = kind else {
            return None;
        };
        let model = self.model.clone()?;
        let texture = self.textures.get_or_load(kind, &self.catalog)?;

        let Some(part) = resolve_target(&model, target) else {
            log::debug!("No projectable surface for decal '{kind}'");
            return None;
        };
        let Some((vertices, indices)) = project_onto_part(part, position, normal, size) else {
            log::debug!("Decal '{kind}' clipped to empty geometry");
            return None;
        };

        let handle = DecalHandle(self.next_handle);
        self.next_handle += 1;
        self.generation += 1;
        log::debug!("Created decal {} ({kind}, {} triangles)", handle.0, indices.len() / 3);
        self.decals.insert(
            handle,
            Decal {
                handle,
                kind: kind.clone(),
                vertices,
                indices,
                texture,
            },
        );
        Some(handle)
    }

    /// Rebuilds a decal for a stored anchor.
    ///
    /// Casts from the view origin through the anchor to find the current surface;
    /// a miss falls back to the stored position and normal.
    pub fn recreate(
        &mut self,
        position: Point3<f32>,
        normal: Vector3<f32>,
        size: f32,
        kind: &DecalKind,
    ) -> Option<DecalHandle> {
        let hit = self.model.as_ref().and_then(|model| {
            let ray = Ray::through(self.view_origin?, position)?;
            model.intersect_ray(&ray)
        });
        match hit {
            Some(hit) => self.create_decal(hit.point, hit.normal, size, kind, SurfaceTarget::Part(hit.part)),
            None => self.create_decal(position, normal, size, kind, SurfaceTarget::Model),
        }
    }

    /// Frees a decal. Returns false for an unknown handle.
    pub fn release(&mut self, handle: DecalHandle) -> bool {
        let removed = self.decals.remove(&handle).is_some();
        if removed {
            self.generation += 1;
        }
        removed
    }

    pub fn live_count(&self) -> usize {
        self.decals.len()
    }

    pub fn get(&self, handle: DecalHandle) -> Option<&Decal> {
        self.decals.get(&handle)
    }

    /// Live decals in creation order.
    pub fn decals(&self) -> Vec<&Decal> {
        let mut decals: Vec<&Decal> = self.decals.values().collect();
        decals.sort_by_key(|d| d.handle);
        decals
    }

    /// Bumped on every create and release.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn resolve_target(model: &Model, target: SurfaceTarget) -> Option<&MeshPart> {
    match target {
        SurfaceTarget::Part(index) => model.parts().get(index).filter(|p| p.has_triangles()),
        SurfaceTarget::Model => model.parts().iter().find(|p| p.has_triangles()),
    }
}
