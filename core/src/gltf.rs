//! glTF 2.0 import into a world-space [`Model`].
//!
//! Node transforms are baked into the vertices, so every primitive becomes one
//! [`MeshPart`] in world space. Only triangle primitives are kept.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector3};

use crate::common::RgbaColor;
use crate::mesh::{MaterialDesc, MeshPart, Model, Vertex};

/// Required extensions whose data this importer cannot decode.
const UNDECODABLE_EXTENSIONS: &[&str] = &[
    "KHR_draco_mesh_compression",
    "EXT_meshopt_compression",
    "KHR_texture_basisu",
];

/// Returns the first required extension in `bytes` that cannot be decoded.
///
/// Works on both `.glb` and `.gltf` JSON. Unparseable input yields `None`; the
/// importer reports that error itself.
pub(crate) fn undecodable_required_extension(bytes: &[u8]) -> Option<String> {
    let json: std::borrow::Cow<[u8]> = if bytes.starts_with(b"glTF") {
        gltf::binary::Glb::from_slice(bytes).ok()?.json
    } else {
        std::borrow::Cow::Borrowed(bytes)
    };
    let root: serde_json::Value = serde_json::from_slice(&json).ok()?;
    root.get("extensionsRequired")?
        .as_array()?
        .iter()
        .filter_map(serde_json::Value::as_str)
        .find(|name| UNDECODABLE_EXTENSIONS.contains(name))
        .map(str::to_string)
}

/// Imports a `.glb` / `.gltf` file. External buffers and images resolve relative to it.
pub fn load_model_from_path(path: impl AsRef<Path>) -> anyhow::Result<Model> {
    let path = path.as_ref();
    let (document, buffers, images) =
        gltf::import(path).with_context(|| format!("Failed to import glTF {}", path.display()))?;
    build_model(&document, &buffers, &images)
}

/// Imports a `.glb` or self-contained `.gltf` from memory.
pub fn load_model_from_slice(bytes: &[u8]) -> anyhow::Result<Model> {
    let (document, buffers, images) = gltf::import_slice(bytes).context("Failed to import glTF data")?;
    build_model(&document, &buffers, &images)
}

fn build_model(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> anyhow::Result<Model> {
    let mut textures: HashMap<usize, Option<Arc<image::RgbaImage>>> = HashMap::new();
    let mut materials: Vec<MaterialDesc> = document
        .materials()
        .map(|m| load_material(&m, images, &mut textures))
        .collect();
    let mut default_material = None;

    let mut parts = Vec::new();
    if let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) {
        for node in scene.nodes() {
            collect_node(
                &node,
                Matrix4::identity(),
                buffers,
                &mut materials,
                &mut default_material,
                &mut parts,
            )?;
        }
    }

    if parts.is_empty() {
        log::warn!("glTF document contains no triangle geometry");
    }
    Ok(Model::new(parts, materials))
}

fn collect_node(
    node: &gltf::Node,
    parent: Matrix4<f32>,
    buffers: &[gltf::buffer::Data],
    materials: &mut Vec<MaterialDesc>,
    default_material: &mut Option<usize>,
    parts: &mut Vec<MeshPart>,
) -> anyhow::Result<()> {
    let world = parent * Matrix4::from(node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping {:?} primitive in mesh {}",
                    primitive.mode(),
                    mesh.name().unwrap_or("unnamed")
                );
                continue;
            }
            let material = match primitive.material().index() {
                Some(index) => index,
                None => *default_material.get_or_insert_with(|| {
                    materials.push(MaterialDesc::default());
                    materials.len() - 1
                }),
            };
            let (vertices, indices) = load_primitive(&primitive, buffers, world)?;
            let name = mesh.name().or(node.name()).map(str::to_string);
            parts.push(MeshPart::new(name, vertices, indices, material));
        }
    }

    for child in node.children() {
        collect_node(&child, world, buffers, materials, default_material, parts)?;
    }
    Ok(())
}

/// Reads one triangle primitive and bakes `world` into it.
fn load_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    world: Matrix4<f32>,
) -> anyhow::Result<(Vec<Vertex>, Vec<u32>)> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| anyhow::anyhow!("Primitive missing positions"))?
        .collect();
    let tex_coords: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|t| t.into_f32().collect())
        .unwrap_or_default();
    let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
    let mut indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    indices.truncate(indices.len() - indices.len() % 3);
    if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
        anyhow::bail!("Index {bad} out of range for {} vertices", positions.len());
    }

    let normal_matrix = normal_matrix(&world);
    let mut vertices: Vec<Vertex> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let position = world.transform_point(Point3::from(*p));
            let normal = normals
                .as_ref()
                .and_then(|n| n.get(i))
                .map(|n| (normal_matrix * Vector3::from(*n)).normalize())
                .filter(|n| n.x.is_finite())
                .unwrap_or(Vector3::new(0.0, 0.0, 0.0));
            Vertex {
                position: position.into(),
                tex_coords: tex_coords.get(i).copied().unwrap_or([0.0, 0.0]),
                normal: normal.into(),
            }
        })
        .collect();

    // Mirroring transforms flip the winding.
    if world.determinant() < 0.0 {
        for triangle in indices.chunks_exact_mut(3) {
            triangle.swap(1, 2);
        }
    }
    if normals.is_none() {
        compute_vertex_normals(&mut vertices, &indices);
    }
    Ok((vertices, indices))
}

fn normal_matrix(world: &Matrix4<f32>) -> Matrix3<f32> {
    let upper = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
    upper.invert().map(|m| m.transpose()).unwrap_or(upper)
}

/// Area-weighted smooth normals for primitives that ship without them.
fn compute_vertex_normals(vertices: &mut [Vertex], indices: &[u32]) {
    let mut sums = vec![Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        let face = (vertices[b].point() - vertices[a].point()).cross(vertices[c].point() - vertices[a].point());
        for i in [a, b, c] {
            sums[i] += face;
        }
    }
    for (vertex, sum) in vertices.iter_mut().zip(sums) {
        if sum.magnitude2() > 0.0 {
            vertex.normal = sum.normalize().into();
        }
    }
}

fn load_material(
    material: &gltf::Material,
    images: &[gltf::image::Data],
    textures: &mut HashMap<usize, Option<Arc<image::RgbaImage>>>,
) -> MaterialDesc {
    let pbr = material.pbr_metallic_roughness();
    let base_color_texture = pbr.base_color_texture().and_then(|info| {
        let index = info.texture().source().index();
        textures
            .entry(index)
            .or_insert_with(|| match images.get(index).map(decode_image) {
                Some(Ok(image)) => Some(Arc::new(image)),
                Some(Err(e)) => {
                    log::warn!("Ignoring glTF image {index}: {e}");
                    None
                }
                None => None,
            })
            .clone()
    });
    MaterialDesc {
        name: material.name().map(str::to_string),
        base_color: RgbaColor::from(pbr.base_color_factor()),
        base_color_texture,
    }
}

/// Decoded glTF pixels to RGBA8.
fn decode_image(data: &gltf::image::Data) -> anyhow::Result<image::RgbaImage> {
    let (width, height) = (data.width, data.height);
    let rgba = match data.format {
        gltf::image::Format::R8G8B8A8 => image::RgbaImage::from_raw(width, height, data.pixels.clone()),
        gltf::image::Format::R8G8B8 => image::RgbImage::from_raw(width, height, data.pixels.clone())
            .map(|rgb| image::DynamicImage::ImageRgb8(rgb).to_rgba8()),
        gltf::image::Format::R8 => image::GrayImage::from_raw(width, height, data.pixels.clone())
            .map(|gray| image::DynamicImage::ImageLuma8(gray).to_rgba8()),
        gltf::image::Format::R8G8 => image::GrayAlphaImage::from_raw(width, height, data.pixels.clone())
            .map(|gray| image::DynamicImage::ImageLumaA8(gray).to_rgba8()),
        other => anyhow::bail!("Unsupported glTF image format {other:?}"),
    };
    rgba.ok_or_else(|| anyhow::anyhow!("glTF image data does not match {width}x{height}"))
}

/// Minimal in-memory `.glb` fixtures.
#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::json;

    /// A single triangle (0,0,0) (1,0,0) (0,1,0) without normals, under a node
    /// translated by `translation`.
    pub(crate) fn triangle_glb(translation: [f32; 3], extensions_required: &[&str]) -> Vec<u8> {
        let mut bin = Vec::new();
        for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in p {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in [0u32, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }

        let mut root = json!({
            "asset": { "version": "2.0" },
            "buffers": [{ "byteLength": bin.len() }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
                { "buffer": 0, "byteOffset": 36, "byteLength": 12 }
            ],
            "accessors": [
                { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                  "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
                { "bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR" }
            ],
            "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [0.5, 0.25, 1.0, 1.0] } }],
            "meshes": [{ "name": "panel", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] }],
            "nodes": [{ "mesh": 0, "translation": translation }],
            "scenes": [{ "nodes": [0] }],
            "scene": 0
        });
        if !extensions_required.is_empty() {
            root["extensionsRequired"] = json!(extensions_required);
            root["extensionsUsed"] = json!(extensions_required);
        }

        let mut json_chunk = serde_json::to_vec(&root).unwrap_or_default();
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_chunk);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::triangle_glb;
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_load_bakes_node_transform() {
        let model = load_model_from_slice(&triangle_glb([1.0, 0.0, 0.0], &[])).unwrap();
        assert_eq!(model.parts().len(), 1);
        assert_eq!(model.triangle_count(), 1);

        let part = &model.parts()[0];
        assert_eq!(part.name.as_deref(), Some("panel"));
        assert_eq!(part.vertices[0].position, [1.0, 0.0, 0.0]);
        assert_eq!(part.vertices[1].position, [2.0, 0.0, 0.0]);

        let bounds = model.bounds().unwrap();
        assert!((bounds.min.x - 1.0).abs() < EPSILON);
        assert!((bounds.max.x - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_missing_normals_are_computed() {
        let model = load_model_from_slice(&triangle_glb([0.0, 0.0, 0.0], &[])).unwrap();
        for vertex in &model.parts()[0].vertices {
            assert!((vertex.normal[2] - 1.0).abs() < EPSILON);
        }
    }

    #[test]
    fn test_base_color_factor() {
        let model = load_model_from_slice(&triangle_glb([0.0, 0.0, 0.0], &[])).unwrap();
        let material = &model.materials()[model.parts()[0].material];
        assert_eq!(material.base_color.to_array(), [0.5, 0.25, 1.0, 1.0]);
        assert!(material.base_color_texture.is_none());
    }

    #[test]
    fn test_detects_undecodable_extension() {
        let glb = triangle_glb([0.0, 0.0, 0.0], &["KHR_draco_mesh_compression"]);
        assert_eq!(
            undecodable_required_extension(&glb).as_deref(),
            Some("KHR_draco_mesh_compression")
        );
        assert_eq!(undecodable_required_extension(&triangle_glb([0.0, 0.0, 0.0], &[])), None);
    }

    #[test]
    fn test_detects_extension_in_json() {
        let json = br#"{"asset":{"version":"2.0"},"extensionsRequired":["KHR_texture_basisu"]}"#;
        assert_eq!(undecodable_required_extension(json).as_deref(), Some("KHR_texture_basisu"));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(load_model_from_slice(b"not a gltf").is_err());
    }
}
