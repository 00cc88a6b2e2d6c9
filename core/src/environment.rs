//! Scene lighting: hemisphere ambient plus one key light.
//!
//! An HDR environment only feeds the ambient term. The sky and ground colors are
//! the mean radiance of the upper and lower halves of the equirect image.

pub mod hdr_loader;

use cgmath::{InnerSpace, Vector3};

pub use hdr_loader::{decode_hdr, HdrImage};

const NEUTRAL_SKY: f32 = 0.6;
const NEUTRAL_GROUND: f32 = 0.35;
const KEY_INTENSITY: f32 = 0.6;

/// Lighting used by every material and decal.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub sky_color: [f32; 3],
    pub ground_color: [f32; 3],
    /// Direction toward the key light.
    pub key_direction: Vector3<f32>,
    pub key_intensity: f32,
    pub key_color: [f32; 3],
    /// True for the synthesized uniform-gray fallback.
    pub is_fallback: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self::neutral()
    }
}

impl Environment {
    /// Uniform gray lighting used when no HDR is supplied or it fails to load.
    pub fn neutral() -> Self {
        Self {
            sky_color: [NEUTRAL_SKY; 3],
            ground_color: [NEUTRAL_GROUND; 3],
            key_direction: Vector3::new(0.4, 1.0, 0.6).normalize(),
            key_intensity: KEY_INTENSITY,
            key_color: [1.0; 3],
            is_fallback: true,
        }
    }

    /// Derives ambient colors from an equirectangular HDR. Values are clamped to [0, 1].
    pub fn from_hdr(image: &HdrImage) -> Self {
        let half = image.height / 2;
        let sky = mean_rows(image, 0..half.max(1));
        let ground = mean_rows(image, half..image.height);
        Self {
            sky_color: sky.map(|c| c.clamp(0.0, 1.0)),
            ground_color: ground.map(|c| c.clamp(0.0, 1.0)),
            is_fallback: false,
            ..Self::neutral()
        }
    }

    /// Decodes a `.hdr` file and derives lighting from it.
    pub fn from_hdr_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Self::from_hdr(&decode_hdr(bytes)?))
    }

    pub(crate) fn to_uniform(&self) -> LightingUniform {
        let [sr, sg, sb] = self.sky_color;
        let [gr, gg, gb] = self.ground_color;
        let [kr, kg, kb] = self.key_color;
        let d = self.key_direction;
        LightingUniform {
            sky_color: [sr, sg, sb, 1.0],
            ground_color: [gr, gg, gb, 1.0],
            key_direction: [d.x, d.y, d.z, self.key_intensity],
            key_color: [kr, kg, kb, 1.0],
        }
    }
}

fn mean_rows(image: &HdrImage, rows: std::ops::Range<u32>) -> [f32; 3] {
    let mut sum = [0.0f64; 3];
    let mut count = 0usize;
    for y in rows {
        for pixel in image.row(y) {
            for (s, c) in sum.iter_mut().zip(pixel) {
                *s += *c as f64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return [NEUTRAL_SKY; 3];
    }
    sum.map(|s| (s / count as f64) as f32)
}

/// Lighting uniform at bind group 2, binding 0.
///
/// # Memory Layout (64 bytes)
///
/// | Offset | Size | Field         |
/// |--------|------|---------------|
/// | 0      | 16   | sky_color     |
/// | 16     | 16   | ground_color  |
/// | 32     | 16   | key_direction |
/// | 48     | 16   | key_color     |
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct LightingUniform {
    sky_color: [f32; 4],
    ground_color: [f32; 4],
    key_direction: [f32; 4],
    key_color: [f32; 4],
}
