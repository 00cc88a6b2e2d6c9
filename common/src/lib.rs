//! Geometry primitives shared by the defect viewer crates.

mod aabb;
mod convex_polyhedron;
mod plane;
mod ray;

pub use aabb::Aabb;
pub use convex_polyhedron::ConvexPolyhedron;
pub use plane::Plane;
pub use ray::Ray;

/// Tolerance used by intersection and containment tests.
pub const EPSILON: f32 = 1e-6;

/// Linear RGBA color, laid out for direct upload into uniform buffers.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RgbaColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl RgbaColor {
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);

    /// Opaque color from three channels.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl From<[f32; 4]> for RgbaColor {
    fn from(c: [f32; 4]) -> Self {
        Self { r: c[0], g: c[1], b: c[2], a: c[3] }
    }
}
