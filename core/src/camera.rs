use cgmath::{InnerSpace, MetricSpace, Point3, SquareMatrix, Vector3, Vector4};

use crate::common::{Aabb, Ray};
use crate::region::CameraSnapshot;

/// Remaps OpenGL clip depth [-1, 1] to wgpu depth [0, 1]: `z' = 0.5 * z + 0.5 * w`.
#[rustfmt::skip]
const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Perspective camera looking from `eye` at `target`.
///
/// # Example
///
/// ```
/// use cgmath::{Point3, Vector3};
/// use defect_viewer::Camera;
///
/// let camera = Camera {
///     eye: Point3::new(0.0, 0.0, 5.0),
///     target: Point3::new(0.0, 0.0, 0.0),
///     up: Vector3::new(0.0, 1.0, 0.0),
///     aspect: 16.0 / 9.0,
///     fovy: 45.0,
///     znear: 0.1,
///     zfar: 100.0,
/// };
/// assert!((camera.length() - 5.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    /// Up direction (Y-up: `(0, 1, 0)`).
    pub up: Vector3<f32>,
    /// Viewport width / height.
    pub aspect: f32,
    /// Vertical field of view in degrees.
    pub fovy: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Point3::new(0.0, 1.0, 3.0),
            target: Point3::new(0.0, 0.0, 0.0),
            up: Vector3::unit_y(),
            aspect: 1.0,
            fovy: 45.0,
            znear: 0.01,
            zfar: 100.0,
        }
    }
}

impl Camera {
    /// World to wgpu clip space.
    pub fn build_view_projection_matrix(&self) -> cgmath::Matrix4<f32> {
        let view = cgmath::Matrix4::look_at_rh(self.eye, self.target, self.up);
        let proj = cgmath::perspective(cgmath::Deg(self.fovy), self.aspect, self.znear, self.zfar);
        OPENGL_TO_WGPU_MATRIX * proj * view
    }

    /// Unit vector from eye toward target.
    pub fn forward(&self) -> Vector3<f32> {
        (self.target - self.eye).normalize()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.forward().cross(self.up).normalize()
    }

    /// Distance from the eye to the target.
    pub fn length(&self) -> f32 {
        self.eye.distance(self.target)
    }

    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            position: self.eye,
            target: self.target,
        }
    }

    pub(crate) fn to_uniform(&self) -> CameraUniform {
        let mut ret = CameraUniform::new();
        ret.update(self);
        ret
    }

    /// Moves the camera along its current view direction until `bounds` fits the frustum.
    ///
    /// Near and far planes are rescaled to the new distance.
    pub fn fit_to_bounds(&mut self, bounds: &Aabb) {
        let center = bounds.center();
        let bounding_radius = bounds.bounding_sphere_radius().max(1e-6);

        let half_fov_rad = (self.fovy / 2.0).to_radians();
        let vertical_distance = bounding_radius / half_fov_rad.sin();
        let half_hfov_rad = (half_fov_rad.tan() * self.aspect).atan();
        let horizontal_distance = bounding_radius / half_hfov_rad.sin();
        let distance = vertical_distance.max(horizontal_distance);

        let view_dir = if self.eye.distance(self.target) < 1e-6 {
            Vector3::new(0.0, 0.0, -1.0)
        } else {
            self.forward()
        };

        self.target = center;
        self.eye = center - view_dir * distance;
        self.znear = (distance * 0.001).max(0.001);
        self.zfar = (distance + bounding_radius) * 2.0;
    }

    /// Homogeneous clip coordinates of a world point, before perspective division.
    pub fn project_point_clip(&self, world_point: Point3<f32>) -> Vector4<f32> {
        self.build_view_projection_matrix() * world_point.to_homogeneous()
    }

    /// World point to normalized device coordinates. Z is in [0, 1] inside the frustum.
    pub fn project_point_ndc(&self, world_point: Point3<f32>) -> Point3<f32> {
        Point3::from_homogeneous(self.project_point_clip(world_point))
    }

    /// Inverse of [`project_point_ndc`](Self::project_point_ndc). None if the matrix is singular.
    pub fn unproject_point_ndc(&self, ndc_point: Point3<f32>) -> Option<Point3<f32>> {
        let inv_vp = self.build_view_projection_matrix().invert()?;
        Some(Point3::from_homogeneous(inv_vp * ndc_point.to_homogeneous()))
    }

    /// Screen pixel (origin top-left, Y down) to world space at `depth` in [0, 1].
    pub fn unproject_point_screen(
        &self,
        screen_x: f32,
        screen_y: f32,
        depth: f32,
        screen_width: u32,
        screen_height: u32,
    ) -> Option<Point3<f32>> {
        let ndc_x = (screen_x / screen_width as f32) * 2.0 - 1.0;
        let ndc_y = 1.0 - (screen_y / screen_height as f32) * 2.0;
        self.unproject_point_ndc(Point3::new(ndc_x, ndc_y, depth))
    }

    /// Picking ray from the eye through a screen pixel.
    pub fn ray_through_screen(&self, screen_x: f32, screen_y: f32, screen_width: u32, screen_height: u32) -> Option<Ray> {
        if screen_width == 0 || screen_height == 0 {
            return None;
        }
        let far = self.unproject_point_screen(screen_x, screen_y, 1.0, screen_width, screen_height)?;
        Ray::through(self.eye, far)
    }
}

/// Camera uniform at bind group 0.
///
/// # Memory Layout (80 bytes)
///
/// | Offset | Size | Field     |
/// |--------|------|-----------|
/// | 0      | 64   | view_proj |
/// | 64     | 16   | eye       |
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: cgmath::Matrix4::identity().into(),
            eye: [0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn update(&mut self, camera: &Camera) {
        self.view_proj = camera.build_view_projection_matrix().into();
        self.eye = [camera.eye.x, camera.eye.y, camera.eye.z, 1.0];
    }
}
