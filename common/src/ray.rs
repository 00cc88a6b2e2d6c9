use cgmath::{InnerSpace, Point3, Vector3};

use crate::EPSILON;

/// A ray in 3D space, defined by an origin point and a unit direction.
#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    /// Creates a new ray. The direction is normalized.
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Ray from `origin` passing through `through`.
    /// Returns None when both points coincide.
    pub fn through(origin: Point3<f32>, through: Point3<f32>) -> Option<Self> {
        let direction = through - origin;
        if direction.magnitude2() < EPSILON * EPSILON {
            return None;
        }
        Some(Self::new(origin, direction))
    }

    /// Point at distance `t` along the ray.
    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }

    /// Double-sided Möller-Trumbore ray/triangle test.
    ///
    /// Returns `Some((t, u, v))` with `t` the distance along the ray and `(u, v)`
    /// barycentric weights of `v1` and `v2`. Hits behind the origin are rejected.
    pub fn intersect_triangle(
        &self,
        v0: Point3<f32>,
        v1: Point3<f32>,
        v2: Point3<f32>,
    ) -> Option<(f32, f32, f32)> {
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = self.direction.cross(edge2);
        let det = edge1.dot(h);
        if det.abs() < EPSILON {
            return None;
        }

        let inv_det = 1.0 / det;
        let s = self.origin - v0;

        let u = inv_det * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = inv_det * self.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = inv_det * edge2.dot(q);
        (t > EPSILON).then_some((t, u, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> (Point3<f32>, Point3<f32>, Point3<f32>) {
        (
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn test_new_normalizes_direction() {
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(3.0, 4.0, 0.0));
        assert!((ray.direction.magnitude() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_through_points() {
        let ray = Ray::through(Point3::new(0.0, 0.0, 5.0), Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert!((ray.direction.z + 1.0).abs() < EPSILON);
        assert!(Ray::through(Point3::new(1.0, 1.0, 1.0), Point3::new(1.0, 1.0, 1.0)).is_none());
    }

    #[test]
    fn test_point_at() {
        let ray = Ray::new(Point3::new(1.0, 2.0, 3.0), Vector3::new(1.0, 0.0, 0.0));
        let point = ray.point_at(5.0);
        assert!((point.x - 6.0).abs() < EPSILON);
        assert!((point.y - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_triangle_front_hit() {
        let (a, b, c) = unit_triangle();
        let ray = Ray::new(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, -1.0));
        let (t, _, _) = ray.intersect_triangle(a, b, c).unwrap();
        assert!((t - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_triangle_back_hit() {
        let (a, b, c) = unit_triangle();
        let ray = Ray::new(Point3::new(0.0, 0.0, -5.0), Vector3::new(0.0, 0.0, 1.0));
        assert!(ray.intersect_triangle(a, b, c).is_some());
    }

    #[test]
    fn test_triangle_miss_outside() {
        let (a, b, c) = unit_triangle();
        let ray = Ray::new(Point3::new(3.0, 0.0, 5.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(ray.intersect_triangle(a, b, c).is_none());
    }

    #[test]
    fn test_triangle_behind_origin() {
        let (a, b, c) = unit_triangle();
        let ray = Ray::new(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, 1.0));
        assert!(ray.intersect_triangle(a, b, c).is_none());
    }

    #[test]
    fn test_triangle_parallel() {
        let (a, b, c) = unit_triangle();
        let ray = Ray::new(Point3::new(0.0, 0.0, 1.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(ray.intersect_triangle(a, b, c).is_none());
    }
}
