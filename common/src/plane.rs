use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};

use crate::EPSILON;

/// A plane defined by a unit normal and its signed offset from the origin.
///
/// The plane equation is `normal · p + distance = 0`. Points with negative
/// signed distance lie inside, on the side opposite the normal.
#[derive(Debug, Copy, Clone)]
pub struct Plane {
    /// Unit normal pointing out of the half-space
    pub normal: Vector3<f32>,
    pub distance: f32,
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal.
    pub fn new(normal: Vector3<f32>, point: Point3<f32>) -> Self {
        let normal = normal.normalize();
        let distance = -normal.dot(point.to_vec());
        Self { normal, distance }
    }

    pub fn signed_distance(&self, point: Point3<f32>) -> f32 {
        self.normal.dot(point.to_vec()) + self.distance
    }

    /// True if the point is on the inside of the plane, boundary included.
    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        self.signed_distance(point) <= EPSILON
    }

    /// Sutherland-Hodgman step: keeps the part of a convex polygon on the inside.
    ///
    /// `lerp` produces the vertex at parameter `t` between two vertices, so callers
    /// can carry extra attributes through the cut.
    pub fn clip_polygon<V, P, L>(&self, polygon: &[V], position: P, lerp: L) -> Vec<V>
    where
        V: Clone,
        P: Fn(&V) -> Point3<f32>,
        L: Fn(&V, &V, f32) -> V,
    {
        let mut out = Vec::with_capacity(polygon.len() + 2);
        let Some(mut prev) = polygon.last() else {
            return out;
        };
        let mut prev_dist = self.signed_distance(position(prev));

        for current in polygon {
            let dist = self.signed_distance(position(current));
            let prev_inside = prev_dist <= 0.0;
            let inside = dist <= 0.0;

            if inside != prev_inside {
                let t = prev_dist / (prev_dist - dist);
                out.push(lerp(prev, current, t));
            }
            if inside {
                out.push(current.clone());
            }

            prev = current;
            prev_dist = dist;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lerp(a: &Point3<f32>, b: &Point3<f32>, t: f32) -> Point3<f32> {
        *a + (*b - *a) * t
    }

    #[test]
    fn test_plane_from_normal_and_point() {
        let plane = Plane::new(Vector3::new(0.0, 2.0, 0.0), Point3::new(0.0, 5.0, 0.0));
        assert!((plane.normal.magnitude() - 1.0).abs() < EPSILON);
        assert!(plane.signed_distance(Point3::new(10.0, 5.0, -3.0)).abs() < EPSILON);
        assert!((plane.signed_distance(Point3::new(0.0, 7.0, 0.0)) - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_contains_point() {
        let plane = Plane::new(Vector3::new(1.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        assert!(plane.contains_point(Point3::new(0.0, 0.0, 0.0)));
        assert!(plane.contains_point(Point3::new(1.0, 3.0, 0.0)));
        assert!(!plane.contains_point(Point3::new(1.5, 0.0, 0.0)));
    }

    #[test]
    fn test_clip_keeps_inside_polygon() {
        let plane = Plane::new(Vector3::new(1.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let clipped = plane.clip_polygon(&tri, |p| *p, lerp);
        assert_eq!(clipped.len(), 3);
    }

    #[test]
    fn test_clip_drops_outside_polygon() {
        let plane = Plane::new(Vector3::new(1.0, 0.0, 0.0), Point3::new(-1.0, 0.0, 0.0));
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert!(plane.clip_polygon(&tri, |p| *p, lerp).is_empty());
    }

    #[test]
    fn test_clip_cuts_triangle_into_quad() {
        // x <= 0.5 keeps the corner at the origin and cuts two edges.
        let plane = Plane::new(Vector3::new(1.0, 0.0, 0.0), Point3::new(0.5, 0.0, 0.0));
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let clipped = plane.clip_polygon(&tri, |p| *p, lerp);
        assert_eq!(clipped.len(), 4);
        for p in &clipped {
            assert!(p.x <= 0.5 + EPSILON);
        }
    }
}
