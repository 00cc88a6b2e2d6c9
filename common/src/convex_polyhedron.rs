use cgmath::{Point3, Vector3};

use crate::{Aabb, Plane};

/// A convex volume defined as the intersection of half-spaces.
///
/// A point is inside when it is on the inside of every plane. Used as the
/// clipping volume for projected surface geometry.
#[derive(Debug, Clone)]
pub struct ConvexPolyhedron {
    planes: Vec<Plane>,
}

impl ConvexPolyhedron {
    /// Creates a polyhedron from planes whose normals point outward.
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Six face planes of an axis-aligned box.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        let planes = vec![
            Plane::new(Vector3::new(-1.0, 0.0, 0.0), Point3::new(aabb.min.x, 0.0, 0.0)),
            Plane::new(Vector3::new(1.0, 0.0, 0.0), Point3::new(aabb.max.x, 0.0, 0.0)),
            Plane::new(Vector3::new(0.0, -1.0, 0.0), Point3::new(0.0, aabb.min.y, 0.0)),
            Plane::new(Vector3::new(0.0, 1.0, 0.0), Point3::new(0.0, aabb.max.y, 0.0)),
            Plane::new(Vector3::new(0.0, 0.0, -1.0), Point3::new(0.0, 0.0, aabb.min.z)),
            Plane::new(Vector3::new(0.0, 0.0, 1.0), Point3::new(0.0, 0.0, aabb.max.z)),
        ];
        Self { planes }
    }

    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        self.planes.iter().all(|plane| plane.contains_point(point))
    }

    /// Clips a convex polygon against every plane in turn.
    /// Returns an empty vector when nothing remains.
    pub fn clip_polygon<V, P, L>(&self, polygon: Vec<V>, position: P, lerp: L) -> Vec<V>
    where
        V: Clone,
        P: Fn(&V) -> Point3<f32>,
        L: Fn(&V, &V, f32) -> V,
    {
        let mut current = polygon;
        for plane in &self.planes {
            if current.is_empty() {
                break;
            }
            current = plane.clip_polygon(&current, &position, &lerp);
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> ConvexPolyhedron {
        ConvexPolyhedron::from_aabb(&Aabb::new(
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, 1.0),
        ))
    }

    fn lerp(a: &Point3<f32>, b: &Point3<f32>, t: f32) -> Point3<f32> {
        *a + (*b - *a) * t
    }

    #[test]
    fn test_from_aabb_has_six_planes() {
        assert_eq!(unit_box().planes().len(), 6);
    }

    #[test]
    fn test_contains_point() {
        let volume = unit_box();
        assert!(volume.contains_point(Point3::new(0.0, 0.0, 0.0)));
        assert!(volume.contains_point(Point3::new(1.0, 1.0, 1.0)));
        assert!(!volume.contains_point(Point3::new(1.5, 0.0, 0.0)));
    }

    #[test]
    fn test_clip_large_quad_to_box_face() {
        // A z=0 quad much larger than the box is cut to the box's 2x2 cross-section.
        let quad = vec![
            Point3::new(-5.0, -5.0, 0.0),
            Point3::new(5.0, -5.0, 0.0),
            Point3::new(5.0, 5.0, 0.0),
            Point3::new(-5.0, 5.0, 0.0),
        ];
        let clipped = unit_box().clip_polygon(quad, |p| *p, lerp);
        assert_eq!(clipped.len(), 4);
        for p in &clipped {
            assert!(p.x.abs() <= 1.0 + 1e-5);
            assert!(p.y.abs() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_clip_polygon_outside_is_empty() {
        let tri = vec![
            Point3::new(3.0, 3.0, 3.0),
            Point3::new(4.0, 3.0, 3.0),
            Point3::new(3.0, 4.0, 3.0),
        ];
        assert!(unit_box().clip_polygon(tri, |p| *p, lerp).is_empty());
    }
}
