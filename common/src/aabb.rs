use cgmath::{InnerSpace, Point3};

use crate::{Ray, EPSILON};

/// An axis-aligned bounding box in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Creates a new AABB from min and max points.
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Creates a cube-shaped AABB of edge `size` centered on `center`.
    pub fn from_center_size(center: Point3<f32>, size: f32) -> Self {
        let half = size * 0.5;
        Self {
            min: Point3::new(center.x - half, center.y - half, center.z - half),
            max: Point3::new(center.x + half, center.y + half, center.z + half),
        }
    }

    /// Creates an AABB that encompasses all the given points.
    /// Returns None if the iterator is empty.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3<f32>>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |aabb, p| aabb.expand(p)))
    }

    /// Returns a copy grown to include the given point.
    pub fn expand(&self, point: Point3<f32>) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(point.x),
                self.min.y.min(point.y),
                self.min.z.min(point.z),
            ),
            max: Point3::new(
                self.max.x.max(point.x),
                self.max.y.max(point.y),
                self.max.z.max(point.z),
            ),
        }
    }

    /// Merges this AABB with another, returning the bounding box that encompasses both.
    pub fn merge(&self, other: &Aabb) -> Self {
        self.expand(other.min).expand(other.max)
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Returns the extents of the AABB along each axis.
    pub fn size(&self) -> (f32, f32, f32) {
        (
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }

    /// Largest of the three axis extents.
    pub fn largest_extent(&self) -> f32 {
        let (x, y, z) = self.size();
        x.max(y).max(z)
    }

    /// Radius of the sphere through the corners (half the diagonal).
    pub fn bounding_sphere_radius(&self) -> f32 {
        (self.max - self.min).magnitude() * 0.5
    }

    /// Tests if a point is inside the AABB (inclusive of boundaries).
    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Tests if this AABB intersects another AABB.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Slab test. Returns the entry distance along the ray, or 0.0 when the
    /// origin is inside the box.
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        let axes = [
            (ray.origin.x, ray.direction.x, self.min.x, self.max.x),
            (ray.origin.y, ray.direction.y, self.min.y, self.max.y),
            (ray.origin.z, ray.direction.z, self.min.z, self.max.z),
        ];

        for (origin, dir, min, max) in axes {
            if dir.abs() < EPSILON {
                if origin < min || origin > max {
                    return None;
                }
                continue;
            }

            let inv_dir = 1.0 / dir;
            let mut t1 = (min - origin) * inv_dir;
            let mut t2 = (max - origin) * inv_dir;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }

            tmin = tmin.max(t1);
            tmax = tmax.min(t2);
            if tmin > tmax {
                return None;
            }
        }

        if tmin >= 0.0 {
            Some(tmin)
        } else if tmax >= 0.0 {
            Some(0.0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    #[test]
    fn test_from_points_empty() {
        assert!(Aabb::from_points(Vec::new()).is_none());
    }

    #[test]
    fn test_from_points_bounds() {
        let aabb = Aabb::from_points(vec![
            Point3::new(1.0, -2.0, 0.5),
            Point3::new(-1.0, 3.0, 0.0),
            Point3::new(0.0, 0.0, 4.0),
        ])
        .unwrap();
        assert_eq!(aabb.min, Point3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 3.0, 4.0));
    }

    #[test]
    fn test_largest_extent() {
        let aabb = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 10.0, 4.0));
        assert_eq!(aabb.largest_extent(), 10.0);
    }

    #[test]
    fn test_from_center_size() {
        let aabb = Aabb::from_center_size(Point3::new(1.0, 1.0, 1.0), 2.0);
        assert_eq!(aabb.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(aabb.max, Point3::new(2.0, 2.0, 2.0));
        assert!(aabb.contains_point(Point3::new(2.0, 0.0, 1.0)));
        assert!(!aabb.contains_point(Point3::new(2.1, 0.0, 1.0)));
    }

    #[test]
    fn test_merge_and_intersects() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0));
        assert!(!a.intersects(&b));
        let merged = a.merge(&b);
        assert_eq!(merged.min, a.min);
        assert_eq!(merged.max, b.max);
        assert!(merged.intersects(&a));
    }

    #[test]
    fn test_ray_hits_box() {
        let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Point3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, -1.0));
        let t = aabb.intersects_ray(&ray).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_ray_inside_box() {
        let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(aabb.intersects_ray(&ray), Some(0.0));
    }

    #[test]
    fn test_ray_misses_box() {
        let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Point3::new(0.0, 5.0, 5.0), Vector3::new(0.0, 0.0, -1.0));
        assert!(aabb.intersects_ray(&ray).is_none());
    }
}
