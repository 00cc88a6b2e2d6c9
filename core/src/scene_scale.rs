//! Scale factors derived from the loaded mesh bounds.
//!
//! Orbit limits, pan speed and the default region size all follow the model so
//! inspection feels the same on a bolt and on a fuselage.

use crate::common::Aabb;

/// Radius used when there is no mesh or its bounds are degenerate.
const DEFAULT_MODEL_RADIUS: f32 = 1.0;

const MIN_MODEL_RADIUS: f32 = 1e-6;
const MAX_MODEL_RADIUS: f32 = 1e9;

/// Fraction of the scene bounding size used for new regions.
pub const DEFAULT_REGION_FRACTION: f32 = 0.05;

/// Bounding sphere radius of the mesh, clamped to sane limits.
pub fn model_radius_from_bounds(bounds: Option<&Aabb>) -> f32 {
    match bounds {
        Some(aabb) => {
            let radius = aabb.bounding_sphere_radius();
            if radius > 0.0 {
                radius.clamp(MIN_MODEL_RADIUS, MAX_MODEL_RADIUS)
            } else {
                DEFAULT_MODEL_RADIUS
            }
        }
        None => DEFAULT_MODEL_RADIUS,
    }
}

/// Largest axis extent of the mesh bounds. 0 without a mesh.
pub fn scene_bounding_size(bounds: Option<&Aabb>) -> f32 {
    bounds.map_or(0.0, Aabb::largest_extent)
}

/// Initial edge length / diameter for newly placed regions.
pub fn default_region_size(bounding_size: f32, fraction: f32) -> f32 {
    let size = bounding_size * fraction;
    if size.is_finite() && size > 0.0 {
        size
    } else {
        DEFAULT_MODEL_RADIUS * fraction
    }
}

/// Closest orbit distance: 1% of the model radius.
pub fn min_camera_radius(model_radius: f32) -> f32 {
    model_radius * 0.01
}

/// Farthest orbit distance: 100x the model radius.
pub fn max_camera_radius(model_radius: f32) -> f32 {
    model_radius * 100.0
}

/// Fraction of the current distance covered by one scroll step.
pub fn zoom_factor() -> f32 {
    0.1
}

/// World units per pixel of pan drag, before distance scaling.
pub fn pan_sensitivity(model_radius: f32) -> f32 {
    model_radius * 0.001
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point3;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_model_radius_from_bounds_none() {
        assert_eq!(model_radius_from_bounds(None), DEFAULT_MODEL_RADIUS);
    }

    #[test]
    fn test_model_radius_from_bounds_some() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let radius = model_radius_from_bounds(Some(&bounds));
        assert!((radius - bounds.bounding_sphere_radius()).abs() < 0.01);
    }

    #[test]
    fn test_model_radius_clamped() {
        let tiny = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1e-10, 1e-10, 1e-10));
        assert!(model_radius_from_bounds(Some(&tiny)) >= MIN_MODEL_RADIUS);
        let huge = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1e12, 1e12, 1e12));
        assert!(model_radius_from_bounds(Some(&huge)) <= MAX_MODEL_RADIUS);
    }

    #[test]
    fn test_default_region_size_is_five_percent() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 20.0, 1.0));
        let size = scene_bounding_size(Some(&bounds));
        assert!((size - 20.0).abs() < EPSILON);
        assert!((default_region_size(size, DEFAULT_REGION_FRACTION) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_default_region_size_without_mesh() {
        let size = default_region_size(scene_bounding_size(None), DEFAULT_REGION_FRACTION);
        assert!(size > 0.0);
    }

    #[test]
    fn test_scaling_factors() {
        let model_radius = 10.0;
        assert!((min_camera_radius(model_radius) - 0.1).abs() < 0.001);
        assert!((max_camera_radius(model_radius) - 1000.0).abs() < 0.1);
        assert!((pan_sensitivity(model_radius) - 0.01).abs() < 0.0001);
        assert_eq!(zoom_factor(), 0.1);
    }
}
