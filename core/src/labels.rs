//! Screen-space label positions for saved regions.

use crate::camera::Camera;
use crate::common::RgbaColor;
use crate::occlusion::OcclusionTracker;
use crate::region::{Region, RegionId, Severity};
use crate::region_store::RegionStore;

/// Pixel / NDC differences below this are not reported as changes.
const POSITION_EPSILON: f32 = 1e-3;

/// Where to draw one region's label this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPosition {
    pub id: RegionId,
    /// Screen pixels, origin top-left.
    pub x: f32,
    pub y: f32,
    pub ndc_x: f32,
    pub ndc_y: f32,
    /// In view and not occluded.
    pub visible: bool,
    pub text: String,
    pub color: RgbaColor,
    pub severity: Severity,
}

impl LabelPosition {
    fn matches(&self, other: &LabelPosition) -> bool {
        self.id == other.id
            && self.visible == other.visible
            && self.text == other.text
            && self.color == other.color
            && self.severity == other.severity
            && (self.x - other.x).abs() < POSITION_EPSILON
            && (self.y - other.y).abs() < POSITION_EPSILON
            && (self.ndc_x - other.ndc_x).abs() < POSITION_EPSILON
            && (self.ndc_y - other.ndc_y).abs() < POSITION_EPSILON
    }
}

/// Result of a label refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelUpdate {
    Changed(Vec<LabelPosition>),
    NoUpdate,
}

/// Projects a region anchor. Behind the camera or outside the frustum is
/// not visible and gets zeroed coordinates.
pub fn project_label(
    region: &Region,
    camera: &Camera,
    viewport: (u32, u32),
    occlusion_visible: bool,
) -> LabelPosition {
    let clip = camera.project_point_clip(region.position);
    let ndc = (clip.w > 0.0).then(|| (clip.x / clip.w, clip.y / clip.w));
    let in_view = ndc.is_some_and(|(x, y)| (-1.0..=1.0).contains(&x) && (-1.0..=1.0).contains(&y));

    let (ndc_x, ndc_y, x, y) = match ndc {
        Some((ndc_x, ndc_y)) if in_view => {
            let x = (ndc_x + 1.0) * 0.5 * viewport.0 as f32;
            let y = (1.0 - ndc_y) * 0.5 * viewport.1 as f32;
            (ndc_x, ndc_y, x, y)
        }
        _ => (0.0, 0.0, 0.0, 0.0),
    };

    LabelPosition {
        id: region.id,
        x,
        y,
        ndc_x,
        ndc_y,
        visible: in_view && occlusion_visible,
        text: region.label.clone(),
        color: region.color(),
        severity: region.severity,
    }
}

/// Caches the last label list and reports only real changes.
#[derive(Debug)]
pub struct LabelProjector {
    previous: Vec<LabelPosition>,
    needs_update: bool,
}

impl Default for LabelProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelProjector {
    pub fn new() -> Self {
        Self {
            previous: Vec::new(),
            needs_update: true,
        }
    }

    /// Region, camera or occlusion state changed.
    pub fn mark_dirty(&mut self) {
        self.needs_update = true;
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Last reported list.
    pub fn current(&self) -> &[LabelPosition] {
        &self.previous
    }

    /// Forgets the cached list so the next refresh always reports.
    pub fn reset(&mut self) {
        self.previous.clear();
        self.needs_update = true;
    }

    /// Recomputes labels for every non-hidden region if anything is dirty.
    pub fn compute(
        &mut self,
        store: &RegionStore,
        camera: &Camera,
        viewport: (u32, u32),
        occlusion: &OcclusionTracker,
    ) -> LabelUpdate {
        if !self.needs_update {
            return LabelUpdate::NoUpdate;
        }
        self.needs_update = false;

        let labels: Vec<LabelPosition> = store
            .regions()
            .iter()
            .filter(|r| !store.is_hidden(r.id))
            .map(|r| project_label(r, camera, viewport, occlusion.is_visible(r.id)))
            .collect();

        let unchanged = labels.len() == self.previous.len()
            && labels.iter().zip(&self.previous).all(|(a, b)| a.matches(b));
        if unchanged {
            return LabelUpdate::NoUpdate;
        }
        self.previous = labels.clone();
        LabelUpdate::Changed(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal::DecalCatalog;
    use crate::occlusion::{BatchResult, OcclusionMode, QueryRequest};
    use crate::region_store::SaveRequest;
    use cgmath::{Point3, Vector3};

    const EPSILON: f32 = 1e-4;

    fn create_test_camera() -> Camera {
        Camera {
            eye: Point3::new(0.0, 0.0, 5.0),
            target: Point3::new(0.0, 0.0, 0.0),
            aspect: 1.0,
            ..Camera::default()
        }
    }

    fn create_test_store(positions: &[Point3<f32>]) -> (RegionStore, Vec<RegionId>) {
        let mut store = RegionStore::new(DecalCatalog::new());
        let ids = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                store.place_dynamic(*p, Vector3::unit_z());
                store.save_dynamic_as_region(SaveRequest::new(format!("Defect {i}"))).unwrap()
            })
            .collect();
        (store, ids)
    }

    fn changed(update: LabelUpdate) -> Vec<LabelPosition> {
        match update {
            LabelUpdate::Changed(labels) => labels,
            LabelUpdate::NoUpdate => panic!("expected a label update"),
        }
    }

    // ===== Projection =====

    #[test]
    fn test_center_projects_to_viewport_center() {
        let (store, _) = create_test_store(&[Point3::new(0.0, 0.0, 0.0)]);
        let label = project_label(&store.regions()[0], &create_test_camera(), (800, 600), true);
        assert!(label.visible);
        assert!((label.x - 400.0).abs() < EPSILON);
        assert!((label.y - 300.0).abs() < EPSILON);
        assert_eq!(label.text, "Defect 0");
    }

    #[test]
    fn test_behind_camera_is_hidden_and_zeroed() {
        let (store, _) = create_test_store(&[Point3::new(0.0, 0.0, 10.0)]);
        let label = project_label(&store.regions()[0], &create_test_camera(), (800, 600), true);
        assert!(!label.visible);
        assert_eq!((label.x, label.y, label.ndc_x, label.ndc_y), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_outside_frustum_is_hidden() {
        let (store, _) = create_test_store(&[Point3::new(50.0, 0.0, 0.0)]);
        let label = project_label(&store.regions()[0], &create_test_camera(), (800, 600), true);
        assert!(!label.visible);
        assert_eq!(label.x, 0.0);
    }

    #[test]
    fn test_occluded_label_keeps_position() {
        let (store, _) = create_test_store(&[Point3::new(0.5, 0.0, 0.0)]);
        let label = project_label(&store.regions()[0], &create_test_camera(), (800, 600), false);
        assert!(!label.visible);
        assert!(label.x > 400.0);
    }

    // ===== Change detection =====

    #[test]
    fn test_no_update_without_changes() {
        let (store, _) = create_test_store(&[Point3::new(0.0, 0.0, 0.0)]);
        let camera = create_test_camera();
        let occlusion = OcclusionTracker::new(OcclusionMode::Smooth, 3);
        let mut projector = LabelProjector::new();

        assert_eq!(changed(projector.compute(&store, &camera, (800, 600), &occlusion)).len(), 1);
        assert!(!projector.needs_update());
        // Not dirty.
        assert_eq!(projector.compute(&store, &camera, (800, 600), &occlusion), LabelUpdate::NoUpdate);
        // Dirty but identical.
        projector.mark_dirty();
        assert_eq!(projector.compute(&store, &camera, (800, 600), &occlusion), LabelUpdate::NoUpdate);
    }

    #[test]
    fn test_camera_move_reports_change() {
        let (store, _) = create_test_store(&[Point3::new(0.0, 0.0, 0.0)]);
        let mut camera = create_test_camera();
        let occlusion = OcclusionTracker::new(OcclusionMode::Smooth, 3);
        let mut projector = LabelProjector::new();
        projector.compute(&store, &camera, (800, 600), &occlusion);

        camera.eye.x += 1.0;
        camera.target.x += 1.0;
        projector.mark_dirty();
        let labels = changed(projector.compute(&store, &camera, (800, 600), &occlusion));
        assert!(labels[0].x < 400.0);
    }

    #[test]
    fn test_hidden_regions_excluded_and_count_change_reported() {
        let (mut store, ids) = create_test_store(&[Point3::new(0.0, 0.0, 0.0), Point3::new(0.2, 0.0, 0.0)]);
        let camera = create_test_camera();
        let occlusion = OcclusionTracker::new(OcclusionMode::Smooth, 3);
        let mut projector = LabelProjector::new();
        projector.compute(&store, &camera, (800, 600), &occlusion);

        store.set_hidden(ids[0], true);
        projector.mark_dirty();
        let labels = changed(projector.compute(&store, &camera, (800, 600), &occlusion));
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].id, ids[1]);
    }

    #[test]
    fn test_occlusion_flip_reports_change() {
        let (store, ids) = create_test_store(&[Point3::new(0.0, 0.0, 0.0)]);
        let camera = create_test_camera();
        let mut occlusion = OcclusionTracker::new(OcclusionMode::Smooth, 3);
        let mut projector = LabelProjector::new();
        projector.compute(&store, &camera, (800, 600), &occlusion);

        let request = QueryRequest { id: ids[0], position: store.regions()[0].position };
        let batch = occlusion.plan(&[request], 16).unwrap();
        assert!(occlusion.collect([BatchResult { batch: batch.batch, visible: Some(vec![false]) }]));
        projector.mark_dirty();
        let labels = changed(projector.compute(&store, &camera, (800, 600), &occlusion));
        assert!(!labels[0].visible);
    }
}
