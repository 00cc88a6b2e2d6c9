//! Ordered collection of saved regions plus the placement preview.
//!
//! Every mutation completes its side effects (decal create/release, dirty flags)
//! before returning. The renderer and label projector poll the dirty flags once
//! per frame via [`RegionStore::take_highlight_dirty`] and
//! [`RegionStore::take_labels_dirty`].

use std::collections::HashSet;
use std::sync::Arc;

use cgmath::{Point3, Vector3};

use crate::decal::{DecalCatalog, DecalHandle, DecalProjector, SurfaceTarget};
use crate::exchange::{ImportError, RegionExport};
use crate::mesh::Model;
use crate::region::{
    CameraSnapshot, DecalKind, DynamicRegion, Region, RegionId, RegionPatch, Severity, ShapeKind,
};

/// Parameters for [`RegionStore::save_dynamic_as_region`].
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    /// Required; whitespace-only labels are rejected.
    pub label: String,
    /// Overrides the placement severity when set.
    pub severity: Option<Severity>,
    pub notes: String,
    pub defect_reference: Option<serde_json::Value>,
    pub camera_snapshot: Option<CameraSnapshot>,
    /// Overrides the placement decal kind when set.
    pub decal_kind: Option<DecalKind>,
    /// Surface the decal is projected onto. No decal is built without it.
    pub target: Option<SurfaceTarget>,
    pub evidence: Vec<serde_json::Value>,
}

impl SaveRequest {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }
}

pub struct RegionStore {
    regions: Vec<Region>,
    dynamic: DynamicRegion,
    placement_decal: DecalKind,
    hidden: HashSet<RegionId>,
    visible_default: bool,
    highlighted: Option<RegionId>,
    hovered: Option<RegionId>,
    decals: DecalProjector,
    highlight_dirty: bool,
    labels_dirty: bool,
    /// Bumped on add, delete, import and surface swap.
    structure_version: u64,
}

impl RegionStore {
    pub fn new(catalog: DecalCatalog) -> Self {
        Self {
            regions: Vec::new(),
            dynamic: DynamicRegion::default(),
            placement_decal: DecalKind::None,
            hidden: HashSet::new(),
            visible_default: true,
            highlighted: None,
            hovered: None,
            decals: DecalProjector::new(catalog),
            highlight_dirty: true,
            labels_dirty: true,
            structure_version: 0,
        }
    }

    // ===== Accessors =====

    /// Saved regions in insertion order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn dynamic(&self) -> &DynamicRegion {
        &self.dynamic
    }

    pub fn placement_decal(&self) -> &DecalKind {
        &self.placement_decal
    }

    pub fn is_hidden(&self, id: RegionId) -> bool {
        self.hidden.contains(&id)
    }

    pub fn hidden(&self) -> &HashSet<RegionId> {
        &self.hidden
    }

    pub fn visible_default(&self) -> bool {
        self.visible_default
    }

    pub fn highlighted(&self) -> Option<RegionId> {
        self.highlighted
    }

    pub fn hovered(&self) -> Option<RegionId> {
        self.hovered
    }

    pub fn decals(&self) -> &DecalProjector {
        &self.decals
    }

    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    /// Returns and clears the highlight-uniform dirty flag.
    pub fn take_highlight_dirty(&mut self) -> bool {
        std::mem::take(&mut self.highlight_dirty)
    }

    /// Returns and clears the label dirty flag.
    pub fn take_labels_dirty(&mut self) -> bool {
        std::mem::take(&mut self.labels_dirty)
    }

    fn index_of(&self, id: RegionId) -> Option<usize> {
        self.regions.iter().position(|r| r.id == id)
    }

    fn touch(&mut self) {
        self.highlight_dirty = true;
        self.labels_dirty = true;
    }

    fn touch_structure(&mut self) {
        self.touch();
        self.structure_version += 1;
    }

    // ===== Placement preview =====

    /// Moves the preview to a surface hit and shows it.
    pub fn place_dynamic(&mut self, position: Point3<f32>, normal: Vector3<f32>) {
        self.dynamic.place(position, normal);
        self.highlight_dirty = true;
    }

    pub fn hide_dynamic(&mut self) {
        if self.dynamic.visible {
            self.dynamic.hide();
            self.highlight_dirty = true;
        }
    }

    pub fn set_placement_severity(&mut self, severity: Severity) {
        self.dynamic.severity = severity;
        self.highlight_dirty = true;
    }

    pub fn set_placement_shape(&mut self, shape: ShapeKind) {
        self.dynamic.shape = shape;
        self.highlight_dirty = true;
    }

    /// Ignores non-positive or non-finite sizes.
    pub fn set_placement_size(&mut self, size: f32) {
        if size.is_finite() && size > 0.0 {
            self.dynamic.size = size;
            self.highlight_dirty = true;
        }
    }

    pub fn set_placement_decal(&mut self, kind: DecalKind) {
        self.placement_decal = kind;
    }

    // ===== Mutations =====

    /// Converts the visible placement preview into a saved region.
    ///
    /// Returns `None` when the preview is hidden or the label is blank.
    pub fn save_dynamic_as_region(&mut self, request: SaveRequest) -> Option<RegionId> {
        if !self.dynamic.visible {
            return None;
        }
        let label = request.label.trim();
        if label.is_empty() {
            return None;
        }

        let decal_kind = request.decal_kind.unwrap_or_else(|| self.placement_decal.clone());
        let normal = self.dynamic.normal;
        let decal = match (normal, request.target) {
            (Some(normal), Some(target)) => self.decals.create_decal(
                self.dynamic.position,
                normal,
                self.dynamic.size,
                &decal_kind,
                target,
            ),
            _ => None,
        };

        let region = Region {
            id: RegionId::new(),
            position: self.dynamic.position,
            size: self.dynamic.size,
            shape: self.dynamic.shape,
            severity: request.severity.unwrap_or(self.dynamic.severity),
            label: label.to_string(),
            notes: request.notes,
            defect_reference: request.defect_reference,
            camera_snapshot: request.camera_snapshot,
            surface_normal: normal,
            decal_kind,
            evidence: request.evidence,
            decal,
        };
        let id = region.id;
        log::info!("Saved region {id} '{}'", region.label);
        self.regions.push(region);
        self.touch_structure();
        Some(id)
    }

    /// Applies the present fields of `patch`. Returns false for an unknown id or an
    /// invalid size/position, in which case nothing changes.
    pub fn update(&mut self, id: RegionId, patch: RegionPatch) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        if patch.size.is_some_and(|s| !s.is_finite() || s <= 0.0) {
            return false;
        }
        if patch
            .position
            .is_some_and(|p| !p.x.is_finite() || !p.y.is_finite() || !p.z.is_finite())
        {
            return false;
        }

        let region = &mut self.regions[index];
        let size_changed = patch.size.is_some_and(|s| s != region.size);
        let kind_changed = patch.decal_kind.is_some();
        let normal_changed = patch.surface_normal.is_some();
        let moved = patch.position.is_some_and(|p| p != region.position);
        let had_decal = region.decal.is_some();

        if let Some(position) = patch.position {
            region.position = position;
        }
        if let Some(size) = patch.size {
            region.size = size;
        }
        if let Some(shape) = patch.shape {
            region.shape = shape;
        }
        if let Some(severity) = patch.severity {
            region.severity = severity;
        }
        if let Some(label) = patch.label {
            region.label = label;
        }
        if let Some(notes) = patch.notes {
            region.notes = notes;
        }
        if let Some(defect_reference) = patch.defect_reference {
            region.defect_reference = defect_reference;
        }
        if let Some(camera_snapshot) = patch.camera_snapshot {
            region.camera_snapshot = camera_snapshot;
        }
        if let Some(surface_normal) = patch.surface_normal {
            region.surface_normal = surface_normal;
        }
        if let Some(decal_kind) = patch.decal_kind {
            region.decal_kind = decal_kind;
        }
        if let Some(evidence) = patch.evidence {
            region.evidence = evidence;
        }

        let reshaped = size_changed || moved || normal_changed;
        if kind_changed || (reshaped && (had_decal || region.wants_decal())) {
            self.rebuild_decal(index);
        }
        self.touch();
        true
    }

    pub fn update_position(&mut self, id: RegionId, position: Point3<f32>) -> bool {
        self.update(
            id,
            RegionPatch {
                position: Some(position),
                ..Default::default()
            },
        )
    }

    /// Removes a region and releases its decal.
    pub fn delete(&mut self, id: RegionId) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let region = self.regions.remove(index);
        if let Some(handle) = region.decal {
            self.decals.release(handle);
        }
        self.hidden.remove(&id);
        if self.highlighted == Some(id) {
            self.highlighted = None;
        }
        if self.hovered == Some(id) {
            self.hovered = None;
        }
        log::info!("Deleted region {id}");
        self.touch_structure();
        true
    }

    pub fn set_hidden(&mut self, id: RegionId, hidden: bool) -> bool {
        if self.index_of(id).is_none() {
            return false;
        }
        let changed = if hidden {
            self.hidden.insert(id)
        } else {
            self.hidden.remove(&id)
        };
        if changed {
            self.touch();
        }
        true
    }

    /// Global show/hide for regions that are neither selected nor hovered.
    pub fn set_visible_default(&mut self, visible: bool) {
        if self.visible_default != visible {
            self.visible_default = visible;
            self.highlight_dirty = true;
        }
    }

    /// Selects a region. Unknown ids clear the selection.
    pub fn set_highlighted(&mut self, id: Option<RegionId>) {
        let id = id.filter(|id| self.index_of(*id).is_some());
        if self.highlighted != id {
            self.highlighted = id;
            self.highlight_dirty = true;
        }
    }

    /// Marks the region under the pointer. Unknown ids clear the hover.
    pub fn set_hovered(&mut self, id: Option<RegionId>) {
        let id = id.filter(|id| self.index_of(*id).is_some());
        if self.hovered != id {
            self.hovered = id;
            self.highlight_dirty = true;
        }
    }

    // ===== Queries =====

    /// First region in insertion order whose volume contains `point`.
    /// Hidden and point-shaped regions never match.
    pub fn find_at_point(&self, point: Point3<f32>) -> Option<RegionId> {
        self.regions
            .iter()
            .filter(|r| !self.hidden.contains(&r.id))
            .find(|r| r.contains(point))
            .map(|r| r.id)
    }

    // ===== Exchange =====

    pub fn export(&self) -> RegionExport {
        RegionExport::from_regions(&self.regions)
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        self.export().to_json()
    }

    /// Imports a batch. Validation covers every record first; on error nothing changes.
    ///
    /// Returns the number of imported regions.
    pub fn import(&mut self, data: &RegionExport, replace: bool) -> Result<usize, ImportError> {
        let mut imported = data.to_regions()?;

        if replace {
            self.clear();
        }
        if self.decals.has_model() {
            for region in imported.iter_mut().filter(|r| r.wants_decal()) {
                region.decal = self.create_region_decal(region);
            }
        }

        let count = imported.len();
        self.regions.extend(imported);
        log::info!("Imported {count} regions (replace: {replace})");
        self.touch_structure();
        Ok(count)
    }

    pub fn import_json(&mut self, json: &str, replace: bool) -> Result<usize, ImportError> {
        let data = RegionExport::from_json(json)?;
        self.import(&data, replace)
    }

    /// Removes every region and releases all decals.
    pub fn clear(&mut self) {
        for handle in self.regions.iter().filter_map(|r| r.decal) {
            self.decals.release(handle);
        }
        self.regions.clear();
        self.hidden.clear();
        self.highlighted = None;
        self.hovered = None;
        self.touch_structure();
    }

    // ===== Surface =====

    /// Camera eye used for decal recreation raycasts.
    pub fn set_view_origin(&mut self, origin: Point3<f32>) {
        self.decals.set_view_origin(origin);
    }

    /// Swaps the mesh regions are anchored to. All decals are rebuilt against it.
    pub fn set_surface(&mut self, model: Option<Arc<Model>>) {
        self.decals.set_model(model);
        for index in 0..self.regions.len() {
            self.regions[index].decal = None;
            if self.regions[index].wants_decal() {
                self.rebuild_decal(index);
            }
        }
        self.touch_structure();
    }

    /// Clears per-session view state: hidden set, selection, hover and preview.
    pub fn reset_view_state(&mut self) {
        self.hidden.clear();
        self.highlighted = None;
        self.hovered = None;
        self.dynamic.hide();
        self.touch();
    }

    fn create_region_decal(&mut self, region: &Region) -> Option<DecalHandle> {
        let normal = region.surface_normal?;
        self.decals
            .recreate(region.position, normal, region.size, &region.decal_kind)
    }

    /// Releases and, when the region still wants one, recreates its decal.
    fn rebuild_decal(&mut self, index: usize) {
        if let Some(handle) = self.regions[index].decal.take() {
            self.decals.release(handle);
        }
        if self.regions[index].wants_decal() && self.decals.has_model() {
            let region = self.regions[index].clone();
            self.regions[index].decal = self.create_region_decal(&region);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal::DecalTextureSource;
    use crate::mesh::MeshPart;

    fn create_test_store() -> RegionStore {
        let texture = Arc::new(image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 0, 255])));
        let catalog = DecalCatalog::new().with("crack", DecalTextureSource::Image(texture));
        let mut store = RegionStore::new(catalog);
        let model = Model::new(vec![MeshPart::cuboid(Point3::new(0.0, 0.0, 0.0), 10.0, 10.0, 10.0)], vec![]);
        store.set_surface(Some(Arc::new(model)));
        store.set_view_origin(Point3::new(0.0, 0.0, 30.0));
        store
    }

    fn save_at(store: &mut RegionStore, position: Point3<f32>, label: &str) -> RegionId {
        store.place_dynamic(position, Vector3::unit_z());
        store.save_dynamic_as_region(SaveRequest::new(label)).unwrap()
    }

    // ===== Save =====

    #[test]
    fn test_save_scratch_sphere() {
        let mut store = create_test_store();
        store.set_placement_shape(ShapeKind::Sphere);
        store.place_dynamic(Point3::new(0.0, 0.0, 5.0), Vector3::unit_z());

        let id = store
            .save_dynamic_as_region(SaveRequest {
                severity: Some(Severity::High),
                ..SaveRequest::new("Scratch")
            })
            .unwrap();

        assert_eq!(store.len(), 1);
        let region = store.get(id).unwrap();
        assert_eq!(region.label, "Scratch");
        assert_eq!(region.severity, Severity::High);
        assert_eq!(region.shape, ShapeKind::Sphere);
        assert_eq!(region.surface_normal, Some(Vector3::unit_z()));
    }

    #[test]
    fn test_save_rejects_blank_label() {
        let mut store = create_test_store();
        store.place_dynamic(Point3::new(0.0, 0.0, 5.0), Vector3::unit_z());
        assert!(store.save_dynamic_as_region(SaveRequest::new("   ")).is_none());
        assert!(store.save_dynamic_as_region(SaveRequest::new("")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_requires_visible_preview() {
        let mut store = create_test_store();
        assert!(store.save_dynamic_as_region(SaveRequest::new("Dent")).is_none());
        store.place_dynamic(Point3::new(0.0, 0.0, 5.0), Vector3::unit_z());
        store.hide_dynamic();
        assert!(store.save_dynamic_as_region(SaveRequest::new("Dent")).is_none());
    }

    #[test]
    fn test_save_with_decal() {
        let mut store = create_test_store();
        store.place_dynamic(Point3::new(0.0, 0.0, 5.0), Vector3::unit_z());
        let id = store
            .save_dynamic_as_region(SaveRequest {
                decal_kind: Some(DecalKind::named("crack")),
                target: Some(SurfaceTarget::Model),
                ..SaveRequest::new("Crack")
            })
            .unwrap();
        assert!(store.get(id).unwrap().decal().is_some());
        assert_eq!(store.decals().live_count(), 1);
    }

    // ===== Update / delete =====

    #[test]
    fn test_update_applies_present_fields() {
        let mut store = create_test_store();
        let id = save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "Dent");

        assert!(store.update(
            id,
            RegionPatch {
                notes: Some("deep".into()),
                severity: Some(Severity::Low),
                ..Default::default()
            }
        ));
        let region = store.get(id).unwrap();
        assert_eq!(region.notes, "deep");
        assert_eq!(region.severity, Severity::Low);
        assert_eq!(region.label, "Dent");
    }

    #[test]
    fn test_update_unknown_or_invalid() {
        let mut store = create_test_store();
        let id = save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "Dent");
        assert!(!store.update(RegionId::new(), RegionPatch::default()));
        assert!(!store.update(id, RegionPatch { size: Some(-1.0), ..Default::default() }));
        assert!(!store.update_position(RegionId::new(), Point3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_decal_kind_change_recomputes() {
        let mut store = create_test_store();
        let id = save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "Dent");
        assert!(store.get(id).unwrap().decal().is_none());

        store.update(id, RegionPatch { decal_kind: Some(DecalKind::named("crack")), ..Default::default() });
        let first = store.get(id).unwrap().decal().unwrap();

        store.update(id, RegionPatch { size: Some(2.0), ..Default::default() });
        let second = store.get(id).unwrap().decal().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.decals().live_count(), 1);

        store.update(id, RegionPatch { decal_kind: Some(DecalKind::None), ..Default::default() });
        assert!(store.get(id).unwrap().decal().is_none());
        assert_eq!(store.decals().live_count(), 0);
    }

    #[test]
    fn test_clearing_normal_releases_decal() {
        let mut store = create_test_store();
        store.place_dynamic(Point3::new(0.0, 0.0, 5.0), Vector3::unit_z());
        let id = store
            .save_dynamic_as_region(SaveRequest {
                decal_kind: Some(DecalKind::named("crack")),
                target: Some(SurfaceTarget::Model),
                ..SaveRequest::new("Crack")
            })
            .unwrap();
        assert_eq!(store.decals().live_count(), 1);

        assert!(store.update(id, RegionPatch { surface_normal: Some(None), ..Default::default() }));
        let region = store.get(id).unwrap();
        assert_eq!(region.surface_normal, None);
        assert!(region.decal().is_none());
        assert_eq!(store.decals().live_count(), 0);
    }

    #[test]
    fn test_new_normal_rebuilds_decal() {
        let mut store = create_test_store();
        let id = save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "Crack");
        store.update(id, RegionPatch { decal_kind: Some(DecalKind::named("crack")), ..Default::default() });
        let first = store.get(id).unwrap().decal().unwrap();

        let tilted = Vector3::new(0.0, 0.6, 0.8);
        assert!(store.update(id, RegionPatch { surface_normal: Some(Some(tilted)), ..Default::default() }));
        let region = store.get(id).unwrap();
        assert_eq!(region.surface_normal, Some(tilted));
        let second = region.decal().unwrap();
        assert_ne!(first, second);
        assert_eq!(store.decals().live_count(), 1);
    }

    #[test]
    fn test_delete_releases_decal() {
        let mut store = create_test_store();
        store.place_dynamic(Point3::new(0.0, 0.0, 5.0), Vector3::unit_z());
        let id = store
            .save_dynamic_as_region(SaveRequest {
                decal_kind: Some(DecalKind::named("crack")),
                target: Some(SurfaceTarget::Model),
                ..SaveRequest::new("Crack")
            })
            .unwrap();
        store.set_highlighted(Some(id));

        assert!(store.delete(id));
        assert!(store.get(id).is_none());
        assert_eq!(store.decals().live_count(), 0);
        assert_eq!(store.highlighted(), None);
        assert!(!store.delete(id));
    }

    // ===== Visibility state =====

    #[test]
    fn test_set_hidden_unknown_id() {
        let mut store = create_test_store();
        assert!(!store.set_hidden(RegionId::new(), true));
    }

    #[test]
    fn test_dirty_flags() {
        let mut store = create_test_store();
        store.take_highlight_dirty();
        store.take_labels_dirty();

        let id = save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "Dent");
        assert!(store.take_highlight_dirty());
        assert!(store.take_labels_dirty());
        assert!(!store.take_labels_dirty());

        store.set_hovered(Some(id));
        assert!(store.take_highlight_dirty());
        assert!(!store.take_labels_dirty());
    }

    // ===== find_at_point =====

    #[test]
    fn test_find_at_point_first_match_wins() {
        let mut store = create_test_store();
        store.set_placement_size(2.0);
        let first = save_at(&mut store, Point3::new(0.0, 0.0, 0.0), "A");
        let second = save_at(&mut store, Point3::new(0.5, 0.0, 0.0), "B");

        assert_eq!(store.find_at_point(Point3::new(0.6, 0.0, 0.0)), Some(first));
        assert_eq!(store.find_at_point(Point3::new(1.4, 0.0, 0.0)), Some(second));
        assert_eq!(store.find_at_point(Point3::new(3.0, 0.0, 0.0)), None);

        store.set_hidden(first, true);
        assert_eq!(store.find_at_point(Point3::new(0.6, 0.0, 0.0)), Some(second));
    }

    #[test]
    fn test_find_at_point_skips_point_shape() {
        let mut store = create_test_store();
        store.set_placement_shape(ShapeKind::Point);
        save_at(&mut store, Point3::new(0.0, 0.0, 0.0), "Marker");
        assert_eq!(store.find_at_point(Point3::new(0.0, 0.0, 0.0)), None);
    }

    // ===== Import / export =====

    fn save_detailed(store: &mut RegionStore, position: Point3<f32>, label: &str) -> RegionId {
        store.place_dynamic(position, Vector3::unit_z());
        store
            .save_dynamic_as_region(SaveRequest {
                severity: Some(Severity::High),
                notes: format!("{label} notes"),
                defect_reference: Some(serde_json::json!({"code": label})),
                camera_snapshot: Some(CameraSnapshot {
                    position: Point3::new(position.x, 3.0, 20.0),
                    target: position,
                }),
                decal_kind: Some(DecalKind::named("crack")),
                target: Some(SurfaceTarget::Model),
                evidence: vec![
                    serde_json::json!({"id": format!("{label}-1"), "mimeType": "image/png"}),
                    serde_json::json!({"id": format!("{label}-2"), "mimeType": "image/jpeg"}),
                ],
                ..SaveRequest::new(label)
            })
            .unwrap()
    }

    #[test]
    fn test_replace_import_three_into_two() {
        let mut source = create_test_store();
        source.set_placement_shape(ShapeKind::Sphere);
        for (i, label) in ["A", "B", "C"].iter().enumerate() {
            save_detailed(&mut source, Point3::new(i as f32, 0.0, 5.0), label);
        }
        let export = source.export();

        let mut store = create_test_store();
        let old_a = save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "old-a");
        let old_b = save_at(&mut store, Point3::new(1.0, 0.0, 5.0), "old-b");

        assert_eq!(store.import(&export, true).unwrap(), 3);
        assert_eq!(store.len(), 3);
        for (imported, original) in store.regions().iter().zip(source.regions()) {
            assert_ne!(imported.id, old_a);
            assert_ne!(imported.id, old_b);
            assert_ne!(imported.id, original.id);

            assert_eq!(imported.position, original.position);
            assert_eq!(imported.size, original.size);
            assert_eq!(imported.shape, original.shape);
            assert_eq!(imported.severity, original.severity);
            assert_eq!(imported.label, original.label);
            assert_eq!(imported.notes, original.notes);
            assert_eq!(imported.defect_reference, original.defect_reference);
            assert_eq!(imported.camera_snapshot, original.camera_snapshot);
            assert_eq!(imported.surface_normal, original.surface_normal);
            assert_eq!(imported.decal_kind, original.decal_kind);
            assert_eq!(imported.evidence, original.evidence);
            assert!(imported.decal().is_some());
        }
        assert_eq!(store.decals().live_count(), 3);
    }

    #[test]
    fn test_import_append() {
        let mut store = create_test_store();
        save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "A");
        let export = store.export();
        assert_eq!(store.import(&export, false).unwrap(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_import_wrong_version_no_mutation() {
        let mut store = create_test_store();
        let id = save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "A");
        let mut export = store.export();
        export.version = 2;

        assert!(matches!(store.import(&export, true), Err(ImportError::UnsupportedVersion(2))));
        assert_eq!(store.len(), 1);
        assert!(store.get(id).is_some());
    }

    #[test]
    fn test_import_invalid_region_no_mutation() {
        let mut store = create_test_store();
        save_at(&mut store, Point3::new(0.0, 0.0, 5.0), "A");
        let json = r#"{"version": 1, "regions": [
            {"position": {"x": 0, "y": 0, "z": 0}, "size": 1, "severity": "low", "label": "ok"},
            {"position": {"x": 0, "y": 0, "z": 0}, "size": 1, "severity": "low", "label": ""}
        ]}"#;
        assert!(store.import_json(json, true).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.regions()[0].label, "A");
    }

    #[test]
    fn test_import_recreates_decals() {
        let mut store = create_test_store();
        let json = r#"{"version": 1, "regions": [
            {"position": {"x": 0, "y": 0, "z": 5}, "size": 1, "severity": "high", "label": "Crack",
             "surfaceNormal": {"x": 0, "y": 0, "z": 1}, "decalKind": "crack"}
        ]}"#;
        store.import_json(json, false).unwrap();
        assert!(store.regions()[0].decal().is_some());
    }

    // ===== Surface swap =====

    #[test]
    fn test_set_surface_rebuilds_decals() {
        let mut store = create_test_store();
        store.place_dynamic(Point3::new(0.0, 0.0, 5.0), Vector3::unit_z());
        let id = store
            .save_dynamic_as_region(SaveRequest {
                decal_kind: Some(DecalKind::named("crack")),
                target: Some(SurfaceTarget::Model),
                ..SaveRequest::new("Crack")
            })
            .unwrap();

        store.set_surface(None);
        assert!(store.get(id).unwrap().decal().is_none());
        assert_eq!(store.decals().live_count(), 0);

        let model = Model::new(vec![MeshPart::cuboid(Point3::new(0.0, 0.0, 0.0), 10.0, 10.0, 10.0)], vec![]);
        store.set_surface(Some(Arc::new(model)));
        assert!(store.get(id).unwrap().decal().is_some());
        assert_eq!(store.decals().live_count(), 1);
    }
}
