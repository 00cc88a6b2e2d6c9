//! Region highlight uniform packing.
//!
//! The fragment stage of every decorated material tests its world position
//! against the dynamic preview and up to [`MAX_HIGHLIGHT_REGIONS`] saved regions,
//! blending toward each region's severity color. This module builds that uniform.

use std::collections::HashMap;

use crate::region::{Region, RegionId, ShapeKind};
use crate::region_store::RegionStore;

/// Maximum number of saved regions packed for shader highlighting.
pub const MAX_HIGHLIGHT_REGIONS: usize = 100;

/// Blend strengths toward the severity color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightStyle {
    pub selected_strength: f32,
    /// Additive glow on top of the selected blend.
    pub selected_glow: f32,
    pub hovered_strength: f32,
    pub base_strength: f32,
    pub dynamic_strength: f32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            selected_strength: 0.6,
            selected_glow: 0.15,
            hovered_strength: 0.4,
            base_strength: 0.2,
            dynamic_strength: 0.35,
        }
    }
}

/// One highlight volume.
///
/// # Memory Layout (48 bytes)
///
/// | Offset | Size | Field         | Notes                                  |
/// |--------|------|---------------|----------------------------------------|
/// | 0      | 16   | position_size | xyz center, w size                     |
/// | 16     | 16   | color         | severity RGBA                          |
/// | 32     | 16   | params        | shape index, strength, glow, active    |
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RegionSlot {
    pub position_size: [f32; 4],
    pub color: [f32; 4],
    pub params: [f32; 4],
}

impl RegionSlot {
    fn new(region: &Region, strength: f32, glow: f32) -> Self {
        Self {
            position_size: [region.position.x, region.position.y, region.position.z, region.size],
            color: region.color().to_array(),
            params: [region.shape.shader_index(), strength, glow, 1.0],
        }
    }

    pub fn is_active(&self) -> bool {
        self.params[3] > 0.5
    }

    pub fn strength(&self) -> f32 {
        self.params[1]
    }

    pub fn glow(&self) -> f32 {
        self.params[2]
    }
}

/// Uniform consumed by the `region_highlight` shader feature.
///
/// # Memory Layout (4864 bytes)
///
/// | Offset | Size     | Field    |
/// |--------|----------|----------|
/// | 0      | 48       | dynamic  |
/// | 48     | 4        | count    |
/// | 52     | 12       | _padding |
/// | 64     | 48 * 100 | slots    |
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct HighlightUniform {
    pub dynamic: RegionSlot,
    pub count: u32,
    _padding: [u32; 3],
    pub slots: [RegionSlot; MAX_HIGHLIGHT_REGIONS],
}

impl Default for HighlightUniform {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// Result of packing: the uniform plus the slot of every packed region.
#[derive(Debug, Clone, Default)]
pub struct HighlightPacking {
    pub uniform: HighlightUniform,
    index_of: HashMap<RegionId, usize>,
    /// Eligible regions left out because every slot was taken.
    overflow: usize,
}

impl HighlightPacking {
    /// Shader slot of a region, if it was packed.
    pub fn packed_index_of(&self, id: RegionId) -> Option<usize> {
        self.index_of.get(&id).copied()
    }

    pub fn packed_count(&self) -> usize {
        self.uniform.count as usize
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow
    }
}

/// Packs the store's current state into a highlight uniform.
///
/// A region is packed when it is not hidden and is either shown by default or
/// selected/hovered. Point regions are never packed. Eligible regions past the
/// cap are only counted.
pub fn pack_regions(store: &RegionStore, style: &HighlightStyle) -> HighlightPacking {
    let mut packing = HighlightPacking::default();

    let dynamic = store.dynamic();
    if dynamic.visible && dynamic.shape != ShapeKind::Point {
        packing.uniform.dynamic = RegionSlot {
            position_size: [dynamic.position.x, dynamic.position.y, dynamic.position.z, dynamic.size],
            color: dynamic.color().to_array(),
            params: [dynamic.shape.shader_index(), style.dynamic_strength, 0.0, 1.0],
        };
    }

    let mut count = 0;
    for region in store.regions() {
        if region.shape == ShapeKind::Point || store.is_hidden(region.id) {
            continue;
        }
        let selected = store.highlighted() == Some(region.id);
        let hovered = store.hovered() == Some(region.id);
        if !store.visible_default() && !selected && !hovered {
            continue;
        }
        if count == MAX_HIGHLIGHT_REGIONS {
            packing.overflow += 1;
            continue;
        }

        let slot = if selected {
            RegionSlot::new(region, style.selected_strength, style.selected_glow)
        } else if hovered {
            RegionSlot::new(region, style.hovered_strength, 0.0)
        } else {
            RegionSlot::new(region, style.base_strength, 0.0)
        };
        packing.uniform.slots[count] = slot;
        packing.index_of.insert(region.id, count);
        count += 1;
    }
    packing.uniform.count = count as u32;
    if packing.overflow > 0 {
        log::debug!(
            "Highlight capacity reached; {} regions not GPU-highlighted",
            packing.overflow
        );
    }
    packing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decal::DecalCatalog;
    use crate::region_store::SaveRequest;
    use cgmath::{Point3, Vector3};

    const EPSILON: f32 = 1e-6;

    fn create_test_store(count: usize) -> (RegionStore, Vec<RegionId>) {
        let mut store = RegionStore::new(DecalCatalog::new());
        let ids = (0..count)
            .map(|i| {
                store.place_dynamic(Point3::new(i as f32, 0.0, 0.0), Vector3::unit_y());
                store.save_dynamic_as_region(SaveRequest::new(format!("R{i}"))).unwrap()
            })
            .collect();
        store.hide_dynamic();
        (store, ids)
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<RegionSlot>(), 48);
        assert_eq!(std::mem::offset_of!(HighlightUniform, count), 48);
        assert_eq!(std::mem::offset_of!(HighlightUniform, slots), 64);
        assert_eq!(std::mem::size_of::<HighlightUniform>(), 64 + 48 * MAX_HIGHLIGHT_REGIONS);
    }

    #[test]
    fn test_packs_all_visible() {
        let (store, ids) = create_test_store(3);
        let packing = pack_regions(&store, &HighlightStyle::default());
        assert_eq!(packing.packed_count(), 3);
        assert_eq!(packing.packed_index_of(ids[2]), Some(2));
        assert!(!packing.uniform.dynamic.is_active());
    }

    #[test]
    fn test_hidden_regions_skipped() {
        let (mut store, ids) = create_test_store(3);
        store.set_hidden(ids[1], true);
        let packing = pack_regions(&store, &HighlightStyle::default());
        assert_eq!(packing.packed_count(), 2);
        assert_eq!(packing.packed_index_of(ids[1]), None);
        assert_eq!(packing.packed_index_of(ids[2]), Some(1));
    }

    #[test]
    fn test_visible_default_off_keeps_selected_and_hovered() {
        let (mut store, ids) = create_test_store(3);
        store.set_visible_default(false);
        store.set_highlighted(Some(ids[0]));
        store.set_hovered(Some(ids[2]));

        let style = HighlightStyle::default();
        let packing = pack_regions(&store, &style);
        assert_eq!(packing.packed_count(), 2);

        let selected = packing.uniform.slots[packing.packed_index_of(ids[0]).unwrap()];
        assert!((selected.strength() - style.selected_strength).abs() < EPSILON);
        assert!((selected.glow() - style.selected_glow).abs() < EPSILON);

        let hovered = packing.uniform.slots[packing.packed_index_of(ids[2]).unwrap()];
        assert!((hovered.strength() - style.hovered_strength).abs() < EPSILON);
    }

    #[test]
    fn test_point_regions_never_packed() {
        let mut store = RegionStore::new(DecalCatalog::new());
        store.set_placement_shape(ShapeKind::Point);
        store.place_dynamic(Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
        let id = store.save_dynamic_as_region(SaveRequest::new("Marker")).unwrap();

        let packing = pack_regions(&store, &HighlightStyle::default());
        assert_eq!(packing.packed_count(), 0);
        assert_eq!(packing.packed_index_of(id), None);
        // The point-shaped preview is not highlighted either.
        assert!(!packing.uniform.dynamic.is_active());
    }

    #[test]
    fn test_capacity_cap() {
        let (store, ids) = create_test_store(MAX_HIGHLIGHT_REGIONS + 5);
        let packing = pack_regions(&store, &HighlightStyle::default());
        assert_eq!(packing.packed_count(), MAX_HIGHLIGHT_REGIONS);
        assert_eq!(packing.packed_index_of(ids[MAX_HIGHLIGHT_REGIONS]), None);
        assert_eq!(packing.overflow_count(), 5);
    }

    #[test]
    fn test_skipped_regions_do_not_count_against_cap() {
        let (mut store, ids) = create_test_store(MAX_HIGHLIGHT_REGIONS + 5);
        for &id in &ids[..5] {
            store.set_hidden(id, true);
        }
        let packing = pack_regions(&store, &HighlightStyle::default());
        assert_eq!(packing.packed_count(), MAX_HIGHLIGHT_REGIONS);
        assert_eq!(packing.overflow_count(), 0);
        assert_eq!(packing.packed_index_of(ids[MAX_HIGHLIGHT_REGIONS + 4]), Some(MAX_HIGHLIGHT_REGIONS - 1));
    }

    #[test]
    fn test_dynamic_slot() {
        let (mut store, _) = create_test_store(0);
        store.place_dynamic(Point3::new(1.0, 2.0, 3.0), Vector3::unit_y());
        let style = HighlightStyle::default();
        let packing = pack_regions(&store, &style);
        let dynamic = packing.uniform.dynamic;
        assert!(dynamic.is_active());
        assert_eq!(dynamic.position_size[..3], [1.0, 2.0, 3.0]);
        assert!((dynamic.strength() - style.dynamic_strength).abs() < EPSILON);
    }
}
