//! Region annotation data model.
//!
//! A [`Region`] marks a defect location on the loaded mesh with a cube, sphere or
//! point volume. Regions are owned by the [`RegionStore`](crate::region_store::RegionStore);
//! this module only defines the values and their containment math.

use std::fmt;

use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::RgbaColor;
use crate::decal::DecalHandle;

/// Opaque unique identifier for a region, generated on creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(Uuid);

impl RegionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Volume used for highlighting and hit testing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Cube,
    Sphere,
    /// Marker only; never highlighted and never hit by point queries.
    Point,
}

impl ShapeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Cube => "cube",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Point => "point",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cube" => Some(ShapeKind::Cube),
            "sphere" => Some(ShapeKind::Sphere),
            "point" => Some(ShapeKind::Point),
            _ => None,
        }
    }

    /// Index used by the highlight shader.
    pub(crate) fn shader_index(&self) -> f32 {
        match self {
            ShapeKind::Cube => 0.0,
            ShapeKind::Sphere => 1.0,
            ShapeKind::Point => 2.0,
        }
    }
}

/// Defect severity. Drives the highlight and label color.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    #[default]
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }

    /// Fixed palette color.
    pub fn color(&self) -> RgbaColor {
        match self {
            Severity::High => RgbaColor::rgb(1.0, 0.23, 0.19),
            Severity::Medium => RgbaColor::rgb(1.0, 0.58, 0.0),
            Severity::Low => RgbaColor::rgb(1.0, 0.8, 0.0),
        }
    }
}

/// Texture kind of a projected decal, or none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DecalKind {
    #[default]
    None,
    Named(String),
}

impl DecalKind {
    pub fn named(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        if kind.is_empty() || kind == "none" {
            DecalKind::None
        } else {
            DecalKind::Named(kind)
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DecalKind::None)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DecalKind::None => "none",
            DecalKind::Named(kind) => kind,
        }
    }
}

/// Saved camera viewpoint.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraSnapshot {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

/// A saved defect annotation.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub position: Point3<f32>,
    /// Cube edge length or sphere diameter. Always > 0.
    pub size: f32,
    pub shape: ShapeKind,
    pub severity: Severity,
    pub label: String,
    pub notes: String,
    /// Defect dictionary entry, round-tripped unchanged.
    pub defect_reference: Option<serde_json::Value>,
    pub camera_snapshot: Option<CameraSnapshot>,
    /// Unit surface normal at the anchor. Required to place a decal.
    pub surface_normal: Option<Vector3<f32>>,
    pub decal_kind: DecalKind,
    /// Evidence references (`{id, storage handle, mime type}`), never dereferenced here.
    pub evidence: Vec<serde_json::Value>,
    pub(crate) decal: Option<DecalHandle>,
}

impl Region {
    /// Decal currently projected for this region, if any.
    pub fn decal(&self) -> Option<DecalHandle> {
        self.decal
    }

    pub fn color(&self) -> RgbaColor {
        self.severity.color()
    }

    /// Point-in-volume test. Point regions contain nothing.
    pub fn contains(&self, point: Point3<f32>) -> bool {
        shape_contains(self.shape, self.position, self.size, point)
    }

    /// True when the region can carry a decal: it has a normal and a kind.
    pub(crate) fn wants_decal(&self) -> bool {
        self.surface_normal.is_some() && !self.decal_kind.is_none()
    }
}

/// Containment math shared with the highlight shader.
///
/// Cube: per-axis `|d| <= size / 2`. Sphere: `distance <= size / 2`.
pub fn shape_contains(shape: ShapeKind, center: Point3<f32>, size: f32, point: Point3<f32>) -> bool {
    let half = size * 0.5;
    match shape {
        ShapeKind::Cube => {
            let d = point - center;
            d.x.abs() <= half && d.y.abs() <= half && d.z.abs() <= half
        }
        ShapeKind::Sphere => point.distance(center) <= half,
        ShapeKind::Point => false,
    }
}

/// Field-wise patch for [`RegionStore::update`](crate::region_store::RegionStore::update).
///
/// `None` leaves a field untouched. Optional region fields use a nested option so
/// they can be cleared.
#[derive(Debug, Clone, Default)]
pub struct RegionPatch {
    pub position: Option<Point3<f32>>,
    pub size: Option<f32>,
    pub shape: Option<ShapeKind>,
    pub severity: Option<Severity>,
    pub label: Option<String>,
    pub notes: Option<String>,
    pub defect_reference: Option<Option<serde_json::Value>>,
    pub camera_snapshot: Option<Option<CameraSnapshot>>,
    pub surface_normal: Option<Option<Vector3<f32>>>,
    pub decal_kind: Option<DecalKind>,
    pub evidence: Option<Vec<serde_json::Value>>,
}

impl RegionPatch {
    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.size.is_none()
            && self.shape.is_none()
            && self.severity.is_none()
            && self.label.is_none()
            && self.notes.is_none()
            && self.defect_reference.is_none()
            && self.camera_snapshot.is_none()
            && self.surface_normal.is_none()
            && self.decal_kind.is_none()
            && self.evidence.is_none()
    }
}

/// The placement preview that follows the cursor over the mesh.
///
/// Not persisted. Visible only while the pointer hovers the mesh in placement mode.
#[derive(Debug, Clone)]
pub struct DynamicRegion {
    pub position: Point3<f32>,
    pub normal: Option<Vector3<f32>>,
    pub size: f32,
    pub shape: ShapeKind,
    pub severity: Severity,
    pub visible: bool,
}

impl Default for DynamicRegion {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 0.0),
            normal: None,
            size: 1.0,
            shape: ShapeKind::Cube,
            severity: Severity::Medium,
            visible: false,
        }
    }
}

impl DynamicRegion {
    pub fn color(&self) -> RgbaColor {
        self.severity.color()
    }

    /// Moves the preview to a surface hit and shows it.
    pub fn place(&mut self, position: Point3<f32>, normal: Vector3<f32>) {
        self.position = position;
        self.normal = (normal.magnitude2() > 0.0).then(|| normal.normalize());
        self.visible = true;
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }
}
