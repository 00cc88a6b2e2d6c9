//! JSON export/import format for region annotations.
//!
//! ```json
//! { "version": 1, "exportedAt": "2024-05-01T12:00:00.000Z", "regions": [ ... ] }
//! ```
//!
//! Records keep enums as strings and most fields optional. A malformed region is
//! reported as [`ImportError::InvalidRegion`] with its index. The whole batch is
//! validated before any region is built.

use cgmath::{InnerSpace, Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::region::{CameraSnapshot, DecalKind, Region, RegionId, Severity, ShapeKind};

/// The only export format version this crate reads and writes.
pub const EXPORT_VERSION: u32 = 1;

/// Errors from [`RegionStore::import`](crate::region_store::RegionStore::import).
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unsupported export version {0} (expected {EXPORT_VERSION})")]
    UnsupportedVersion(u32),
    #[error("Invalid region at index {index}: {reason}")]
    InvalidRegion { index: usize, reason: String },
    #[error("Malformed region export: {0}")]
    Json(#[from] serde_json::Error),
}

/// `{x, y, z}` vector record.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vec3Record {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3Record {
    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Point3<f32>> for Vec3Record {
    fn from(p: Point3<f32>) -> Self {
        Self { x: p.x, y: p.y, z: p.z }
    }
}

impl From<Vector3<f32>> for Vec3Record {
    fn from(v: Vector3<f32>) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Record> for Point3<f32> {
    fn from(r: Vec3Record) -> Self {
        Point3::new(r.x, r.y, r.z)
    }
}

impl From<Vec3Record> for Vector3<f32> {
    fn from(r: Vec3Record) -> Self {
        Vector3::new(r.x, r.y, r.z)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSnapshotRecord {
    pub position: Vec3Record,
    pub target: Vec3Record,
}

/// One exported region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub position: Option<Vec3Record>,
    #[serde(default)]
    pub size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_kind: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defect_reference: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_snapshot: Option<CameraSnapshotRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_normal: Option<Vec3Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decal_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<serde_json::Value>,
}

impl RegionRecord {
    pub fn from_region(region: &Region) -> Self {
        Self {
            id: Some(region.id.to_string()),
            position: Some(region.position.into()),
            size: Some(region.size),
            shape_kind: Some(region.shape.as_str().to_string()),
            severity: Some(region.severity.as_str().to_string()),
            label: Some(region.label.clone()),
            notes: (!region.notes.is_empty()).then(|| region.notes.clone()),
            defect_reference: region.defect_reference.clone(),
            camera_snapshot: region.camera_snapshot.map(|snapshot| CameraSnapshotRecord {
                position: snapshot.position.into(),
                target: snapshot.target.into(),
            }),
            surface_normal: region.surface_normal.map(Into::into),
            decal_kind: (!region.decal_kind.is_none()).then(|| region.decal_kind.as_str().to_string()),
            evidence: region.evidence.clone(),
        }
    }

    /// Validates the record and builds a region with a fresh id and no decal.
    pub fn to_region(&self) -> Result<Region, String> {
        let label = self.label.as_deref().map(str::trim).unwrap_or_default();
        if label.is_empty() {
            return Err("label is empty".into());
        }

        let position = self.position.ok_or("position is missing")?;
        if !position.is_finite() {
            return Err("position is not finite".into());
        }

        let size = self.size.ok_or("size is missing")?;
        if !size.is_finite() || size <= 0.0 {
            return Err(format!("size {size} is not a positive number"));
        }

        let severity = self.severity.as_deref().ok_or("severity is missing")?;
        let severity = Severity::parse(severity).ok_or_else(|| format!("unknown severity '{severity}'"))?;

        let shape = match self.shape_kind.as_deref() {
            None => ShapeKind::default(),
            Some(shape) => ShapeKind::parse(shape).ok_or_else(|| format!("unknown shape '{shape}'"))?,
        };

        let surface_normal = match self.surface_normal {
            Some(normal) if !normal.is_finite() => return Err("surface normal is not finite".into()),
            Some(normal) => {
                let normal: Vector3<f32> = normal.into();
                (normal.magnitude2() > 0.0).then(|| normal.normalize())
            }
            None => None,
        };

        let camera_snapshot = match self.camera_snapshot {
            Some(snapshot) if !snapshot.position.is_finite() || !snapshot.target.is_finite() => {
                return Err("camera snapshot is not finite".into());
            }
            Some(snapshot) => Some(CameraSnapshot {
                position: snapshot.position.into(),
                target: snapshot.target.into(),
            }),
            None => None,
        };

        Ok(Region {
            id: RegionId::new(),
            position: position.into(),
            size,
            shape,
            severity,
            label: label.to_string(),
            notes: self.notes.clone().unwrap_or_default(),
            defect_reference: self.defect_reference.clone(),
            camera_snapshot,
            surface_normal,
            decal_kind: self.decal_kind.as_deref().map(DecalKind::named).unwrap_or_default(),
            evidence: self.evidence.clone(),
            decal: None,
        })
    }
}

/// Export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionExport {
    pub version: u32,
    #[serde(default)]
    pub exported_at: String,
    #[serde(default)]
    pub regions: Vec<RegionRecord>,
}

impl RegionExport {
    /// Snapshot of `regions` stamped with the current UTC time.
    pub fn from_regions<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            regions: regions.into_iter().map(RegionRecord::from_region).collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Validates every record. Fails on the first invalid one.
    pub fn to_regions(&self) -> Result<Vec<Region>, ImportError> {
        if self.version != EXPORT_VERSION {
            return Err(ImportError::UnsupportedVersion(self.version));
        }
        self.regions
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record
                    .to_region()
                    .map_err(|reason| ImportError::InvalidRegion { index, reason })
            })
            .collect()
    }
}
