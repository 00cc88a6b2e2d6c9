//! 3D viewer engine for marking and reviewing surface defects on a loaded mesh.
//!
//! A [`Viewer`] owns one mesh, one camera and an ordered set of [`Region`]
//! annotations. Regions are drawn as shader highlights and projected decals;
//! their labels are projected to screen space each frame with GPU occlusion
//! visibility.

pub mod camera;
pub mod camera_controller;
pub mod config;
pub mod decal;
pub mod environment;
pub mod exchange;
pub mod gltf;
pub mod highlight;
pub mod input;
pub mod labels;
pub mod loader;
pub mod mesh;
pub mod occlusion;
pub mod region;
pub mod region_store;
mod renderer;
pub mod scene_scale;
mod shaders;
mod viewer;

pub use defect_viewer_common as common;

// Winit support - only available when winit is a dependency
#[cfg(feature = "winit-support")]
pub mod winit_support;

pub use camera::Camera;
pub use config::ViewerConfig;
pub use environment::Environment;
pub use exchange::{ImportError, RegionExport};
pub use labels::{LabelPosition, LabelUpdate};
pub use loader::{EnvironmentSource, LoadError, LoadPhase, MeshInfo, MeshSource};
pub use mesh::Model;
pub use occlusion::OcclusionMode;
pub use region::{Region, RegionId, RegionPatch, Severity, ShapeKind};
pub use region_store::{RegionStore, SaveRequest};
pub use renderer::DEPTH_FORMAT;
pub use viewer::{FrameCallback, FrameStatus, Viewer, ViewerError};
