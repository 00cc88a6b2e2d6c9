use std::time::Duration;

use cgmath::Point3;
use thiserror::Error;
use web_time::Instant;

use crate::{
    camera::Camera,
    config::ViewerConfig,
    environment::Environment,
    input::InputEvent,
    labels::{LabelPosition, LabelUpdate},
    loader::{EnvironmentLoadTicket, EnvironmentSource, MeshLoadTicket, MeshSource},
    occlusion::OcclusionMode,
    region::{DecalKind, Region, RegionId, Severity, ShapeKind},
    region_store::{RegionStore, SaveRequest},
    renderer::{RenderStatus, Renderer},
};

mod session;

use session::Session;

/// Receives the label list whenever it changes.
pub type FrameCallback = Box<dyn FnMut(&[LabelPosition])>;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("GPU initialization failed: {0:#}")]
    Gpu(anyhow::Error),
    #[error("Frame failed: {0:#}")]
    Render(anyhow::Error),
}

/// Outcome of [`Viewer::frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    /// The surface was unavailable this frame; try again next frame.
    Skipped,
    /// [`Viewer::dispose`] was called. Nothing happens any more.
    Disposed,
}

/// One viewer session: a mesh, a camera, the region annotations and the GPU state
/// that draws them.
///
/// The host calls [`Viewer::frame`] once per frame and forwards input through
/// [`Viewer::handle_input`]. Everything is single-threaded.
pub struct Viewer<'a> {
    /// `None` once disposed.
    renderer: Option<Renderer<'a>>,
    session: Session,
    frame_callback: Option<FrameCallback>,
}

impl<'a> Viewer<'a> {
    /// Create a new Viewer with the given surface target
    pub async fn new<T>(surface_target: T, width: u32, height: u32, config: ViewerConfig) -> Result<Self, ViewerError>
    where
        T: Into<wgpu::SurfaceTarget<'a>>,
    {
        let renderer = Renderer::new(surface_target, width, height, config.clear_color)
            .await
            .map_err(ViewerError::Gpu)?;
        let session = Session::new(config, (width, height));
        renderer.write_camera(session.camera());
        renderer.write_lighting(session.environment());

        Ok(Self {
            renderer: Some(renderer),
            session,
            frame_callback: None,
        })
    }

    /// Create a new Viewer from a winit Window
    /// The viewer size is automatically determined from the window's inner size
    #[cfg(feature = "winit-support")]
    pub async fn from_window(
        window: std::sync::Arc<winit::window::Window>,
        config: ViewerConfig,
    ) -> Result<Self, ViewerError> {
        let size = window.inner_size();
        Self::new(window, size.width, size.height, config).await
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Runs one frame: apply finished loads, update the camera, collect ready
    /// occlusion results, render while issuing the next queries, then refresh labels
    /// for the frame callback.
    pub fn frame(&mut self) -> Result<FrameStatus, ViewerError> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(FrameStatus::Disposed);
        };
        let now = Instant::now();

        let applied = self.session.apply_completed_loads();
        if applied.mesh {
            match self.session.model() {
                Some(model) => renderer.upload_model(model),
                None => renderer.clear_model(),
            }
        }
        if applied.environment {
            renderer.write_lighting(self.session.environment());
        }

        self.session.update_camera(now);
        renderer.write_camera(self.session.camera());
        if let Some(uniform) = self.session.take_highlight() {
            renderer.write_highlight(&uniform);
        }
        renderer.sync_decals(self.session.store().decals());

        // Read-backs that landed since the last frame free their regions for this batch.
        renderer.poll();
        let ready = renderer.collect_queries();
        let batch = self
            .session
            .refresh_occlusion(ready, renderer.occlusion_capacity());
        let status = match renderer.render(batch.as_ref()) {
            Ok(status) => status,
            Err(e) => {
                if let Some(batch) = &batch {
                    self.session.abandon_batch(batch);
                }
                return Err(ViewerError::Render(e));
            }
        };
        if let Some(batch) = &batch {
            if status != (RenderStatus::Rendered { queries_recorded: true }) {
                self.session.abandon_batch(batch);
            }
        }

        renderer.poll();
        self.session.collect_occlusion(renderer.collect_queries());

        if let Some(callback) = self.frame_callback.as_mut() {
            if let LabelUpdate::Changed(labels) = self.session.compute_labels() {
                callback(&labels);
            }
        }

        Ok(match status {
            RenderStatus::Rendered { .. } => FrameStatus::Rendered,
            RenderStatus::Skipped => FrameStatus::Skipped,
        })
    }

    /// Labels are pushed to `callback` from [`Viewer::frame`] whenever they change.
    pub fn set_frame_callback(&mut self, callback: impl FnMut(&[LabelPosition]) + 'static) {
        self.frame_callback = Some(Box::new(callback));
    }

    pub fn clear_frame_callback(&mut self) {
        self.frame_callback = None;
    }

    /// Pull alternative to the frame callback. `NoUpdate` unless something changed
    /// since the last refresh.
    pub fn get_label_positions(&mut self) -> LabelUpdate {
        self.session.compute_labels()
    }

    /// Cancels pending loads and releases every GPU resource. Later frames are no-ops.
    pub fn dispose(&mut self) {
        self.session.dispose();
        self.frame_callback = None;
        self.renderer = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.session.is_disposed()
    }

    // =========================================================================
    // Input
    // =========================================================================

    pub fn handle_input(&mut self, event: &InputEvent) {
        if let Some(size) = self.session.handle_input(event, Instant::now()) {
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.resize(size);
            }
        }
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Starts loading a mesh. The previous pending mesh load is cancelled.
    pub fn load_mesh(&mut self, source: MeshSource) -> MeshLoadTicket {
        self.session.load_mesh(source)
    }

    /// Starts loading an environment. `None` switches to neutral lighting.
    pub fn load_environment(&mut self, source: Option<EnvironmentSource>) -> EnvironmentLoadTicket {
        self.session.load_environment(source)
    }

    pub fn has_mesh(&self) -> bool {
        self.session.model().is_some()
    }

    pub fn environment(&self) -> &Environment {
        self.session.environment()
    }

    /// Largest axis extent of the current mesh.
    pub fn bounding_size(&self) -> f32 {
        self.session.bounding_size()
    }

    pub fn default_region_size(&self) -> f32 {
        self.session.default_region_size()
    }

    // =========================================================================
    // Regions
    // =========================================================================

    pub fn regions(&self) -> &[Region] {
        self.session.store().regions()
    }

    pub fn store(&self) -> &RegionStore {
        self.session.store()
    }

    pub fn store_mut(&mut self) -> &mut RegionStore {
        self.session.store_mut()
    }

    /// Saves the placement preview as a region. See [`RegionStore::save_dynamic_as_region`].
    pub fn save_region(&mut self, request: SaveRequest) -> Option<RegionId> {
        self.session.save_region(request)
    }

    pub fn set_placement_mode(&mut self, enabled: bool) {
        self.session.set_placement_mode(enabled);
    }

    pub fn placement_mode(&self) -> bool {
        self.session.placement_mode()
    }

    pub fn set_placement_severity(&mut self, severity: Severity) {
        self.session.store_mut().set_placement_severity(severity);
    }

    pub fn set_placement_shape(&mut self, shape: ShapeKind) {
        self.session.store_mut().set_placement_shape(shape);
    }

    pub fn set_placement_size(&mut self, size: f32) {
        self.session.store_mut().set_placement_size(size);
    }

    pub fn set_placement_decal(&mut self, kind: DecalKind) {
        self.session.store_mut().set_placement_decal(kind);
    }

    /// Last occlusion answer for a region. Regions without one count as visible.
    pub fn is_region_occluded(&self, id: RegionId) -> bool {
        !self.session.occlusion().is_visible(id)
    }

    pub fn set_highlighted(&mut self, id: Option<RegionId>) {
        self.session.store_mut().set_highlighted(id);
    }

    pub fn set_hovered(&mut self, id: Option<RegionId>) {
        self.session.store_mut().set_hovered(id);
    }

    // =========================================================================
    // Camera
    // =========================================================================

    pub fn camera(&self) -> &Camera {
        self.session.camera()
    }

    /// Smooth queries occlusion once the camera stops; realtime while it moves.
    pub fn set_occlusion_mode(&mut self, mode: OcclusionMode) {
        self.session.set_occlusion_mode(mode);
    }

    pub fn occlusion_mode(&self) -> OcclusionMode {
        self.session.occlusion().mode()
    }

    pub fn animate_camera_to(&mut self, position: Point3<f32>, target: Point3<f32>, duration: Duration) {
        self.session
            .animate_camera_to(position, target, duration, Instant::now());
    }

    /// Flies to the viewpoint saved with a region. False if it has none.
    pub fn focus_region(&mut self, id: RegionId, duration: Duration) -> bool {
        self.session.focus_region(id, duration, Instant::now())
    }
}
