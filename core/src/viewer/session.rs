//! Everything a viewer session owns apart from the GPU.
//!
//! [`Session`] holds the scene, the region store and the per-frame bookkeeping.
//! [`Viewer`](super::Viewer) drives it in the fixed frame order and mirrors the
//! results into the renderer, which keeps this half testable without a device.

use std::sync::Arc;
use std::time::Duration;

use web_time::Instant;

use crate::camera::Camera;
use crate::camera_controller::{CameraController, CameraSignal};
use crate::config::ViewerConfig;
use crate::decal::SurfaceTarget;
use crate::environment::Environment;
use crate::highlight::{pack_regions, HighlightStyle, HighlightUniform};
use crate::input::{InputEvent, MouseButton, PointerAction, PointerTracker};
use crate::labels::{LabelProjector, LabelUpdate};
use crate::loader::{
    Completed, CompletedEnvironment, CompletedMesh, EnvironmentLoadTicket, EnvironmentSource, LoadError, LoadQueue,
    MeshInfo, MeshLoadTicket, MeshSource,
};
use crate::mesh::{Model, SurfaceHit};
use crate::occlusion::{BatchResult, OcclusionMode, OcclusionTracker, QueryBatch, QueryRequest};
use crate::region::RegionId;
use crate::region_store::{RegionStore, SaveRequest};
use crate::scene_scale;

/// What the last [`Session::apply_completed_loads`] swapped in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AppliedLoads {
    pub mesh: bool,
    pub environment: bool,
}

pub(crate) struct Session {
    store: RegionStore,
    tracker: OcclusionTracker,
    labels: LabelProjector,
    controller: CameraController,
    camera: Camera,
    pointer: PointerTracker,
    highlight_style: HighlightStyle,
    default_region_fraction: f32,

    model: Option<Arc<Model>>,
    environment: Environment,
    bounding_size: f32,
    default_region_size: f32,
    viewport: (u32, u32),

    loads: LoadQueue,
    /// Region store structure the query map was last built for.
    query_structure: u64,
    /// Surface hit under the cursor from the last hover.
    last_hit: Option<SurfaceHit>,
    placement_mode: bool,
    frame: u64,
    disposed: bool,
}

impl Session {
    pub fn new(config: ViewerConfig, viewport: (u32, u32)) -> Self {
        let viewport = (viewport.0.max(1), viewport.1.max(1));
        let camera = Camera {
            aspect: viewport.0 as f32 / viewport.1 as f32,
            ..Camera::default()
        };
        let mut controller = CameraController::new(config.orbit, config.idle_delay);
        controller.sync_to_camera(&camera);

        let bounding_size = scene_scale::scene_bounding_size(None);
        let default_region_size = scene_scale::default_region_size(bounding_size, config.default_region_fraction);
        let mut store = RegionStore::new(config.decal_textures);
        store.set_placement_size(default_region_size);
        store.set_view_origin(camera.eye);

        Self {
            query_structure: store.structure_version(),
            store,
            tracker: OcclusionTracker::new(config.occlusion_mode, config.realtime_query_interval),
            labels: LabelProjector::new(),
            controller,
            camera,
            pointer: PointerTracker::new(),
            highlight_style: config.highlight,
            default_region_fraction: config.default_region_fraction,
            model: None,
            environment: Environment::neutral(),
            bounding_size,
            default_region_size,
            viewport,
            loads: LoadQueue::new(),
            last_hit: None,
            placement_mode: false,
            frame: 0,
            disposed: false,
        }
    }

    // ===== Accessors =====

    pub fn store(&self) -> &RegionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RegionStore {
        &mut self.store
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn bounding_size(&self) -> f32 {
        self.bounding_size
    }

    pub fn default_region_size(&self) -> f32 {
        self.default_region_size
    }

    pub fn occlusion(&self) -> &OcclusionTracker {
        &self.tracker
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn placement_mode(&self) -> bool {
        self.placement_mode
    }

    // ===== Loads =====

    pub fn load_mesh(&mut self, source: MeshSource) -> MeshLoadTicket {
        self.loads.start_mesh(source)
    }

    pub fn load_environment(&mut self, source: Option<EnvironmentSource>) -> EnvironmentLoadTicket {
        self.loads.start_environment(source)
    }

    /// Frame step 1: swaps in every load that finished since the last frame.
    pub fn apply_completed_loads(&mut self) -> AppliedLoads {
        let mut applied = AppliedLoads::default();
        while let Some(completed) = self.loads.try_next() {
            match completed {
                Completed::Mesh(mesh) => applied.mesh |= self.apply_mesh(mesh),
                Completed::Environment(environment) => applied.environment |= self.apply_environment(environment),
            }
        }
        applied
    }

    fn apply_mesh(&mut self, completed: CompletedMesh) -> bool {
        let CompletedMesh { token, result, reply } = completed;
        if self.disposed || token.is_cancelled() {
            log::debug!("Dropping cancelled mesh load");
            reply.send(Err(LoadError::Cancelled));
            return false;
        }
        match result {
            Ok(model) => {
                let info = MeshInfo::from_model(&model);
                self.swap_mesh(Arc::new(model));
                reply.send(Ok(info));
                true
            }
            Err(e) => {
                log::warn!("Keeping the current mesh: {e}");
                reply.send(Err(e));
                false
            }
        }
    }

    fn apply_environment(&mut self, completed: CompletedEnvironment) -> bool {
        let CompletedEnvironment { token, result, reply } = completed;
        if self.disposed || token.is_cancelled() {
            reply.send(false);
            return false;
        }
        let (environment, loaded) = match result {
            Ok(environment) => (environment, true),
            Err(LoadError::NoEnvironment) => (Environment::neutral(), false),
            Err(e) => {
                log::warn!("Using neutral lighting: {e}");
                (Environment::neutral(), false)
            }
        };
        log::info!("Environment swapped in (fallback: {})", environment.is_fallback);
        self.environment = environment;
        reply.send(loaded);
        true
    }

    /// Makes `model` the current mesh and rederives everything scaled by it.
    pub fn swap_mesh(&mut self, model: Arc<Model>) {
        let bounds = model.bounds();
        self.bounding_size = scene_scale::scene_bounding_size(bounds.as_ref());
        self.default_region_size = scene_scale::default_region_size(self.bounding_size, self.default_region_fraction);

        if let Some(bounds) = &bounds {
            self.camera.fit_to_bounds(bounds);
        }
        self.controller
            .set_model_radius(scene_scale::model_radius_from_bounds(bounds.as_ref()));
        self.controller.sync_to_camera(&self.camera);

        self.store.reset_view_state();
        self.store.set_placement_size(self.default_region_size);
        self.store.set_view_origin(self.camera.eye);
        self.store.set_surface(Some(Arc::clone(&model)));

        self.tracker.invalidate();
        self.rebuild_query_map();
        self.labels.reset();
        self.last_hit = None;
        self.model = Some(model);

        log::info!(
            "Mesh swapped in: bounding size {:.3}, default region size {:.3}",
            self.bounding_size,
            self.default_region_size
        );
    }

    // ===== Input & camera =====

    /// Applies host input. Returns the new surface size on a resize.
    pub fn handle_input(&mut self, event: &InputEvent, now: Instant) -> Option<(u32, u32)> {
        let mut resized = None;
        for action in self.pointer.process(event, now) {
            match action {
                PointerAction::Resize { size } => {
                    if size.0 > 0 && size.1 > 0 {
                        self.viewport = size;
                        self.camera.aspect = size.0 as f32 / size.1 as f32;
                        self.labels.mark_dirty();
                        resized = Some(size);
                    }
                }
                PointerAction::Hover { position } => self.hover(position),
                PointerAction::Leave => {
                    self.last_hit = None;
                    self.store.hide_dynamic();
                    self.store.set_hovered(None);
                }
                PointerAction::Orbit { delta } => self.controller.orbit(delta.0, delta.1),
                PointerAction::Pan { delta } => self.controller.pan(delta.0, delta.1),
                PointerAction::Zoom { steps } => self.controller.zoom(steps),
                PointerAction::Click {
                    button: MouseButton::Left,
                    position,
                } => {
                    let selected = self.pick(position).and_then(|hit| self.store.find_at_point(hit.point));
                    self.store.set_highlighted(selected);
                }
                PointerAction::Click { .. } => {}
            }
        }
        resized
    }

    fn pick(&self, position: (f32, f32)) -> Option<SurfaceHit> {
        let model = self.model.as_ref()?;
        let ray = self
            .camera
            .ray_through_screen(position.0, position.1, self.viewport.0, self.viewport.1)?;
        model.intersect_ray(&ray)
    }

    fn hover(&mut self, position: (f32, f32)) {
        let hit = self.pick(position);
        self.last_hit = hit;
        if self.placement_mode {
            match hit {
                Some(hit) => self.store.place_dynamic(hit.point, hit.normal),
                None => self.store.hide_dynamic(),
            }
        }
        let hovered = hit.and_then(|hit| self.store.find_at_point(hit.point));
        self.store.set_hovered(hovered);
    }

    /// While on, hovering the mesh moves the placement preview.
    pub fn set_placement_mode(&mut self, enabled: bool) {
        self.placement_mode = enabled;
        if !enabled {
            self.store.hide_dynamic();
        }
    }

    pub fn set_occlusion_mode(&mut self, mode: OcclusionMode) {
        self.tracker.set_mode(mode);
    }

    pub fn animate_camera_to(
        &mut self,
        position: cgmath::Point3<f32>,
        target: cgmath::Point3<f32>,
        duration: Duration,
        now: Instant,
    ) {
        self.controller.animate_to(position, target, duration, now);
    }

    /// Flies to the viewpoint saved with a region. False if it has none.
    pub fn focus_region(&mut self, id: RegionId, duration: Duration, now: Instant) -> bool {
        let Some(snapshot) = self.store.get(id).and_then(|r| r.camera_snapshot) else {
            return false;
        };
        self.controller
            .animate_to(snapshot.position, snapshot.target, duration, now);
        true
    }

    /// Frame step 2. Returns whether the camera counts as moving.
    pub fn update_camera(&mut self, now: Instant) -> bool {
        self.frame += 1;
        if let Some(signal) = self.controller.update(&mut self.camera, now) {
            if signal == CameraSignal::Moving {
                self.store.set_view_origin(self.camera.eye);
            }
            self.labels.mark_dirty();
        }
        self.controller.is_moving()
    }

    // ===== Regions =====

    /// Saves the placement preview, filling the camera snapshot and decal target
    /// from the current view when the request leaves them unset.
    pub fn save_region(&mut self, mut request: SaveRequest) -> Option<RegionId> {
        if request.camera_snapshot.is_none() {
            request.camera_snapshot = Some(self.camera.snapshot());
        }
        if request.target.is_none() {
            request.target = match (&self.last_hit, &self.model) {
                (Some(hit), _) => Some(SurfaceTarget::Part(hit.part)),
                (None, Some(_)) => Some(SurfaceTarget::Model),
                (None, None) => None,
            };
        }
        self.store.save_dynamic_as_region(request)
    }

    // ===== Highlight, occlusion, labels =====

    /// New highlight uniform contents if region state changed since the last call.
    pub fn take_highlight(&mut self) -> Option<HighlightUniform> {
        self.store
            .take_highlight_dirty()
            .then(|| pack_regions(&self.store, &self.highlight_style).uniform)
    }

    fn rebuild_query_map(&mut self) {
        self.tracker.rebuild(self.store.regions().iter().map(|r| r.id));
        self.query_structure = self.store.structure_version();
        self.labels.mark_dirty();
    }

    /// Frame step 4: the batch to record this frame, if throttling allows one.
    pub fn plan_occlusion(&mut self, capacity: usize) -> Option<QueryBatch> {
        if self.query_structure != self.store.structure_version() {
            self.rebuild_query_map();
        }
        if capacity == 0 || self.model.is_none() {
            return None;
        }
        if !self.tracker.queries_allowed(self.controller.is_moving(), self.frame) {
            return None;
        }
        let requests: Vec<QueryRequest> = self
            .store
            .regions()
            .iter()
            .filter(|r| !self.store.is_hidden(r.id))
            .map(|r| QueryRequest {
                id: r.id,
                position: r.position,
            })
            .collect();
        self.tracker.plan(&requests, capacity)
    }

    /// Folds ready results, then plans. A region whose answer just arrived is
    /// queried again in the same frame.
    pub fn refresh_occlusion(&mut self, ready: Vec<BatchResult>, capacity: usize) -> Option<QueryBatch> {
        self.collect_occlusion(ready);
        self.plan_occlusion(capacity)
    }

    /// Frees the regions of a batch that was planned but never recorded.
    pub fn abandon_batch(&mut self, batch: &QueryBatch) {
        self.tracker.collect([BatchResult {
            batch: batch.batch,
            visible: None,
        }]);
    }

    /// Frame step 6.
    pub fn collect_occlusion(&mut self, results: Vec<BatchResult>) {
        if self.tracker.collect(results) {
            self.labels.mark_dirty();
        }
    }

    /// Frame step 7.
    pub fn compute_labels(&mut self) -> LabelUpdate {
        if self.store.take_labels_dirty() {
            self.labels.mark_dirty();
        }
        self.labels
            .compute(&self.store, &self.camera, self.viewport, &self.tracker)
    }

    // ===== Teardown =====

    /// Cancels pending loads and drops the scene. Later completions are ignored.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.apply_completed_loads();
        self.loads.close();
        self.store.clear();
        self.store.set_surface(None);
        self.tracker.invalidate();
        self.labels.reset();
        self.model = None;
        log::info!("Viewer disposed");
    }
}
