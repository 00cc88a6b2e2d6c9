use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use defect_viewer::{
    loader::{EnvironmentSource, MeshSource},
    winit_support::convert_window_event,
    FrameStatus, LabelPosition, OcclusionMode, SaveRequest, Severity, ShapeKind, Viewer, ViewerConfig,
};

const FOCUS_DURATION: Duration = Duration::from_millis(600);

/// Files named on the command line.
#[derive(Debug, Default)]
pub struct StartupFiles {
    pub mesh: Option<PathBuf>,
    pub regions: Option<PathBuf>,
    pub environment: Option<PathBuf>,
}

/// Keyboard commands. Everything else goes to the viewer.
enum Command {
    TogglePlacement,
    SaveRegion,
    CycleSeverity,
    CycleShape,
    DeleteHighlighted,
    FocusHighlighted,
    ToggleOcclusionMode,
    ExportRegions,
    Exit,
}

pub struct App<'a> {
    viewer: Option<Viewer<'a>>,
    window: Option<Arc<Window>>,
    files: StartupFiles,
    saved: usize,
}

impl<'a> App<'a> {
    pub fn new(files: StartupFiles) -> Self {
        Self {
            viewer: None,
            window: None,
            files,
            saved: 0,
        }
    }

    fn start_loads(&mut self) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        if let Some(path) = self.files.mesh.take() {
            log::info!("Loading mesh {}", path.display());
            viewer.load_mesh(MeshSource::Path(path));
        } else {
            log::warn!("No mesh given; usage: defect-inspector [MESH] [REGIONS_JSON] [ENVIRONMENT_HDR]");
        }

        if let Some(path) = self.files.environment.take() {
            viewer.load_environment(Some(EnvironmentSource::Path(path)));
        }

        if let Some(path) = self.files.regions.take() {
            match std::fs::read_to_string(&path) {
                Ok(json) => match viewer.store_mut().import_json(&json, true) {
                    Ok(count) => log::info!("Imported {} regions from {}", count, path.display()),
                    Err(e) => log::error!("Failed to import {}: {}", path.display(), e),
                },
                Err(e) => log::error!("Failed to read {}: {}", path.display(), e),
            }
        }
    }

    fn command_for_key(event: &KeyEvent) -> Option<Command> {
        if event.state != ElementState::Pressed || event.repeat {
            return None;
        }
        match &event.logical_key {
            Key::Named(NamedKey::Escape) => Some(Command::Exit),
            Key::Named(NamedKey::Delete) => Some(Command::DeleteHighlighted),
            Key::Named(NamedKey::Enter) => Some(Command::SaveRegion),
            Key::Character(c) => match c.as_str() {
                "p" => Some(Command::TogglePlacement),
                "s" => Some(Command::CycleSeverity),
                "k" => Some(Command::CycleShape),
                "f" => Some(Command::FocusHighlighted),
                "o" => Some(Command::ToggleOcclusionMode),
                "e" => Some(Command::ExportRegions),
                _ => None,
            },
            _ => None,
        }
    }

    fn run_command(&mut self, event_loop: &ActiveEventLoop, command: Command) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        match command {
            Command::TogglePlacement => {
                let enabled = !viewer.placement_mode();
                viewer.set_placement_mode(enabled);
                log::info!("Placement mode {}", if enabled { "on" } else { "off" });
            }
            Command::SaveRegion => {
                self.saved += 1;
                let request = SaveRequest::new(format!("Defect {}", self.saved));
                match viewer.save_region(request) {
                    Some(id) => log::info!("Saved region {}", id),
                    None => {
                        self.saved -= 1;
                        log::warn!("Nothing to save; hover the mesh in placement mode first");
                    }
                }
            }
            Command::CycleSeverity => {
                let next = match viewer.store().dynamic().severity {
                    Severity::Low => Severity::Medium,
                    Severity::Medium => Severity::High,
                    Severity::High => Severity::Low,
                };
                viewer.set_placement_severity(next);
                log::info!("Placement severity: {}", next.as_str());
            }
            Command::CycleShape => {
                let next = match viewer.store().dynamic().shape {
                    ShapeKind::Cube => ShapeKind::Sphere,
                    ShapeKind::Sphere => ShapeKind::Point,
                    ShapeKind::Point => ShapeKind::Cube,
                };
                viewer.set_placement_shape(next);
                log::info!("Placement shape: {}", next.as_str());
            }
            Command::DeleteHighlighted => {
                if let Some(id) = viewer.store().highlighted() {
                    viewer.store_mut().delete(id);
                    log::info!("Deleted region {}", id);
                }
            }
            Command::FocusHighlighted => {
                if let Some(id) = viewer.store().highlighted() {
                    if !viewer.focus_region(id, FOCUS_DURATION) {
                        log::info!("Region {} has no saved viewpoint", id);
                    }
                }
            }
            Command::ToggleOcclusionMode => {
                let mode = match viewer.occlusion_mode() {
                    OcclusionMode::Smooth => OcclusionMode::Realtime,
                    OcclusionMode::Realtime => OcclusionMode::Smooth,
                };
                viewer.set_occlusion_mode(mode);
                log::info!("Occlusion mode: {:?}", mode);
            }
            Command::ExportRegions => match viewer.store().export_json() {
                Ok(json) => println!("{}", json),
                Err(e) => log::error!("Export failed: {}", e),
            },
            Command::Exit => {
                viewer.dispose();
                event_loop.exit();
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        match viewer.frame() {
            Ok(FrameStatus::Disposed) => return,
            Ok(_) => {}
            Err(e) => {
                log::error!("{}", e);
                event_loop.exit();
                return;
            }
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn log_labels(labels: &[LabelPosition]) {
    let visible = labels.iter().filter(|label| label.visible).count();
    log::debug!("{} labels, {} visible", labels.len(), visible);
}

impl<'a> ApplicationHandler for App<'a> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes().with_title("Defect Inspector");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(Viewer::from_window(window.clone(), ViewerConfig::default())) {
            Ok(mut viewer) => {
                viewer.set_frame_callback(log_labels);
                self.viewer = Some(viewer);
            }
            Err(e) => {
                log::error!("{}", e);
                event_loop.exit();
                return;
            }
        }

        window.request_redraw();
        self.window = Some(window);
        self.start_loads();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match &event {
            WindowEvent::CloseRequested => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.dispose();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event: key_event, .. } => {
                if let Some(command) = Self::command_for_key(key_event) {
                    self.run_command(event_loop, command);
                }
            }
            _ => {
                if let (Some(viewer), Some(input)) = (self.viewer.as_mut(), convert_window_event(&event)) {
                    viewer.handle_input(&input);
                }
            }
        }
    }
}
