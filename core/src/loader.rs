//! Background mesh and environment loading.
//!
//! Loads run on a worker thread ([`std::thread::spawn`]) and produce CPU data
//! only. Results are posted to a [`LoadQueue`] inbox which the viewer drains at
//! the start of a frame, so the scene swap happens between frames. Each load
//! hands back a ticket that implements [`Future`] and reports its [`LoadPhase`].
//!
//! # Examples
//!
//! ```no_run
//! use defect_viewer::loader::MeshSource;
//!
//! # fn demo(viewer: &mut defect_viewer::Viewer) {
//! let ticket = viewer.load_mesh(MeshSource::Url("file:///data/blade.glb".into()));
//! // Keep calling viewer.frame(); the ticket resolves once the mesh is swapped in.
//! # }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use crossbeam_channel::{Receiver, Sender};
use futures::channel::oneshot;
use thiserror::Error;

use crate::common::Aabb;
use crate::environment::{hdr_loader, Environment};
use crate::mesh::Model;
use crate::scene_scale;

// ============================================================================
// Types
// ============================================================================

/// Where mesh data comes from.
#[derive(Debug, Clone)]
pub enum MeshSource {
    /// A filesystem path or a `file://` URL.
    Url(String),
    /// Format is detected from magic bytes, falling back to the extension.
    Path(PathBuf),
    /// `.glb` or self-contained `.gltf` bytes.
    Bytes(Vec<u8>),
}

/// Where an equirectangular `.hdr` comes from.
#[derive(Debug, Clone)]
pub enum EnvironmentSource {
    Url(String),
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Errors that can occur while loading a mesh or environment.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("glTF error: {0}")]
    Gltf(String),

    #[error("HDR error: {0}")]
    Hdr(String),

    #[error("Unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Required glTF extension '{0}' is not supported")]
    UnsupportedExtension(String),

    #[error("Unknown file format")]
    UnknownFormat,

    #[error("No environment supplied")]
    NoEnvironment,

    #[error("Load cancelled")]
    Cancelled,
}

/// Coarse loading phases for progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoadPhase {
    Pending = 0,
    Reading = 1,
    Parsing = 2,
    Complete = 3,
    Failed = 4,
}

impl LoadPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Reading,
            2 => Self::Parsing,
            3 => Self::Complete,
            _ => Self::Failed,
        }
    }
}

/// Shared cancel flag for one load.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default)]
struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    fn get(&self) -> LoadPhase {
        LoadPhase::from_u8(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, phase: LoadPhase) {
        self.0.store(phase as u8, Ordering::Relaxed);
    }
}

/// Summary of a mesh that has been swapped into the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInfo {
    pub part_count: usize,
    pub triangle_count: usize,
    pub bounds: Option<Aabb>,
    /// Largest axis extent of `bounds`.
    pub bounding_size: f32,
}

impl MeshInfo {
    pub fn from_model(model: &Model) -> Self {
        let bounds = model.bounds();
        Self {
            part_count: model.parts().len(),
            triangle_count: model.triangle_count(),
            bounding_size: scene_scale::scene_bounding_size(bounds.as_ref()),
            bounds,
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Pending mesh load. Resolves after the viewer has swapped the mesh in.
#[derive(Debug)]
pub struct MeshLoadTicket {
    phase: PhaseCell,
    token: CancellationToken,
    receiver: oneshot::Receiver<Result<MeshInfo, LoadError>>,
}

impl MeshLoadTicket {
    pub fn phase(&self) -> LoadPhase {
        self.phase.get()
    }

    /// Abandons the load. The ticket resolves to [`LoadError::Cancelled`].
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Future for MeshLoadTicket {
    type Output = Result<MeshInfo, LoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The viewer was dropped or disposed before the swap.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(LoadError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Pending environment load. Resolves to true when the requested HDR was
/// applied and false when the neutral fallback was used instead.
#[derive(Debug)]
pub struct EnvironmentLoadTicket {
    phase: PhaseCell,
    token: CancellationToken,
    receiver: oneshot::Receiver<bool>,
}

impl EnvironmentLoadTicket {
    pub fn phase(&self) -> LoadPhase {
        self.phase.get()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Future for EnvironmentLoadTicket {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|r| r.unwrap_or(false))
    }
}

// ============================================================================
// Completed loads
// ============================================================================

/// Resolves a ticket. The caller may have dropped it, which is not an error.
pub(crate) struct Reply<T>(oneshot::Sender<T>);

impl<T> Reply<T> {
    pub fn send(self, value: T) {
        let _ = self.0.send(value);
    }
}

/// A finished mesh load waiting to be applied.
pub(crate) struct CompletedMesh {
    pub token: CancellationToken,
    pub result: Result<Model, LoadError>,
    pub reply: Reply<Result<MeshInfo, LoadError>>,
}

/// A finished environment load waiting to be applied.
pub(crate) struct CompletedEnvironment {
    pub token: CancellationToken,
    pub result: Result<Environment, LoadError>,
    pub reply: Reply<bool>,
}

pub(crate) enum Completed {
    Mesh(CompletedMesh),
    Environment(CompletedEnvironment),
}

/// Starts loads and collects their results for the frame loop.
///
/// Starting a mesh load cancels the previous pending mesh load, and likewise
/// for environments.
pub(crate) struct LoadQueue {
    sender: Sender<Completed>,
    /// `None` once closed. Workers finishing after that drop their reply.
    receiver: Option<Receiver<Completed>>,
    mesh_token: Option<CancellationToken>,
    environment_token: Option<CancellationToken>,
}

impl LoadQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver: Some(receiver),
            mesh_token: None,
            environment_token: None,
        }
    }

    pub fn start_mesh(&mut self, source: MeshSource) -> MeshLoadTicket {
        let token = CancellationToken::new();
        if let Some(previous) = self.mesh_token.replace(token.clone()) {
            previous.cancel();
        }
        let phase = PhaseCell::default();
        let (reply, receiver) = oneshot::channel();
        if self.is_closed() {
            token.cancel();
            phase.set(LoadPhase::Failed);
            return MeshLoadTicket { phase, token, receiver };
        }

        let worker_phase = phase.clone();
        let worker_token = token.clone();
        let sender = self.sender.clone();
        std::thread::spawn(move || {
            let result = load_mesh_sync(source, &worker_phase, &worker_token);
            match &result {
                Ok(model) => {
                    log::info!("Loaded mesh: {} parts, {} triangles", model.parts().len(), model.triangle_count());
                    worker_phase.set(LoadPhase::Complete);
                }
                Err(e) => {
                    log::warn!("Mesh load failed: {e}");
                    worker_phase.set(LoadPhase::Failed);
                }
            }
            // A closed inbox means the viewer is gone; dropping `reply` cancels the ticket.
            let _ = sender.send(Completed::Mesh(CompletedMesh {
                token: worker_token,
                result,
                reply: Reply(reply),
            }));
        });

        MeshLoadTicket { phase, token, receiver }
    }

    /// `None` resolves straight to the neutral fallback on the next frame.
    pub fn start_environment(&mut self, source: Option<EnvironmentSource>) -> EnvironmentLoadTicket {
        let token = CancellationToken::new();
        if let Some(previous) = self.environment_token.replace(token.clone()) {
            previous.cancel();
        }
        let phase = PhaseCell::default();
        let (reply, receiver) = oneshot::channel();
        if self.is_closed() {
            token.cancel();
            phase.set(LoadPhase::Failed);
            return EnvironmentLoadTicket { phase, token, receiver };
        }

        let Some(source) = source else {
            phase.set(LoadPhase::Complete);
            let _ = self.sender.send(Completed::Environment(CompletedEnvironment {
                token: token.clone(),
                result: Err(LoadError::NoEnvironment),
                reply: Reply(reply),
            }));
            return EnvironmentLoadTicket { phase, token, receiver };
        };

        let worker_phase = phase.clone();
        let worker_token = token.clone();
        let sender = self.sender.clone();
        std::thread::spawn(move || {
            let result = load_environment_sync(source, &worker_phase, &worker_token);
            match &result {
                Ok(_) => worker_phase.set(LoadPhase::Complete),
                Err(e) => {
                    log::warn!("Environment load failed: {e}");
                    worker_phase.set(LoadPhase::Failed);
                }
            }
            let _ = sender.send(Completed::Environment(CompletedEnvironment {
                token: worker_token,
                result,
                reply: Reply(reply),
            }));
        });

        EnvironmentLoadTicket { phase, token, receiver }
    }

    /// Cancels every pending load.
    pub fn cancel_all(&mut self) {
        for token in [self.mesh_token.take(), self.environment_token.take()].into_iter().flatten() {
            token.cancel();
        }
    }

    /// Cancels every pending load and stops accepting results. Tickets of loads
    /// still running resolve as cancelled when their worker finishes.
    pub fn close(&mut self) {
        self.cancel_all();
        self.receiver = None;
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }

    /// Next finished load, if any. Never blocks.
    pub fn try_next(&self) -> Option<Completed> {
        self.receiver.as_ref()?.try_recv().ok()
    }

    #[cfg(test)]
    pub fn wait_next(&self, timeout: std::time::Duration) -> Option<Completed> {
        self.receiver.as_ref()?.recv_timeout(timeout).ok()
    }
}

// ============================================================================
// Source resolution & format detection
// ============================================================================

/// Maps a URL to a local path. Plain paths pass through; `file://` is stripped.
fn resolve_url(url: &str) -> Result<PathBuf, LoadError> {
    match url.split_once("://") {
        None => Ok(PathBuf::from(url)),
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => {
            let rest = rest.strip_prefix("localhost").unwrap_or(rest);
            Ok(PathBuf::from(rest.replace("%20", " ")))
        }
        Some((scheme, _)) => Err(LoadError::UnsupportedScheme(scheme.to_string())),
    }
}

fn read_path(path: PathBuf) -> Result<(Vec<u8>, Option<PathBuf>), LoadError> {
    let bytes = std::fs::read(&path)?;
    Ok((bytes, Some(path)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MeshFormat {
    Glb,
    GltfJson,
}

/// Detect format from magic bytes.
fn detect_format_from_bytes(bytes: &[u8]) -> Result<MeshFormat, LoadError> {
    if bytes.starts_with(b"glTF") {
        return Ok(MeshFormat::Glb);
    }
    // glTF JSON starts with '{' (possibly after whitespace)
    match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Ok(MeshFormat::GltfJson),
        _ => Err(LoadError::UnknownFormat),
    }
}

/// Detect format from file extension as a fallback.
fn detect_format_from_extension(path: &Path) -> Result<MeshFormat, LoadError> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("glb") => Ok(MeshFormat::Glb),
        Some("gltf") => Ok(MeshFormat::GltfJson),
        _ => Err(LoadError::UnknownFormat),
    }
}

// ============================================================================
// Sync loading (worker body)
// ============================================================================

fn check_cancelled(token: &CancellationToken) -> Result<(), LoadError> {
    if token.is_cancelled() {
        Err(LoadError::Cancelled)
    } else {
        Ok(())
    }
}

/// Reads and parses a mesh on the calling thread.
pub fn load_mesh(source: MeshSource) -> Result<Model, LoadError> {
    load_mesh_sync(source, &PhaseCell::default(), &CancellationToken::new())
}

fn load_mesh_sync(source: MeshSource, phase: &PhaseCell, token: &CancellationToken) -> Result<Model, LoadError> {
    phase.set(LoadPhase::Reading);
    let (bytes, path) = match source {
        MeshSource::Url(url) => read_path(resolve_url(&url)?)?,
        MeshSource::Path(path) => read_path(path)?,
        MeshSource::Bytes(bytes) => (bytes, None),
    };
    check_cancelled(token)?;

    phase.set(LoadPhase::Parsing);
    let format = detect_format_from_bytes(&bytes).or_else(|e| match &path {
        Some(p) => detect_format_from_extension(p),
        None => Err(e),
    })?;

    if let Some(extension) = crate::gltf::undecodable_required_extension(&bytes) {
        return Err(LoadError::UnsupportedExtension(extension));
    }

    let model = match (format, &path) {
        // External buffers and images resolve relative to the file.
        (MeshFormat::GltfJson, Some(path)) => crate::gltf::load_model_from_path(path),
        _ => crate::gltf::load_model_from_slice(&bytes),
    }
    .map_err(|e| LoadError::Gltf(format!("{e:#}")))?;

    check_cancelled(token)?;
    Ok(model)
}

fn load_environment_sync(
    source: EnvironmentSource,
    phase: &PhaseCell,
    token: &CancellationToken,
) -> Result<Environment, LoadError> {
    phase.set(LoadPhase::Reading);
    let (bytes, _) = match source {
        EnvironmentSource::Url(url) => read_path(resolve_url(&url)?)?,
        EnvironmentSource::Path(path) => read_path(path)?,
        EnvironmentSource::Bytes(bytes) => (bytes, None),
    };
    check_cancelled(token)?;

    phase.set(LoadPhase::Parsing);
    if !hdr_loader::is_hdr(&bytes) {
        return Err(LoadError::UnknownFormat);
    }
    let environment = Environment::from_hdr_bytes(&bytes).map_err(|e| LoadError::Hdr(format!("{e:#}")))?;
    check_cancelled(token)?;
    Ok(environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::hdr_loader::test_support::flat_hdr;
    use crate::gltf::test_support::triangle_glb;
    use std::io::Write;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn create_test_glb() -> Vec<u8> {
        triangle_glb([0.0, 0.0, 0.0], &[])
    }

    fn next_mesh(queue: &LoadQueue) -> CompletedMesh {
        match queue.wait_next(TIMEOUT) {
            Some(Completed::Mesh(mesh)) => mesh,
            _ => panic!("expected a completed mesh load"),
        }
    }

    fn next_environment(queue: &LoadQueue) -> CompletedEnvironment {
        match queue.wait_next(TIMEOUT) {
            Some(Completed::Environment(env)) => env,
            _ => panic!("expected a completed environment load"),
        }
    }

    // ===== Source resolution =====

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url("/data/a.glb").unwrap(), PathBuf::from("/data/a.glb"));
        assert_eq!(resolve_url("file:///data/a.glb").unwrap(), PathBuf::from("/data/a.glb"));
        assert_eq!(resolve_url("file://localhost/data/my%20part.glb").unwrap(), PathBuf::from("/data/my part.glb"));
        assert!(matches!(
            resolve_url("https://example.com/a.glb"),
            Err(LoadError::UnsupportedScheme(s)) if s == "https"
        ));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format_from_bytes(b"glTF\x02\0\0\0").unwrap(), MeshFormat::Glb);
        assert_eq!(detect_format_from_bytes(b"  \n{\"asset\":{}}").unwrap(), MeshFormat::GltfJson);
        assert!(detect_format_from_bytes(b"solid cube").is_err());
        assert_eq!(detect_format_from_extension(Path::new("part.GLB")).unwrap(), MeshFormat::Glb);
        assert!(detect_format_from_extension(Path::new("part.obj")).is_err());
    }

    // ===== Sync loading =====

    #[test]
    fn test_load_mesh_from_bytes() {
        let model = load_mesh(MeshSource::Bytes(create_test_glb())).unwrap();
        let info = MeshInfo::from_model(&model);
        assert_eq!(info.part_count, 1);
        assert_eq!(info.triangle_count, 1);
        assert!((info.bounding_size - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_mesh_from_path_and_url() {
        let mut file = tempfile::Builder::new().suffix(".glb").tempfile().unwrap();
        file.write_all(&create_test_glb()).unwrap();

        assert!(load_mesh(MeshSource::Path(file.path().to_path_buf())).is_ok());
        let url = format!("file://{}", file.path().display());
        assert!(load_mesh(MeshSource::Url(url)).is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_mesh(MeshSource::Path(dir.path().join("missing.glb")));
        assert!(matches!(result, Err(LoadError::Io(_))));
    }

    #[test]
    fn test_unsupported_extension_is_distinguishable() {
        let glb = triangle_glb([0.0, 0.0, 0.0], &["EXT_meshopt_compression"]);
        let result = load_mesh(MeshSource::Bytes(glb));
        assert!(matches!(result, Err(LoadError::UnsupportedExtension(name)) if name == "EXT_meshopt_compression"));
    }

    #[test]
    fn test_unknown_bytes() {
        assert!(matches!(load_mesh(MeshSource::Bytes(b"PLY".to_vec())), Err(LoadError::UnknownFormat)));
    }

    #[test]
    fn test_cancelled_before_parse() {
        let token = CancellationToken::new();
        token.cancel();
        let result = load_mesh_sync(MeshSource::Bytes(create_test_glb()), &PhaseCell::default(), &token);
        assert!(matches!(result, Err(LoadError::Cancelled)));
    }

    // ===== Queue & tickets =====

    #[test]
    fn test_ticket_resolves_after_apply() {
        let mut queue = LoadQueue::new();
        let ticket = queue.start_mesh(MeshSource::Bytes(create_test_glb()));

        let completed = next_mesh(&queue);
        assert_eq!(ticket.phase(), LoadPhase::Complete);
        let info = completed.result.as_ref().map(MeshInfo::from_model).unwrap();
        completed.reply.send(Ok(info.clone()));

        assert_eq!(pollster::block_on(ticket).unwrap(), info);
    }

    #[test]
    fn test_new_load_cancels_previous() {
        let mut queue = LoadQueue::new();
        let first = queue.start_mesh(MeshSource::Bytes(create_test_glb()));
        let second = queue.start_mesh(MeshSource::Bytes(create_test_glb()));
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_dropped_completion_cancels_ticket() {
        let mut queue = LoadQueue::new();
        let ticket = queue.start_mesh(MeshSource::Bytes(create_test_glb()));
        queue.cancel_all();
        assert!(ticket.is_cancelled());

        drop(next_mesh(&queue));
        assert!(matches!(pollster::block_on(ticket), Err(LoadError::Cancelled)));
    }

    #[test]
    fn test_closed_queue_cancels_new_loads() {
        let mut queue = LoadQueue::new();
        queue.close();
        assert!(queue.is_closed());

        let mesh = queue.start_mesh(MeshSource::Bytes(create_test_glb()));
        assert!(mesh.is_cancelled());
        assert!(matches!(pollster::block_on(mesh), Err(LoadError::Cancelled)));

        let environment = queue.start_environment(None);
        assert!(!pollster::block_on(environment));
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn test_environment_without_source() {
        let mut queue = LoadQueue::new();
        let ticket = queue.start_environment(None);
        let completed = next_environment(&queue);
        assert!(matches!(completed.result, Err(LoadError::NoEnvironment)));
        completed.reply.send(false);
        assert!(!pollster::block_on(ticket));
    }

    #[test]
    fn test_environment_from_bytes() {
        let mut queue = LoadQueue::new();
        let bytes = flat_hdr(2, 2, |_| [128, 128, 128, 128]);
        let ticket = queue.start_environment(Some(EnvironmentSource::Bytes(bytes)));
        let completed = next_environment(&queue);
        assert!(completed.result.is_ok());
        completed.reply.send(true);
        assert!(pollster::block_on(ticket));
    }

    #[test]
    fn test_environment_rejects_non_hdr() {
        let mut queue = LoadQueue::new();
        let _ticket = queue.start_environment(Some(EnvironmentSource::Bytes(b"\x89PNG".to_vec())));
        assert!(matches!(next_environment(&queue).result, Err(LoadError::UnknownFormat)));
    }
}
