//! Damped orbit camera with motion signals and eased fly-to animation.
//!
//! Input moves a goal orbit; every [`CameraController::update`] the camera eases
//! a `damping_factor` fraction of the way toward it. Any change emits
//! [`CameraSignal::Moving`]; [`CameraSignal::Stopped`] follows once nothing has
//! changed for the idle delay. Those signals drive occlusion throttling.

use std::time::Duration;

use cgmath::{InnerSpace, MetricSpace, Point3, Vector3};
use web_time::Instant;

use crate::camera::Camera;
use crate::scene_scale;

/// Default quiet period before [`CameraSignal::Stopped`].
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(150);

/// Elevation limit, just under 90 degrees.
const MAX_ELEVATION: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Orbit changes below this are treated as settled.
const SETTLE_EPSILON: f32 = 1e-5;

/// Orbit input tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitConfig {
    /// Fraction of the remaining distance covered per update, in (0, 1].
    pub damping_factor: f32,
    /// Radians per pixel of orbit drag.
    pub orbit_sensitivity: f32,
    /// Multiplier on the model-scaled pan speed.
    pub pan_speed: f32,
    /// Multiplier on the exponential zoom step.
    pub zoom_speed: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.15,
            orbit_sensitivity: 0.005,
            pan_speed: 1.0,
            zoom_speed: 1.0,
        }
    }
}

/// Camera motion transitions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CameraSignal {
    Moving,
    Stopped,
}

/// Emits `Stopped` once after `idle_delay` without motion.
#[derive(Debug, Clone)]
pub struct MotionTracker {
    idle_delay: Duration,
    last_motion: Option<Instant>,
}

impl MotionTracker {
    pub fn new(idle_delay: Duration) -> Self {
        Self {
            idle_delay,
            last_motion: None,
        }
    }

    pub fn note_motion(&mut self, now: Instant) -> CameraSignal {
        self.last_motion = Some(now);
        CameraSignal::Moving
    }

    /// `Stopped` the first time it is polled after the quiet period.
    pub fn poll(&mut self, now: Instant) -> Option<CameraSignal> {
        let last = self.last_motion?;
        if now.duration_since(last) >= self.idle_delay {
            self.last_motion = None;
            return Some(CameraSignal::Stopped);
        }
        None
    }

    /// True from the last motion until `Stopped` has been emitted.
    pub fn is_moving(&self) -> bool {
        self.last_motion.is_some()
    }
}

/// Spherical orbit parameters around a target.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OrbitState {
    target: Point3<f32>,
    /// Horizontal angle around +Y, radians.
    azimuth: f32,
    /// Angle above the horizontal plane, radians.
    elevation: f32,
    radius: f32,
}

impl OrbitState {
    fn from_pose(eye: Point3<f32>, target: Point3<f32>) -> Self {
        let direction = eye - target;
        let horizontal_distance = (direction.x * direction.x + direction.z * direction.z).sqrt();
        Self {
            target,
            azimuth: f32::atan2(direction.x, direction.z),
            elevation: f32::atan2(direction.y, horizontal_distance).clamp(-MAX_ELEVATION, MAX_ELEVATION),
            radius: eye.distance(target),
        }
    }

    fn eye(&self) -> Point3<f32> {
        let offset = Vector3::new(
            self.elevation.cos() * self.azimuth.sin(),
            self.elevation.sin(),
            self.elevation.cos() * self.azimuth.cos(),
        );
        self.target + offset * self.radius
    }

    /// View-plane right and up vectors.
    fn basis(&self) -> (Vector3<f32>, Vector3<f32>) {
        let forward = (self.target - self.eye()).normalize();
        let right = forward.cross(Vector3::unit_y()).normalize();
        let up = right.cross(forward).normalize();
        (right, up)
    }

    fn approach(&mut self, goal: &OrbitState, factor: f32) -> bool {
        let before = *self;
        self.target += (goal.target - self.target) * factor;
        self.azimuth += (goal.azimuth - self.azimuth) * factor;
        self.elevation += (goal.elevation - self.elevation) * factor;
        self.radius += (goal.radius - self.radius) * factor;
        if self.distance_to(goal) < SETTLE_EPSILON {
            *self = *goal;
        }
        before.distance_to(self) > 0.0
    }

    fn distance_to(&self, other: &OrbitState) -> f32 {
        (self.target - other.target)
            .magnitude()
            .max((self.azimuth - other.azimuth).abs())
            .max((self.elevation - other.elevation).abs())
            .max((self.radius - other.radius).abs())
    }

    fn apply(&self, camera: &mut Camera) {
        camera.target = self.target;
        camera.eye = self.eye();
        let (_, up) = self.basis();
        camera.up = up;
    }
}

#[derive(Debug, Clone, Copy)]
struct CameraAnimation {
    from_eye: Point3<f32>,
    from_target: Point3<f32>,
    to_eye: Point3<f32>,
    to_target: Point3<f32>,
    start: Instant,
    duration: Duration,
}

impl CameraAnimation {
    /// Eased progress in [0, 1].
    fn progress(&self, now: Instant) -> f32 {
        let t = now.duration_since(self.start).as_secs_f32() / self.duration.as_secs_f32();
        ease_in_out_quad(t.clamp(0.0, 1.0))
    }
}

fn ease_in_out_quad(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

fn lerp_point(a: Point3<f32>, b: Point3<f32>, t: f32) -> Point3<f32> {
    a + (b - a) * t
}

/// Orbit, pan and zoom around a target, plus animated fly-to.
#[derive(Debug, Clone)]
pub struct CameraController {
    config: OrbitConfig,
    model_radius: f32,
    current: OrbitState,
    goal: OrbitState,
    animation: Option<CameraAnimation>,
    motion: MotionTracker,
    /// Set by input; consumed by the next update.
    pending_motion: bool,
}

impl CameraController {
    pub fn new(config: OrbitConfig, idle_delay: Duration) -> Self {
        let state = OrbitState::from_pose(Point3::new(0.0, 0.0, 5.0), Point3::new(0.0, 0.0, 0.0));
        Self {
            config,
            model_radius: 1.0,
            current: state,
            goal: state,
            animation: None,
            motion: MotionTracker::new(idle_delay),
            pending_motion: false,
        }
    }

    pub fn config(&self) -> &OrbitConfig {
        &self.config
    }

    /// Model size used for distance limits and pan speed.
    pub fn set_model_radius(&mut self, model_radius: f32) {
        self.model_radius = model_radius;
    }

    /// Adopts the camera's pose without animating, e.g. after fitting a new mesh.
    pub fn sync_to_camera(&mut self, camera: &Camera) {
        self.current = OrbitState::from_pose(camera.eye, camera.target);
        self.goal = self.current;
        self.animation = None;
        self.pending_motion = true;
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_moving() || self.pending_motion
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Rotates the goal by a drag delta in pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.interrupt();
        self.goal.azimuth -= dx * self.config.orbit_sensitivity;
        self.goal.elevation = (self.goal.elevation + dy * self.config.orbit_sensitivity).clamp(-MAX_ELEVATION, MAX_ELEVATION);
        self.pending_motion = true;
    }

    /// Slides the goal target in the view plane by a drag delta in pixels.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.interrupt();
        let (right, up) = self.goal.basis();
        let scale = scene_scale::pan_sensitivity(self.model_radius) * self.config.pan_speed;
        self.goal.target += right * (-dx * scale) + up * (dy * scale);
        self.pending_motion = true;
    }

    /// Exponential zoom. Positive steps move closer.
    pub fn zoom(&mut self, steps: f32) {
        self.interrupt();
        let zoom_factor = scene_scale::zoom_factor() * self.config.zoom_speed;
        let factor = if steps > 0.0 { 1.0 - zoom_factor } else { 1.0 + zoom_factor };
        self.goal.radius = (self.goal.radius * factor.powf(steps.abs())).clamp(
            scene_scale::min_camera_radius(self.model_radius),
            scene_scale::max_camera_radius(self.model_radius),
        );
        self.pending_motion = true;
    }

    /// Flies to `position` looking at `target` with quadratic ease-in-out.
    ///
    /// Restarts from the current pose when called mid-flight. A zero duration snaps.
    pub fn animate_to(&mut self, position: Point3<f32>, target: Point3<f32>, duration: Duration, now: Instant) {
        let from_eye = self.current.eye();
        let from_target = self.current.target;
        self.pending_motion = true;
        if duration.is_zero() {
            self.animation = None;
            self.current = OrbitState::from_pose(position, target);
            self.goal = self.current;
            return;
        }
        self.animation = Some(CameraAnimation {
            from_eye,
            from_target,
            to_eye: position,
            to_target: target,
            start: now,
            duration,
        });
    }

    /// Advances damping or animation and writes the pose into `camera`.
    pub fn update(&mut self, camera: &mut Camera, now: Instant) -> Option<CameraSignal> {
        let mut changed = std::mem::take(&mut self.pending_motion);

        if let Some(animation) = self.animation {
            let t = animation.progress(now);
            let eye = lerp_point(animation.from_eye, animation.to_eye, t);
            let target = lerp_point(animation.from_target, animation.to_target, t);
            self.current = OrbitState::from_pose(eye, target);
            self.goal = self.current;
            if t >= 1.0 {
                self.animation = None;
            }
            changed = true;
        } else {
            changed |= self.current.approach(&self.goal, self.config.damping_factor.clamp(f32::EPSILON, 1.0));
        }

        if changed {
            self.current.apply(camera);
            return Some(self.motion.note_motion(now));
        }
        self.motion.poll(now)
    }

    /// Interactive input cancels a running animation where it stands.
    fn interrupt(&mut self) {
        if self.animation.take().is_some() {
            self.goal = self.current;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn create_test_controller() -> (CameraController, Camera) {
        let camera = Camera {
            eye: Point3::new(0.0, 0.0, 10.0),
            ..Camera::default()
        };
        let mut controller = CameraController::new(OrbitConfig::default(), DEFAULT_IDLE_DELAY);
        controller.set_model_radius(5.0);
        controller.sync_to_camera(&camera);
        (controller, camera)
    }

    /// Runs updates at 60 Hz until the camera settles, returning the last signal time.
    fn settle(controller: &mut CameraController, camera: &mut Camera, start: Instant) -> Instant {
        let mut now = start;
        for _ in 0..600 {
            now += Duration::from_millis(16);
            if controller.update(camera, now) == Some(CameraSignal::Stopped) {
                break;
            }
        }
        now
    }

    // ===== Motion signals =====

    #[test]
    fn test_motion_tracker_stops_after_idle_delay() {
        let start = Instant::now();
        let mut tracker = MotionTracker::new(DEFAULT_IDLE_DELAY);
        assert_eq!(tracker.note_motion(start), CameraSignal::Moving);
        assert_eq!(tracker.poll(start + Duration::from_millis(100)), None);
        assert!(tracker.is_moving());
        assert_eq!(tracker.poll(start + Duration::from_millis(150)), Some(CameraSignal::Stopped));
        // Only once.
        assert_eq!(tracker.poll(start + Duration::from_millis(300)), None);
        assert!(!tracker.is_moving());
    }

    #[test]
    fn test_input_emits_moving_then_stopped() {
        let (mut controller, mut camera) = create_test_controller();
        let start = Instant::now();
        controller.update(&mut camera, start);
        controller.orbit(40.0, 0.0);
        assert_eq!(controller.update(&mut camera, start + Duration::from_millis(16)), Some(CameraSignal::Moving));
        assert!(controller.is_moving());

        settle(&mut controller, &mut camera, start);
        assert!(!controller.is_moving());
    }

    // ===== Orbit, pan, zoom =====

    #[test]
    fn test_damping_approaches_goal_gradually() {
        let (mut controller, mut camera) = create_test_controller();
        let start = Instant::now();
        controller.zoom(5.0);
        controller.update(&mut camera, start);
        let after_one = camera.length();
        assert!(after_one < 10.0);
        // One update covers only the damping fraction.
        assert!(after_one > 10.0 * 0.9f32.powi(5));

        settle(&mut controller, &mut camera, start);
        assert!((camera.length() - 10.0 * 0.9f32.powi(5)).abs() < 1e-3);
    }

    #[test]
    fn test_zoom_clamped_to_model_scale() {
        let (mut controller, mut camera) = create_test_controller();
        controller.zoom(-500.0);
        settle(&mut controller, &mut camera, Instant::now());
        assert!((camera.length() - scene_scale::max_camera_radius(5.0)).abs() < 1e-2);
    }

    #[test]
    fn test_elevation_clamped() {
        let (mut controller, mut camera) = create_test_controller();
        controller.orbit(0.0, 10_000.0);
        settle(&mut controller, &mut camera, Instant::now());
        let direction = (camera.eye - camera.target).normalize();
        assert!(direction.y < 1.0);
        assert!(direction.y > 0.99);
        assert!(camera.up.magnitude() > 0.99);
    }

    #[test]
    fn test_pan_moves_eye_and_target_together() {
        let (mut controller, mut camera) = create_test_controller();
        controller.pan(100.0, 0.0);
        settle(&mut controller, &mut camera, Instant::now());
        assert!(camera.target.x < 0.0);
        assert!((camera.length() - 10.0).abs() < EPSILON);
    }

    // ===== Animation =====

    #[test]
    fn test_ease_in_out_quad() {
        assert_eq!(ease_in_out_quad(0.0), 0.0);
        assert!((ease_in_out_quad(0.5) - 0.5).abs() < EPSILON);
        assert!((ease_in_out_quad(1.0) - 1.0).abs() < EPSILON);
        assert!(ease_in_out_quad(0.25) < 0.25);
    }

    #[test]
    fn test_animate_to_reaches_destination() {
        let (mut controller, mut camera) = create_test_controller();
        let start = Instant::now();
        let eye = Point3::new(4.0, 3.0, 0.0);
        let target = Point3::new(1.0, 0.0, 0.0);
        controller.animate_to(eye, target, Duration::from_millis(500), start);

        let mid = controller.update(&mut camera, start + Duration::from_millis(250));
        assert_eq!(mid, Some(CameraSignal::Moving));
        assert!(controller.is_animating());

        controller.update(&mut camera, start + Duration::from_millis(500));
        assert!(!controller.is_animating());
        assert!((camera.eye - eye).magnitude() < 1e-3);
        assert!((camera.target - target).magnitude() < 1e-3);
    }

    #[test]
    fn test_animate_to_zero_duration_snaps() {
        let (mut controller, mut camera) = create_test_controller();
        let eye = Point3::new(0.0, 2.0, 2.0);
        controller.animate_to(eye, Point3::new(0.0, 0.0, 0.0), Duration::ZERO, Instant::now());
        assert!(!controller.is_animating());
        controller.update(&mut camera, Instant::now());
        assert!((camera.eye - eye).magnitude() < 1e-3);
    }

    #[test]
    fn test_animate_to_restarts_mid_flight() {
        let (mut controller, mut camera) = create_test_controller();
        let start = Instant::now();
        controller.animate_to(Point3::new(10.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0), Duration::from_millis(400), start);
        controller.update(&mut camera, start + Duration::from_millis(200));
        let mid_eye = camera.eye;

        let restart = start + Duration::from_millis(200);
        controller.animate_to(Point3::new(0.0, 10.0, 0.1), Point3::new(0.0, 0.0, 0.0), Duration::from_millis(400), restart);
        controller.update(&mut camera, restart);
        // Starts where the first flight was.
        assert!((camera.eye - mid_eye).magnitude() < 1e-3);
    }

    #[test]
    fn test_input_cancels_animation() {
        let (mut controller, mut camera) = create_test_controller();
        let start = Instant::now();
        controller.animate_to(Point3::new(10.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0), Duration::from_secs(1), start);
        controller.update(&mut camera, start + Duration::from_millis(100));
        controller.zoom(1.0);
        assert!(!controller.is_animating());
    }
}
