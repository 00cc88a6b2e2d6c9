//! Host input independent of any windowing library.
//!
//! Hosts translate their native events into [`InputEvent`]s. [`PointerTracker`]
//! turns raw button and cursor events into camera gestures, clicks and hovers.

use std::collections::HashMap;

use web_time::Instant;

/// Movement threshold in pixels before a mouse button hold becomes a drag.
const DRAG_THRESHOLD_PIXELS: f32 = 4.0;

/// Maximum time in milliseconds for a button press/release to be considered a click.
const CLICK_TIME_THRESHOLD_MS: u128 = 300;

/// Pixels of a precise scroll treated as one wheel line.
const PIXELS_PER_LINE: f32 = 50.0;

/// Element state (pressed or released)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ElementState {
    Pressed,
    Released,
}

/// Mouse button identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Other(u16),
}

/// Mouse scroll delta
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MouseScrollDelta {
    /// Scroll delta in lines
    LineDelta(f32, f32),
    /// Scroll delta in pixels
    PixelDelta(f32, f32),
}

impl MouseScrollDelta {
    /// Vertical scroll in wheel lines. Positive scrolls away from the user.
    pub fn lines(&self) -> f32 {
        match *self {
            Self::LineDelta(_, y) => y,
            Self::PixelDelta(_, y) => y / PIXELS_PER_LINE,
        }
    }
}

/// Raw input delivered by the host.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum InputEvent {
    /// Surface was resized to the given physical size (width, height)
    Resized((u32, u32)),
    /// Cursor position changed, in physical pixels
    CursorMoved { position: (f64, f64) },
    /// Cursor left the surface
    CursorLeft,
    /// Mouse button was pressed or released
    MouseInput { state: ElementState, button: MouseButton },
    /// Mouse wheel was scrolled
    MouseWheel { delta: MouseScrollDelta },
}

/// What a raw event means for the viewer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PointerAction {
    /// Cursor rests over the surface at (x, y) with no button dragging.
    Hover { position: (f32, f32) },
    /// Cursor left the surface.
    Leave,
    /// Left-button drag delta in pixels.
    Orbit { delta: (f32, f32) },
    /// Right or middle button drag delta in pixels.
    Pan { delta: (f32, f32) },
    /// Wheel steps; positive moves closer.
    Zoom { steps: f32 },
    /// Button pressed and released quickly without dragging.
    Click { button: MouseButton, position: (f32, f32) },
    Resize { size: (u32, u32) },
}

/// State tracking for a mouse button that is currently pressed.
#[derive(Debug, Clone)]
struct ButtonState {
    down_position: (f32, f32),
    down_time: Instant,
    is_dragging: bool,
    /// Total distance dragged since button down (in pixels)
    distance_dragged: f32,
}

/// Tracks the cursor and pressed buttons to synthesize drags and clicks.
#[derive(Debug, Default)]
pub struct PointerTracker {
    cursor: Option<(f32, f32)>,
    buttons: HashMap<MouseButton, ButtonState>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position, if it is over the surface.
    pub fn cursor(&self) -> Option<(f32, f32)> {
        self.cursor
    }

    pub fn is_dragging(&self) -> bool {
        self.buttons.values().any(|b| b.is_dragging)
    }

    pub fn process(&mut self, event: &InputEvent, now: Instant) -> Vec<PointerAction> {
        match *event {
            InputEvent::Resized(size) => vec![PointerAction::Resize { size }],
            InputEvent::CursorMoved { position } => self.process_cursor_moved((position.0 as f32, position.1 as f32)),
            InputEvent::CursorLeft => {
                self.cursor = None;
                self.buttons.clear();
                vec![PointerAction::Leave]
            }
            InputEvent::MouseInput { state, button } => self.process_mouse_input(state, button, now),
            InputEvent::MouseWheel { delta } => {
                let steps = delta.lines();
                if steps == 0.0 {
                    Vec::new()
                } else {
                    vec![PointerAction::Zoom { steps }]
                }
            }
        }
    }

    fn process_cursor_moved(&mut self, position: (f32, f32)) -> Vec<PointerAction> {
        let previous = self.cursor.replace(position);
        let delta = previous.map_or((0.0, 0.0), |p| (position.0 - p.0, position.1 - p.1));
        let magnitude = (delta.0 * delta.0 + delta.1 * delta.1).sqrt();

        let mut actions = Vec::new();
        for (button, state) in &mut self.buttons {
            state.distance_dragged += magnitude;
            if !state.is_dragging && state.distance_dragged > DRAG_THRESHOLD_PIXELS {
                state.is_dragging = true;
            }
            if state.is_dragging {
                actions.push(match button {
                    MouseButton::Left => PointerAction::Orbit { delta },
                    _ => PointerAction::Pan { delta },
                });
            }
        }

        if actions.is_empty() {
            actions.push(PointerAction::Hover { position });
        }
        actions
    }

    fn process_mouse_input(&mut self, state: ElementState, button: MouseButton, now: Instant) -> Vec<PointerAction> {
        match state {
            ElementState::Pressed => {
                if let Some(position) = self.cursor {
                    self.buttons.insert(
                        button,
                        ButtonState {
                            down_position: position,
                            down_time: now,
                            is_dragging: false,
                            distance_dragged: 0.0,
                        },
                    );
                }
                Vec::new()
            }
            ElementState::Released => {
                let Some(pressed) = self.buttons.remove(&button) else {
                    return Vec::new();
                };
                let held = now.duration_since(pressed.down_time).as_millis();
                if pressed.is_dragging || held > CLICK_TIME_THRESHOLD_MS {
                    return Vec::new();
                }
                vec![PointerAction::Click {
                    button,
                    position: pressed.down_position,
                }]
            }
        }
    }
}
