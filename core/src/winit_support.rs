/// Winit integration module - provides conversion functions between winit types and our input types
///
/// This module is only compiled when the `winit-support` feature is enabled.
use crate::input::{ElementState, InputEvent, MouseButton, MouseScrollDelta};

/// Converts a winit ElementState to our ElementState
pub fn convert_element_state(state: winit::event::ElementState) -> ElementState {
    match state {
        winit::event::ElementState::Pressed => ElementState::Pressed,
        winit::event::ElementState::Released => ElementState::Released,
    }
}

/// Converts a winit MouseButton to our MouseButton
pub fn convert_mouse_button(button: winit::event::MouseButton) -> MouseButton {
    match button {
        winit::event::MouseButton::Left => MouseButton::Left,
        winit::event::MouseButton::Right => MouseButton::Right,
        winit::event::MouseButton::Middle => MouseButton::Middle,
        winit::event::MouseButton::Back => MouseButton::Back,
        winit::event::MouseButton::Forward => MouseButton::Forward,
        winit::event::MouseButton::Other(id) => MouseButton::Other(id),
    }
}

/// Converts a winit MouseScrollDelta to our MouseScrollDelta
pub fn convert_mouse_scroll_delta(delta: winit::event::MouseScrollDelta) -> MouseScrollDelta {
    match delta {
        winit::event::MouseScrollDelta::LineDelta(x, y) => MouseScrollDelta::LineDelta(x, y),
        winit::event::MouseScrollDelta::PixelDelta(pos) => MouseScrollDelta::PixelDelta(pos.x as f32, pos.y as f32),
    }
}

/// Converts a winit WindowEvent to our InputEvent. Events the viewer does not use map to `None`.
pub fn convert_window_event(event: &winit::event::WindowEvent) -> Option<InputEvent> {
    use winit::event::WindowEvent;

    match event {
        WindowEvent::Resized(size) => Some(InputEvent::Resized((size.width, size.height))),
        WindowEvent::CursorMoved { position, .. } => Some(InputEvent::CursorMoved {
            position: (position.x, position.y),
        }),
        WindowEvent::CursorLeft { .. } => Some(InputEvent::CursorLeft),
        WindowEvent::MouseInput { state, button, .. } => Some(InputEvent::MouseInput {
            state: convert_element_state(*state),
            button: convert_mouse_button(*button),
        }),
        WindowEvent::MouseWheel { delta, .. } => Some(InputEvent::MouseWheel {
            delta: convert_mouse_scroll_delta(*delta),
        }),
        _ => None,
    }
}
