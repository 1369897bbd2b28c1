//! Input snapshot and UI events.

use galaxis_core::types::Point;

use crate::element::ElementId;

/// Non-character keys the UI reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Backspace,
    Delete,
    Enter,
    Escape,
    Left,
    Right,
    Home,
    End,
    Tab,
}

/// One frame's input, supplied by the host windowing layer.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    pub mouse_pos: Point<f32>,
    /// Button held this frame.
    pub mouse_down: bool,
    /// Button went down this frame.
    pub mouse_clicked: bool,
    /// Button went up this frame.
    pub mouse_released: bool,
    /// Vertical wheel movement, positive away from the user.
    pub wheel_delta: f32,
    /// Characters typed this frame, in order.
    pub chars: Vec<char>,
    /// Non-character keys pressed this frame.
    pub keys: Vec<Key>,
}

/// Events the tree emits for the host to drain each frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A clickable element fired its action id.
    Action { element: ElementId, action: String },
    /// An element gained keyboard focus.
    FocusGained(ElementId),
    /// An element lost keyboard focus (fired on the transitioning frame).
    FocusLost(ElementId),
    /// An input field committed its text (Enter).
    TextCommitted { element: ElementId, text: String },
    /// An input field's text changed.
    TextChanged { element: ElementId, text: String },
}
