//! Typed events delivered by the input pipeline.

use crate::core::geometry::Size;
use crate::core::key::{Key, Modifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifier,
}

/// A decoded text codepoint, independent of any key mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub codepoint: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseButtonEvent {
    pub button: u8,
    pub pressed: bool,
    pub released: bool,
    pub double_clicked: bool,
    pub x: u16,
    pub y: u16,
    pub modifiers: Modifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseMoveEvent {
    pub x: u16,
    pub y: u16,
    pub modifiers: Modifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseWheelEvent {
    /// +1 for wheel up, -1 for wheel down.
    pub delta: i32,
    pub x: u16,
    pub y: u16,
    pub modifiers: Modifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    pub size: Size,
    pub old: Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusEvent {
    pub focused: bool,
}

/// The single ordered event stream consumed by the application loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Key(KeyEvent),
    Input(InputEvent),
    MouseButton(MouseButtonEvent),
    MouseMove(MouseMoveEvent),
    MouseWheel(MouseWheelEvent),
    Resize(ResizeEvent),
    Focus(FocusEvent),
    /// Synthetic redraw request; coalesced across back-to-back triggers.
    Render,
}

impl Event {
    pub fn key(key: Key, modifiers: Modifier) -> Self {
        Event::Key(KeyEvent { key, modifiers })
    }
}
