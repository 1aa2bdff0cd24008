//! Rendering: the double-buffered screen and its differential flush.

pub mod screen;

pub use screen::{Alignment, Screen};
