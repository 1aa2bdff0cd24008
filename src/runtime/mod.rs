//! Runtime orchestration: the application loop and handler surface.

pub mod app;

pub use app::{App, Context, EventHandler};
