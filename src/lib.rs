//! termix: an event-multiplexed terminal I/O engine.
//!
//! Turns a POSIX terminal into an addressable, double-buffered screen with a
//! multiplexed input pipeline: keystrokes (with modifier chords and function
//! keys), mouse buttons, movement and wheel, focus changes, window resizes,
//! asynchronous render requests and periodic timers all arrive as one
//! ordered stream of typed events.
//!
//! Invariant: all terminal bytes leave through the screen's single output
//! sink; blocking happens only inside the multiplexer's poll.

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod platform;
pub mod render;
pub mod runtime;

pub use crate::error::Error;

// Events and input decoding
pub use crate::core::event::{
    Event, FocusEvent, InputEvent, KeyEvent, MouseButtonEvent, MouseMoveEvent, MouseWheelEvent,
    ResizeEvent,
};
pub use crate::core::input::{Decoded, Decoder};
pub use crate::core::key::{Key, Modifier};

// Screen model
pub use crate::core::cell::{Cell, ScreenBuffer};
pub use crate::core::geometry::{Pos, Rectangle, Size};
pub use crate::core::look::{Color, Look, Style};
pub use crate::render::screen::{Alignment, Screen};

// Multiplexer and timers
pub use crate::platform::input::InputStream;
pub use crate::platform::poller::{
    EventMux, RenderTrigger, Timer, TimerSet, TimerStats, WakeReason, MAX_TIMERS,
    MIN_TIMER_DURATION,
};

// Terminal setup and the application loop
pub use crate::platform::terminal::Options;
pub use crate::runtime::app::{App, Context, EventHandler};
