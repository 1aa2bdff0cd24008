//! Platform integrations: polling, timers, raw terminal modes, signals.

pub mod input;
pub mod poller;
pub mod terminal;

pub use input::InputStream;
pub use poller::{
    EventMux, RenderTrigger, Timer, TimerSet, TimerStats, WakeReason, MAX_TIMERS,
    MIN_TIMER_DURATION,
};
pub use terminal::{install_signal_handlers, Options, TerminalModes};
