//! The application loop: resize handling, event dispatch and flushing.
//!
//! Single-threaded: handlers, timer callbacks and the renderer all run on
//! the loop thread. Signal handlers only raise flags that the loop observes
//! at the top of each iteration.

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::core::event::{
    Event, FocusEvent, InputEvent, KeyEvent, MouseButtonEvent, MouseMoveEvent, MouseWheelEvent,
    ResizeEvent,
};
use crate::error::Error;
use crate::logging;
use crate::platform::input::InputStream;
use crate::platform::poller::{RenderTrigger, Timer, TimerSet};
use crate::platform::terminal::{
    install_signal_handlers, reraise_default, set_resize_pending, take_resize_pending,
    take_shutdown_signal, Options, TerminalModes,
};
use crate::render::screen::Screen;

/// Per-dispatch view of the runtime handed to event handlers.
pub struct Context<'a> {
    pub screen: &'a mut Screen,
    input: &'a InputStream,
    quit: &'a mut Option<i32>,
}

impl Context<'_> {
    pub fn quit(&mut self) {
        self.quit_with(0);
    }

    pub fn quit_with(&mut self, code: i32) {
        *self.quit = Some(code);
    }

    pub fn set_timer(
        &self,
        initial: Duration,
        interval: Duration,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<Timer, Error> {
        self.input.set_timer(initial, interval, callback)
    }

    pub fn cancel_timer(&self, timer: &Timer) {
        self.input.cancel_timer(timer);
    }

    pub fn timers(&self) -> &Arc<TimerSet> {
        self.input.timers()
    }

    pub fn render_trigger(&self) -> RenderTrigger {
        self.input.render_trigger()
    }

    pub fn trigger_render(&self) {
        self.input.render_trigger().trigger();
    }
}

/// Per-kind event callbacks; every method defaults to a no-op.
pub trait EventHandler {
    fn on_app_start(&mut self, _ctx: &mut Context<'_>) {}
    fn on_app_exit(&mut self, _code: i32) {}
    fn on_key(&mut self, _ctx: &mut Context<'_>, _event: KeyEvent) {}
    fn on_input(&mut self, _ctx: &mut Context<'_>, _event: InputEvent) {}
    fn on_mouse_button(&mut self, _ctx: &mut Context<'_>, _event: MouseButtonEvent) {}
    fn on_mouse_move(&mut self, _ctx: &mut Context<'_>, _event: MouseMoveEvent) {}
    fn on_mouse_wheel(&mut self, _ctx: &mut Context<'_>, _event: MouseWheelEvent) {}
    fn on_resize(&mut self, _ctx: &mut Context<'_>, _event: ResizeEvent) {}
    fn on_focus(&mut self, _ctx: &mut Context<'_>, _event: FocusEvent) {}
    fn on_render(&mut self, _ctx: &mut Context<'_>) {}
}

pub struct App {
    screen: Screen,
    input: InputStream,
    modes: TerminalModes,
    exited: bool,
}

impl App {
    /// Take over the process terminal: raw mode, the option-governed
    /// protocols, the signal shim and an initial pending resize.
    pub fn new(options: Options) -> Result<Self, Error> {
        Self::build(options, libc::STDIN_FILENO, libc::STDOUT_FILENO, true)
    }

    fn build(
        options: Options,
        in_fd: RawFd,
        out_fd: RawFd,
        install_signals: bool,
    ) -> Result<Self, Error> {
        logging::init_from_env();
        let modes = TerminalModes::acquire_on(in_fd, out_fd, options)?;
        if install_signals {
            install_signal_handlers(!options.contains(Options::NO_SIGNAL_DECODE))?;
        }
        let input = InputStream::with_fd(in_fd)?;
        let screen = Screen::bound_to_fd(out_fd);

        // The first loop iteration performs the initial resize.
        set_resize_pending();

        Ok(Self {
            screen,
            input,
            modes,
            exited: false,
        })
    }

    pub fn screen(&mut self) -> &mut Screen {
        &mut self.screen
    }

    pub fn set_double_click_duration(&mut self, window: Duration) {
        self.input.set_double_click_duration(window);
    }

    pub fn set_timer(
        &self,
        initial: Duration,
        interval: Duration,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<Timer, Error> {
        self.input.set_timer(initial, interval, callback)
    }

    pub fn render_trigger(&self) -> RenderTrigger {
        self.input.render_trigger()
    }

    /// Iterate until a quit request or fatal signal: apply pending resizes,
    /// drain internal events, flush the screen, then dispatch the next input
    /// batch. Returns the exit code.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> i32 {
        let mut quit: Option<i32> = None;
        let mut internal: Vec<Event> = Vec::new();
        let mut started = false;
        let mut last_mouse: Option<(u16, u16)> = None;

        loop {
            if let Some(signal) = take_shutdown_signal() {
                info!("shutting down on signal {signal}");
                let code = 128 + signal;
                self.shutdown(handler, code);
                reraise_default(signal);
                return code;
            }
            if let Some(code) = quit {
                self.shutdown(handler, code);
                return code;
            }

            if take_resize_pending() {
                let old = self.screen.size();
                let size = self.screen.get_terminal_size();
                internal.push(Event::Resize(ResizeEvent { size, old }));
                self.screen.set_size(size);

                let first_resize = old.is_empty();
                if first_resize && !started {
                    started = true;
                    let mut ctx = Context {
                        screen: &mut self.screen,
                        input: &self.input,
                        quit: &mut quit,
                    };
                    handler.on_app_start(&mut ctx);
                }
            }

            for event in std::mem::take(&mut internal) {
                let mut ctx = Context {
                    screen: &mut self.screen,
                    input: &self.input,
                    quit: &mut quit,
                };
                dispatch(handler, &mut ctx, event, &mut last_mouse);
            }

            self.screen.update();

            match self.input.read() {
                Ok(events) => {
                    for event in events {
                        let mut ctx = Context {
                            screen: &mut self.screen,
                            input: &self.input,
                            quit: &mut quit,
                        };
                        dispatch(handler, &mut ctx, event, &mut last_mouse);
                    }
                }
                Err(err) => {
                    if is_fatal(&err) {
                        warn!("fatal input error, shutting down: {err}");
                        quit = Some(1);
                    } else {
                        warn!("transient input error: {err}");
                    }
                }
            }
        }
    }

    pub fn shutdown_now(&mut self, handler: &mut dyn EventHandler, code: i32) {
        self.shutdown(handler, code);
    }

    /// Orderly shutdown: exit callback, timer teardown, terminal restore.
    /// Idempotent.
    fn shutdown(&mut self, handler: &mut dyn EventHandler, code: i32) {
        if self.exited {
            return;
        }
        self.exited = true;
        handler.on_app_exit(code);
        self.input.timers().cancel_all();
        self.modes.restore();
    }
}

/// Loss of the underlying descriptors cannot be retried; everything else is
/// logged and the loop continues.
fn is_fatal(err: &Error) -> bool {
    match err {
        Error::SystemCall { source, .. } => matches!(
            source.raw_os_error(),
            Some(libc::EBADF) | Some(libc::EIO) | Some(libc::ENXIO)
        ),
        _ => false,
    }
}

fn dispatch(
    handler: &mut dyn EventHandler,
    ctx: &mut Context<'_>,
    event: Event,
    last_mouse: &mut Option<(u16, u16)>,
) {
    match event {
        Event::Key(event) => handler.on_key(ctx, event),
        Event::Input(event) => handler.on_input(ctx, event),
        Event::MouseButton(event) => handler.on_mouse_button(ctx, event),
        Event::MouseMove(event) => {
            // Coalesce repeats at the last delivered coordinate.
            if *last_mouse == Some((event.x, event.y)) {
                return;
            }
            *last_mouse = Some((event.x, event.y));
            handler.on_mouse_move(ctx, event);
        }
        Event::MouseWheel(event) => handler.on_mouse_wheel(ctx, event),
        Event::Resize(event) => handler.on_resize(ctx, event),
        Event::Focus(event) => handler.on_focus(ctx, event),
        Event::Render => handler.on_render(ctx),
    }
}
