//! Raw-mode terminal setup, size queries and the signal-handler shim.
//!
//! Signal handlers never touch the screen or timer tables: they only store
//! into process-wide atomics which the application loop polls between
//! wakeups.

use std::cell::UnsafeCell;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use bitflags::bitflags;
use log::warn;

use crate::core::geometry::Size;
use crate::error::Error;

bitflags! {
    /// Which terminal protocols the runtime enables on startup. These govern
    /// what the terminal is instructed to emit, not what the decoder can
    /// parse.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Options: u8 {
        const FULLSCREEN          = 1 << 0;
        const HIDE_CURSOR         = 1 << 1;
        const MOUSE_BUTTON_EVENTS = 1 << 2;
        const MOUSE_MOVE_EVENTS   = 1 << 3;
        const MOUSE_EVENTS        = Self::MOUSE_BUTTON_EVENTS.bits() | Self::MOUSE_MOVE_EVENTS.bits();
        const NO_SIGNAL_DECODE    = 1 << 4;
    }
}

const ENTER_ALT_SCREEN: &str = "\x1b[?1049h";
const LEAVE_ALT_SCREEN: &str = "\x1b[?1049l";
const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";
const ENABLE_BUTTON_MOUSE: &str = "\x1b[?1002h";
const DISABLE_BUTTON_MOUSE: &str = "\x1b[?1002l";
const ENABLE_ANY_MOUSE: &str = "\x1b[?1003h";
const DISABLE_ANY_MOUSE: &str = "\x1b[?1003l";
const ENABLE_SGR_MOUSE: &str = "\x1b[?1006h";
const DISABLE_SGR_MOUSE: &str = "\x1b[?1006l";
const ENABLE_FOCUS_REPORTS: &str = "\x1b[?1004h";
const DISABLE_FOCUS_REPORTS: &str = "\x1b[?1004l";
const RESET_ATTRIBUTES: &str = "\x1b[0m";

/// Write all of `data`, retrying on short writes.
pub fn write_fd(fd: RawFd, data: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < data.len() {
        let rc = unsafe {
            libc::write(
                fd,
                data[written..].as_ptr() as *const libc::c_void,
                data.len() - written,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
        }
        written += rc as usize;
    }
    Ok(())
}

/// An `io::Write` sink over a raw file descriptor.
#[derive(Debug)]
pub struct FdWriter {
    fd: RawFd,
}

impl FdWriter {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }
}

impl io::Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        write_fd(self.fd, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn read_winsize(fd: RawFd) -> Option<Size> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let rc = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) };
    if rc == 0 && size.ws_col > 0 && size.ws_row > 0 {
        Some(Size::new(size.ws_col, size.ws_row))
    } else {
        None
    }
}

/// Puts the terminal into raw mode and enables the option-governed
/// protocols; restores everything on [`TerminalModes::restore`] or drop.
pub struct TerminalModes {
    in_fd: RawFd,
    out_fd: RawFd,
    options: Options,
    original: Option<libc::termios>,
}

impl TerminalModes {
    pub fn acquire(options: Options) -> Result<Self, Error> {
        Self::acquire_on(libc::STDIN_FILENO, libc::STDOUT_FILENO, options)
    }

    pub fn acquire_on(in_fd: RawFd, out_fd: RawFd, options: Options) -> Result<Self, Error> {
        let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
        let rc = unsafe { libc::tcgetattr(in_fd, &mut termios) };
        if rc != 0 {
            return Err(Error::last_system_call("tcgetattr"));
        }

        let mut raw = termios;
        unsafe {
            libc::cfmakeraw(&mut raw);
        }
        let rc = unsafe { libc::tcsetattr(in_fd, libc::TCSANOW, &raw) };
        if rc != 0 {
            return Err(Error::last_system_call("tcsetattr"));
        }

        arm_emergency_restore(in_fd, out_fd, &termios);

        let modes = Self {
            in_fd,
            out_fd,
            options,
            original: Some(termios),
        };
        modes.write_control(&modes.enable_sequence());
        Ok(modes)
    }

    fn enable_sequence(&self) -> String {
        let mut seq = String::new();
        if self.options.contains(Options::FULLSCREEN) {
            seq.push_str(ENTER_ALT_SCREEN);
        }
        if self.options.contains(Options::HIDE_CURSOR) {
            seq.push_str(HIDE_CURSOR);
        }
        if self.options.contains(Options::MOUSE_MOVE_EVENTS) {
            seq.push_str(ENABLE_ANY_MOUSE);
        } else if self.options.contains(Options::MOUSE_BUTTON_EVENTS) {
            seq.push_str(ENABLE_BUTTON_MOUSE);
        }
        if self.options.intersects(Options::MOUSE_EVENTS) {
            seq.push_str(ENABLE_SGR_MOUSE);
        }
        seq.push_str(ENABLE_FOCUS_REPORTS);
        seq
    }

    fn restore_sequence(&self) -> String {
        let mut seq = String::from(DISABLE_FOCUS_REPORTS);
        if self.options.intersects(Options::MOUSE_EVENTS) {
            seq.push_str(DISABLE_SGR_MOUSE);
        }
        if self.options.contains(Options::MOUSE_MOVE_EVENTS) {
            seq.push_str(DISABLE_ANY_MOUSE);
        } else if self.options.contains(Options::MOUSE_BUTTON_EVENTS) {
            seq.push_str(DISABLE_BUTTON_MOUSE);
        }
        seq.push_str(RESET_ATTRIBUTES);
        if self.options.contains(Options::HIDE_CURSOR) {
            seq.push_str(SHOW_CURSOR);
        }
        if self.options.contains(Options::FULLSCREEN) {
            seq.push_str(LEAVE_ALT_SCREEN);
        }
        seq
    }

    fn write_control(&self, data: &str) {
        if let Err(err) = write_fd(self.out_fd, data.as_bytes()) {
            warn!("terminal control write failed: {err}");
        }
    }

    pub fn out_fd(&self) -> RawFd {
        self.out_fd
    }

    pub fn size(&self) -> Size {
        read_winsize(self.out_fd).unwrap_or(Size::new(80, 24))
    }

    /// Undo protocol toggles and leave raw mode. Idempotent.
    pub fn restore(&mut self) {
        let Some(original) = self.original.take() else {
            return;
        };
        self.write_control(&self.restore_sequence());
        // Flush pending input so buffered bytes don't leak to the shell.
        let _ = unsafe { libc::tcflush(self.in_fd, libc::TCIFLUSH) };
        let rc = unsafe { libc::tcsetattr(self.in_fd, libc::TCSANOW, &original) };
        if rc != 0 {
            warn!("failed to restore terminal attributes");
        }
    }
}

impl Drop for TerminalModes {
    fn drop(&mut self) {
        self.restore();
    }
}

static RESIZE_PENDING: AtomicBool = AtomicBool::new(false);
static SHUTDOWN_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Terminal state for the in-handler restore. SIGFPE cannot defer to the
/// poll loop (a returning handler re-executes the faulting instruction), so
/// its handler must put the terminal back itself.
struct EmergencyRestore {
    armed: AtomicBool,
    in_fd: AtomicI32,
    out_fd: AtomicI32,
    termios: UnsafeCell<libc::termios>,
}

// Written once by arm_emergency_restore before `armed` is released.
unsafe impl Sync for EmergencyRestore {}

static EMERGENCY: EmergencyRestore = EmergencyRestore {
    armed: AtomicBool::new(false),
    in_fd: AtomicI32::new(-1),
    out_fd: AtomicI32::new(-1),
    termios: UnsafeCell::new(unsafe { std::mem::zeroed() }),
};

/// Protocol teardown for the emergency path. The toggles are idempotent and
/// ignored by terminals that never saw the matching enable.
const EMERGENCY_RESTORE_SEQ: &[u8] =
    b"\x1b[?1004l\x1b[?1006l\x1b[?1003l\x1b[?1002l\x1b[0m\x1b[?25h\x1b[?1049l";

fn arm_emergency_restore(in_fd: RawFd, out_fd: RawFd, original: &libc::termios) {
    unsafe {
        *EMERGENCY.termios.get() = *original;
    }
    EMERGENCY.in_fd.store(in_fd, Ordering::Release);
    EMERGENCY.out_fd.store(out_fd, Ordering::Release);
    EMERGENCY.armed.store(true, Ordering::Release);
}

/// Restore the terminal, then re-deliver the signal with its default
/// disposition. Never returns to the faulting instruction.
extern "C" fn fatal_arith_handler(signal: libc::c_int) {
    // Only async-signal-safe calls here: write, tcsetattr, signal, raise.
    if EMERGENCY.armed.load(Ordering::Acquire) {
        unsafe {
            let _ = libc::write(
                EMERGENCY.out_fd.load(Ordering::Acquire),
                EMERGENCY_RESTORE_SEQ.as_ptr() as *const libc::c_void,
                EMERGENCY_RESTORE_SEQ.len(),
            );
            let _ = libc::tcsetattr(
                EMERGENCY.in_fd.load(Ordering::Acquire),
                libc::TCSANOW,
                EMERGENCY.termios.get(),
            );
        }
    }
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

/// Install the signal shim: SIGWINCH raises the resize flag; SIGINT, SIGTERM
/// and SIGABRT record the signal for an orderly shutdown; SIGFPE restores
/// the terminal in-handler and re-raises immediately. All four shutdown
/// signals are skipped under `NO_SIGNAL_DECODE`. The interrupted poll
/// reports the wakeup.
pub fn install_signal_handlers(decode_shutdown_signals: bool) -> Result<(), Error> {
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGWINCH, || {
            RESIZE_PENDING.store(true, Ordering::SeqCst);
        })
        .map_err(|err| Error::system_call("sigaction", err))?;
    }

    if decode_shutdown_signals {
        for signal in [
            signal_hook::consts::SIGINT,
            signal_hook::consts::SIGTERM,
            signal_hook::consts::SIGABRT,
        ] {
            unsafe {
                signal_hook::low_level::register(signal, move || {
                    SHUTDOWN_SIGNAL.store(signal, Ordering::SeqCst);
                })
                .map_err(|err| Error::system_call("sigaction", err))?;
            }
        }

        // SIGFPE cannot go through the flag+poll path (and signal-hook
        // refuses it); register the raw in-handler teardown instead.
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = fatal_arith_handler as usize;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
        }
        if unsafe { libc::sigaction(libc::SIGFPE, &action, std::ptr::null_mut()) } != 0 {
            return Err(Error::last_system_call("sigaction"));
        }
    }
    Ok(())
}

pub fn set_resize_pending() {
    RESIZE_PENDING.store(true, Ordering::SeqCst);
}

pub fn take_resize_pending() -> bool {
    RESIZE_PENDING.swap(false, Ordering::SeqCst)
}

pub fn take_shutdown_signal() -> Option<i32> {
    match SHUTDOWN_SIGNAL.swap(0, Ordering::SeqCst) {
        0 => None,
        signal => Some(signal),
    }
}

/// Re-deliver a fatal signal with its default disposition after cleanup.
pub fn reraise_default(signal: i32) {
    let _ = signal_hook::low_level::emulate_default_handler(signal);
}
