//! The multiplexed input pipeline: fd reads through the decoder.

use std::os::unix::io::RawFd;
use std::time::Duration;

use log::debug;

use crate::config::EnvConfig;
use crate::core::event::Event;
use crate::core::input::Decoder;
use crate::error::Error;
use crate::platform::poller::{EventMux, RenderTrigger, Timer, TimerSet, WakeReason};

const READ_BUF_LEN: usize = 4096;

/// Reads stdin through the event multiplexer and the byte decoder,
/// delivering one ordered event batch per wakeup.
pub struct InputStream {
    fd: RawFd,
    mux: EventMux,
    decoder: Decoder,
    log_input: bool,
}

impl InputStream {
    pub fn new() -> Result<Self, Error> {
        Self::with_fd(libc::STDIN_FILENO)
    }

    pub fn with_fd(fd: RawFd) -> Result<Self, Error> {
        let config = EnvConfig::from_env();
        let mut decoder = Decoder::new()?;
        if let Some(ms) = config.double_click_ms {
            decoder.set_double_click_duration(Duration::from_millis(ms));
        }
        Ok(Self {
            fd,
            mux: EventMux::new(fd)?,
            decoder,
            log_input: config.log_input,
        })
    }

    pub fn set_double_click_duration(&mut self, window: Duration) {
        self.decoder.set_double_click_duration(window);
    }

    pub fn timers(&self) -> &std::sync::Arc<TimerSet> {
        self.mux.timers()
    }

    pub fn set_timer(
        &self,
        initial: Duration,
        interval: Duration,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<Timer, Error> {
        self.mux.set_timer(initial, interval, callback)
    }

    pub fn cancel_timer(&self, timer: &Timer) {
        self.mux.cancel_timer(timer);
    }

    pub fn render_trigger(&self) -> RenderTrigger {
        self.mux.render_trigger()
    }

    /// Block for the next wakeup and return its event batch.
    ///
    /// Timer wakeups run their callbacks inside the wait and return an empty
    /// batch; a signal wakeup returns empty so the loop can re-check its
    /// flags; a render wakeup yields a single `Render` event.
    pub fn read(&mut self) -> Result<Vec<Event>, Error> {
        match self.mux.wait()? {
            WakeReason::SignalReceived | WakeReason::TimerTriggered => Ok(Vec::new()),
            WakeReason::RenderTriggered => Ok(vec![Event::Render]),
            WakeReason::InputReceived => {
                let mut buf = [0u8; READ_BUF_LEN];
                let n = unsafe {
                    libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
                };
                if n < 0 {
                    let err = std::io::Error::last_os_error();
                    if err.raw_os_error() == Some(libc::EINTR) {
                        return Ok(Vec::new());
                    }
                    return Err(Error::system_call("read", err));
                }
                if n == 0 {
                    // End of input; nothing to decode.
                    return Ok(Vec::new());
                }

                self.decoder.push_bytes(&buf[..n as usize]);
                let events = self.decoder.drain();
                if self.log_input && !events.is_empty() {
                    debug!("decoded {} events from {} bytes", events.len(), n);
                }
                Ok(events)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::InputStream;
    use crate::core::event::Event;
    use crate::core::key::{Key, Modifier};

    struct Pipe {
        read_fd: libc::c_int,
        write_fd: libc::c_int,
    }

    impl Pipe {
        fn new() -> Self {
            let mut fds = [0; 2];
            let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
            assert_eq!(rc, 0, "pipe failed");
            Self {
                read_fd: fds[0],
                write_fd: fds[1],
            }
        }

        fn write(&self, bytes: &[u8]) {
            let rc = unsafe {
                libc::write(self.write_fd, bytes.as_ptr() as *const libc::c_void, bytes.len())
            };
            assert_eq!(rc, bytes.len() as isize, "pipe write failed");
        }
    }

    impl Drop for Pipe {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.read_fd);
                libc::close(self.write_fd);
            }
        }
    }

    #[test]
    fn input_bytes_become_an_ordered_batch() {
        let pipe = Pipe::new();
        let mut input = InputStream::with_fd(pipe.read_fd).expect("input stream");

        pipe.write(b"\x1b[1;5Aa");
        let events = input.read().expect("read");
        assert_eq!(
            events,
            vec![
                Event::key(Key::Up, Modifier::CTRL),
                Event::Input(crate::core::event::InputEvent { codepoint: 'a' }),
                Event::key(Key::A, Modifier::empty()),
            ]
        );
    }

    #[test]
    fn split_sequence_survives_the_read_boundary() {
        let pipe = Pipe::new();
        let mut input = InputStream::with_fd(pipe.read_fd).expect("input stream");

        pipe.write(b"\x1b[<0;10");
        assert!(input.read().expect("read").is_empty());

        pipe.write(b";5M");
        let events = input.read().expect("read");
        match events.as_slice() {
            [Event::MouseButton(ev)] => assert_eq!((ev.x, ev.y), (9, 4)),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn render_trigger_yields_one_render_event() {
        let pipe = Pipe::new();
        let mut input = InputStream::with_fd(pipe.read_fd).expect("input stream");

        input.render_trigger().trigger();
        input.render_trigger().trigger();
        assert_eq!(input.read().expect("read"), vec![Event::Render]);
    }

    #[test]
    fn timer_wakeup_returns_an_empty_batch() {
        let pipe = Pipe::new();
        let mut input = InputStream::with_fd(pipe.read_fd).expect("input stream");

        let _timer = input
            .set_timer(Duration::from_millis(10), Duration::ZERO, || {})
            .expect("set_timer");
        assert!(input.read().expect("read").is_empty());
    }
}
