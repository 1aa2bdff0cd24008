//! Poll-based event multiplexer: stdin, the render trigger and timer fds.
//!
//! Invariant: blocking happens only inside [`EventMux::wait`]; timer
//! callbacks run on the caller's thread with the timer table unlocked, so a
//! callback may register or cancel timers, including its own.

use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::Error;

/// At most this many timers may be registered concurrently.
pub const MAX_TIMERS: usize = 16;
/// Any non-zero timer duration must be at least this long.
pub const MIN_TIMER_DURATION: Duration = Duration::from_millis(10);

const INPUT_SLOT: usize = 0;
const TRIGGER_SLOT: usize = 1;
const FIRST_TIMER_SLOT: usize = 2;
const POLL_SLOTS: usize = FIRST_TIMER_SLOT + MAX_TIMERS;

/// Which source caused the poll to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    InputReceived,
    SignalReceived,
    RenderTriggered,
    TimerTriggered,
}

/// Observable timer statistics, updated on every fire.
#[derive(Debug, Clone, Default)]
pub struct TimerStats {
    pub trigger_count: u64,
    /// Periodic expirations that elapsed unserviced between two polls.
    pub triggers_missed: u64,
    /// How late the most recent fire was versus its scheduled time.
    pub lag: Duration,
    pub last_trigger: Option<Instant>,
}

/// Immutable timer identity plus a mutex-guarded stats snapshot, shared
/// between the multiplexer's record and the caller's [`Timer`] handle.
#[derive(Debug)]
pub struct TimerShared {
    id: u64,
    initial: Duration,
    interval: Duration,
    created: Instant,
    stats: Mutex<TimerStats>,
}

impl TimerShared {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn stats(&self) -> TimerStats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn stats_mut(&self) -> MutexGuard<'_, TimerStats> {
        match self.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Handle to a registered timer.
///
/// The handle only observes; the multiplexer owns the record. Cancellation
/// may come from either side and is idempotent. With `cancel_on_drop` set,
/// dropping the handle cancels the timer.
#[derive(Debug)]
pub struct Timer {
    shared: Arc<TimerShared>,
    set: Weak<TimerSet>,
    cancel_on_drop: bool,
}

impl Timer {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn stats(&self) -> TimerStats {
        self.shared.stats()
    }

    pub fn trigger_count(&self) -> u64 {
        self.shared.stats().trigger_count
    }

    /// True while the multiplexer still holds a record for this timer.
    pub fn is_active(&self) -> bool {
        self.set
            .upgrade()
            .is_some_and(|set| set.is_active(self.shared.id))
    }

    pub fn cancel(&self) {
        if let Some(set) = self.set.upgrade() {
            set.cancel_id(self.shared.id);
        }
    }

    pub fn set_cancel_on_drop(&mut self, cancel: bool) {
        self.cancel_on_drop = cancel;
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.cancel_on_drop {
            self.cancel();
        }
    }
}

struct TimerRecord {
    fd: RawFd,
    single_shot: bool,
    /// Taken out for the duration of a fire so the callback can re-enter the
    /// public timer API.
    callback: Option<Box<dyn FnMut() + Send>>,
    shared: Arc<TimerShared>,
}

#[derive(Default)]
struct TimerTable {
    records: Vec<TimerRecord>,
}

/// The timer registry, shared between the multiplexer and timer handles.
pub struct TimerSet {
    input_fd: RawFd,
    trigger_fd: RawFd,
    next_id: AtomicU64,
    table: Mutex<TimerTable>,
}

impl TimerSet {
    fn lock(&self) -> MutexGuard<'_, TimerTable> {
        match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn active(&self) -> usize {
        self.lock().records.len()
    }

    fn is_active(&self, id: u64) -> bool {
        self.lock()
            .records
            .iter()
            .any(|record| record.shared.id == id)
    }

    /// Snapshot the poll set: stdin, render trigger, then each timer fd.
    fn poll_snapshot(&self) -> ([libc::pollfd; POLL_SLOTS], usize) {
        let mut fds = [libc::pollfd {
            fd: -1,
            events: 0,
            revents: 0,
        }; POLL_SLOTS];
        fds[INPUT_SLOT] = libc::pollfd {
            fd: self.input_fd,
            events: libc::POLLIN,
            revents: 0,
        };
        fds[TRIGGER_SLOT] = libc::pollfd {
            fd: self.trigger_fd,
            events: libc::POLLIN,
            revents: 0,
        };

        let table = self.lock();
        for (idx, record) in table.records.iter().enumerate() {
            fds[FIRST_TIMER_SLOT + idx] = libc::pollfd {
                fd: record.fd,
                events: libc::POLLIN,
                revents: 0,
            };
        }
        (fds, FIRST_TIMER_SLOT + table.records.len())
    }

    fn register(
        &self,
        set: &Arc<TimerSet>,
        initial: Duration,
        interval: Duration,
        callback: Box<dyn FnMut() + Send>,
    ) -> Result<Timer, Error> {
        if initial.is_zero() && interval.is_zero() {
            return Err(Error::InvalidDuration {
                initial,
                interval,
                min: MIN_TIMER_DURATION,
            });
        }
        for duration in [initial, interval] {
            if !duration.is_zero() && duration < MIN_TIMER_DURATION {
                return Err(Error::InvalidDuration {
                    initial,
                    interval,
                    min: MIN_TIMER_DURATION,
                });
            }
        }

        let mut table = self.lock();
        if table.records.len() >= MAX_TIMERS {
            return Err(Error::TooManyTimers { max: MAX_TIMERS });
        }

        let fd = create_timer_fd(initial, interval)?;
        let shared = Arc::new(TimerShared {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            initial,
            interval,
            created: Instant::now(),
            stats: Mutex::new(TimerStats::default()),
        });
        table.records.push(TimerRecord {
            fd,
            single_shot: interval.is_zero(),
            callback: Some(callback),
            shared: Arc::clone(&shared),
        });
        debug!("timers enabled: {}", table.records.len());

        Ok(Timer {
            shared,
            set: Arc::downgrade(set),
            cancel_on_drop: false,
        })
    }

    fn cancel_id(&self, id: u64) {
        let mut table = self.lock();
        let Some(idx) = table
            .records
            .iter()
            .position(|record| record.shared.id == id)
        else {
            return;
        };
        let record = table.records.remove(idx);
        unsafe {
            libc::close(record.fd);
        }
        debug!("timers enabled: {}", table.records.len());
    }

    pub fn cancel_all(&self) {
        let mut table = self.lock();
        for record in table.records.drain(..) {
            unsafe {
                libc::close(record.fd);
            }
        }
    }

    /// Service one fired timer fd: update stats, run the callback with the
    /// table unlocked, then either auto-cancel (single-shot) or account for
    /// missed periodic expirations.
    fn fire(&self, fd: RawFd) -> bool {
        let (mut callback, shared, single_shot) = {
            let mut table = self.lock();
            let Some(record) = table.records.iter_mut().find(|record| record.fd == fd) else {
                // Cancelled by an earlier callback in this same wakeup.
                return false;
            };
            (
                record.callback.take(),
                Arc::clone(&record.shared),
                record.single_shot,
            )
        };

        let now = Instant::now();
        {
            let mut stats = shared.stats_mut();
            let scheduled = if stats.trigger_count == 0 {
                shared.created + shared.initial
            } else {
                stats.last_trigger.unwrap_or(shared.created) + shared.interval
            };
            stats.lag = now.saturating_duration_since(scheduled);
            stats.last_trigger = Some(now);
            stats.trigger_count += 1;
        }

        if let Some(callback) = callback.as_mut() {
            callback();
        }

        if single_shot {
            self.cancel_id(shared.id);
            return true;
        }

        let mut table = self.lock();
        if let Some(record) = table
            .records
            .iter_mut()
            .find(|record| record.shared.id == shared.id)
        {
            // Reading the timer fd returns expirations since the last read;
            // anything beyond the one serviced here was missed.
            if let Some(count) = read_counter(record.fd) {
                if count > 1 {
                    shared.stats_mut().triggers_missed += count - 1;
                }
            }
            record.callback = callback;
        }
        true
    }
}

/// Waits on stdin, the render event-fd and all active timer fds, reporting
/// a single wakeup reason per call.
pub struct EventMux {
    timers: Arc<TimerSet>,
}

impl EventMux {
    pub fn new(input_fd: RawFd) -> Result<Self, Error> {
        let trigger_fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if trigger_fd < 0 {
            return Err(Error::last_system_call("eventfd"));
        }
        Ok(Self {
            timers: Arc::new(TimerSet {
                input_fd,
                trigger_fd,
                next_id: AtomicU64::new(0),
                table: Mutex::new(TimerTable::default()),
            }),
        })
    }

    pub fn timers(&self) -> &Arc<TimerSet> {
        &self.timers
    }

    /// Register a timer. `interval == 0` makes it single-shot. Fails with
    /// `TooManyTimers` past the registry limit and `InvalidDuration` for
    /// zero/too-short durations.
    pub fn set_timer(
        &self,
        initial: Duration,
        interval: Duration,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<Timer, Error> {
        self.timers
            .register(&self.timers, initial, interval, Box::new(callback))
    }

    /// Cancel a timer. Idempotent; a never-registered handle is a no-op.
    pub fn cancel_timer(&self, timer: &Timer) {
        self.timers.cancel_id(timer.id());
    }

    /// Handle for requesting a redraw; cheap to clone and safe to use from
    /// signal context (a single `write` on an event-fd).
    pub fn render_trigger(&self) -> RenderTrigger {
        RenderTrigger {
            fd: self.timers.trigger_fd,
        }
    }

    /// Block until one source fires.
    ///
    /// Dispatch priority: stdin first (timers are observed on the next
    /// poll), then the render trigger, then timers (all fired timers are
    /// drained in one wakeup). A signal interrupting the poll reports
    /// `SignalReceived`.
    pub fn wait(&self) -> Result<WakeReason, Error> {
        loop {
            let (mut fds, count) = self.timers.poll_snapshot();

            let mut sigs = MaybeUninit::<libc::sigset_t>::uninit();
            unsafe {
                libc::sigemptyset(sigs.as_mut_ptr());
            }
            let sigs = unsafe { sigs.assume_init() };

            let rc = unsafe {
                libc::ppoll(
                    fds.as_mut_ptr(),
                    count as libc::nfds_t,
                    ptr::null(),
                    &sigs,
                )
            };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    return Ok(WakeReason::SignalReceived);
                }
                return Err(Error::system_call("ppoll", err));
            }

            if fds[INPUT_SLOT].revents != 0 {
                return Ok(WakeReason::InputReceived);
            }

            if fds[TRIGGER_SLOT].revents != 0 {
                // Coalesced: one read drains however many triggers piled up.
                if read_counter(fds[TRIGGER_SLOT].fd).is_none() {
                    warn!("render trigger fd read failed");
                }
                return Ok(WakeReason::RenderTriggered);
            }

            let mut fired = false;
            for slot in &fds[FIRST_TIMER_SLOT..count] {
                if slot.revents != 0 && self.timers.fire(slot.fd) {
                    fired = true;
                }
            }
            if fired {
                return Ok(WakeReason::TimerTriggered);
            }
        }
    }
}

impl Drop for EventMux {
    fn drop(&mut self) {
        self.timers.cancel_all();
        unsafe {
            libc::close(self.timers.trigger_fd);
        }
    }
}

/// Clonable redraw request handle backed by the multiplexer's event-fd.
#[derive(Debug, Clone, Copy)]
pub struct RenderTrigger {
    fd: RawFd,
}

impl RenderTrigger {
    /// Request a redraw. Back-to-back triggers coalesce into a single
    /// render wakeup.
    pub fn trigger(&self) {
        let value: u64 = 1;
        let rc = unsafe {
            libc::write(
                self.fd,
                &value as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if rc < 0 {
            warn!("render trigger write failed");
        }
    }
}

fn duration_to_timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: libc::c_long::from(duration.subsec_nanos() as i32),
    }
}

fn create_timer_fd(initial: Duration, interval: Duration) -> Result<RawFd, Error> {
    let fd = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_CLOEXEC) };
    if fd < 0 {
        return Err(Error::last_system_call("timerfd_create"));
    }

    // An all-zero it_value would disarm the fd, so a zero initial delay
    // starts the first fire one interval out.
    let first = if initial.is_zero() { interval } else { initial };
    let spec = libc::itimerspec {
        it_interval: duration_to_timespec(interval),
        it_value: duration_to_timespec(first),
    };
    let rc = unsafe { libc::timerfd_settime(fd, 0, &spec, ptr::null_mut()) };
    if rc != 0 {
        let err = Error::last_system_call("timerfd_settime");
        unsafe {
            libc::close(fd);
        }
        return Err(err);
    }
    Ok(fd)
}

/// Read the 8-byte counter of an event-fd or timer fd.
fn read_counter(fd: RawFd) -> Option<u64> {
    let mut value: u64 = 0;
    let rc = unsafe {
        libc::read(
            fd,
            &mut value as *mut u64 as *mut libc::c_void,
            std::mem::size_of::<u64>(),
        )
    };
    if rc == std::mem::size_of::<u64>() as isize {
        Some(value)
    } else {
        None
    }
}
