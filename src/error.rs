use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("maximum number of timers ({max}) exceeded")]
    TooManyTimers { max: usize },

    #[error(
        "invalid timer durations (initial {initial:?}, interval {interval:?}): \
         both must not be zero and any non-zero duration must be >= {min:?}"
    )]
    InvalidDuration {
        initial: Duration,
        interval: Duration,
        min: Duration,
    },

    #[error("system call '{call}' failed: {source}")]
    SystemCall {
        call: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("key sequence '{sequence}' has multiple mappings: {first} and {second}")]
    KeyTableConflict {
        sequence: String,
        first: String,
        second: String,
    },
}

impl Error {
    #[must_use]
    pub fn system_call(call: &'static str, source: io::Error) -> Self {
        Self::SystemCall { call, source }
    }

    /// Last-errno variant for raw libc call sites.
    #[must_use]
    pub fn last_system_call(call: &'static str) -> Self {
        Self::SystemCall {
            call,
            source: io::Error::last_os_error(),
        }
    }
}
