use std::fmt;
use std::fmt::Display;

use chrono::{Duration, Utc};

use crate::runtime_error::{RuntimeError, RuntimeResult};

/// Prevents overflow when storing ms-precision time in i64.
pub const MAX_DURATION_MSECS: i64 = 100 * 365 * 24 * 3600 * 1000;

/// Deadline contains a deadline with the corresponding timeout for pretty
/// error messages.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Deadline {
    /// Deadline as a unix timestamp in milliseconds.
    pub deadline: i64,
    pub timeout: Duration,
}

impl Deadline {
    /// Returns a deadline for the given timeout, starting now.
    pub fn new(timeout: Duration) -> RuntimeResult<Self> {
        Deadline::with_start_time(Utc::now().timestamp_millis(), timeout)
    }

    /// Returns a deadline for the given start time and timeout.
    pub fn with_start_time(start_time: i64, timeout: Duration) -> RuntimeResult<Self> {
        let millis = timeout.num_milliseconds();
        if millis > MAX_DURATION_MSECS {
            return Err(RuntimeError::ArgumentError(format!(
                "timeout value too large: {timeout}"
            )));
        }
        if millis < 0 {
            return Err(RuntimeError::ArgumentError(format!(
                "negative timeouts are not supported; got {timeout}"
            )));
        }
        Ok(Deadline {
            deadline: start_time + millis,
            timeout,
        })
    }

    /// Returns true if the deadline is exceeded.
    pub fn exceeded(&self) -> bool {
        Utc::now().timestamp_millis() > self.deadline
    }

    /// Time left until the deadline, clamped at zero, in a form tokio's
    /// timers accept.
    pub fn remaining(&self) -> std::time::Duration {
        let left = self.deadline - Utc::now().timestamp_millis();
        std::time::Duration::from_millis(left.max(0) as u64)
    }
}

impl Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deadline in {}ms (timeout {})",
            self.remaining().as_millis(),
            self.timeout
        )
    }
}
