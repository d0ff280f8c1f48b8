//! Busy-wait loop shared by every suspension point (peer publication, barrier).

use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;

use crate::config::CollConfig;
use crate::error::CollError;

/// A bounded wait expired before its condition held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    pub waited: Duration,
}

impl TimedOut {
    pub(crate) fn into_error(self, operation: &'static str, phase: &'static str) -> CollError {
        CollError::WaitTimeout {
            operation,
            phase,
            waited_ms: u64::try_from(self.waited.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// How a rank waits on a peer: spin first, then back off, optionally give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    spin_limit: u32,
    timeout: Option<Duration>,
}

impl WaitPolicy {
    pub fn new(spin_limit: u32, timeout: Option<Duration>) -> Self {
        Self {
            spin_limit,
            timeout,
        }
    }

    pub fn from_config(cfg: &CollConfig) -> Self {
        Self::new(cfg.spin_limit, cfg.wait_timeout)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Poll `ready` until it returns true.
    ///
    /// The first `spin_limit` polls are pure spins. After that the loop
    /// snoozes with exponential backoff and, once backoff saturates, yields
    /// the thread between polls. The deadline is only checked after the
    /// spin phase.
    pub fn wait_until(&self, mut ready: impl FnMut() -> bool) -> Result<(), TimedOut> {
        for _ in 0..self.spin_limit {
            if ready() {
                return Ok(());
            }
            std::hint::spin_loop();
        }

        let start = Instant::now();
        let backoff = Backoff::new();
        loop {
            if ready() {
                return Ok(());
            }
            if let Some(limit) = self.timeout {
                let waited = start.elapsed();
                if waited >= limit {
                    return Err(TimedOut { waited });
                }
            }
            if backoff.is_completed() {
                std::thread::yield_now();
            } else {
                backoff.snooze();
            }
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from_config(&CollConfig::default())
    }
}
