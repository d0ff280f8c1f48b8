//! Runtime-configurable tuning parameters for shmcoll.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `SHMCOLL_`) or by constructing a custom `CollConfig`.

use std::time::Duration;

/// Tuning parameters for communicators and collectives.
#[derive(Debug, Clone)]
pub struct CollConfig {
    /// Upper bound on any single wait (peer publication, barrier).
    /// `None` waits forever.
    pub wait_timeout: Option<Duration>,

    /// Busy spins before a waiting rank starts yielding its thread.
    pub spin_limit: u32,

    /// Maximum number of simultaneously live communicators per context.
    pub max_communicators: usize,

    /// Number of reusable scratch buffers kept for in-place collectives.
    pub scratch_pool_buffers: usize,

    /// Capacity of each pooled scratch buffer. Larger requests bypass the pool.
    pub scratch_buf_capacity: usize,
}

impl Default for CollConfig {
    fn default() -> Self {
        Self {
            wait_timeout: None,
            spin_limit: 1 << 10,
            max_communicators: 100,
            scratch_pool_buffers: 8,
            scratch_buf_capacity: 4 * 1024 * 1024, // 4 MiB
        }
    }
}

impl CollConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `SHMCOLL_WAIT_TIMEOUT_MS` (`0` means unbounded)
    /// - `SHMCOLL_SPIN_LIMIT`
    /// - `SHMCOLL_MAX_COMMUNICATORS`
    /// - `SHMCOLL_SCRATCH_POOL_BUFFERS`
    /// - `SHMCOLL_SCRATCH_BUF_BYTES`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(ms) = lookup("SHMCOLL_WAIT_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            cfg.wait_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(n) = lookup("SHMCOLL_SPIN_LIMIT").and_then(|v| v.parse::<u32>().ok()) {
            cfg.spin_limit = n;
        }
        if let Some(n) = lookup("SHMCOLL_MAX_COMMUNICATORS").and_then(|v| v.parse::<usize>().ok())
        {
            cfg.max_communicators = n;
        }
        if let Some(n) =
            lookup("SHMCOLL_SCRATCH_POOL_BUFFERS").and_then(|v| v.parse::<usize>().ok())
        {
            cfg.scratch_pool_buffers = n;
        }
        if let Some(n) = lookup("SHMCOLL_SCRATCH_BUF_BYTES").and_then(|v| v.parse::<usize>().ok())
        {
            cfg.scratch_buf_capacity = n;
        }

        cfg
    }

    /// Builder-style override of the wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }
}
