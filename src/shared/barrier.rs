use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::wait::{TimedOut, WaitPolicy};

/// Counting barrier for the ranks of one communicator.
///
/// The last rank to arrive resets the arrival count and bumps the epoch;
/// everyone else polls the epoch through the communicator's [`WaitPolicy`].
/// Arrival is an acquire-release RMW and the epoch bump a release store, so
/// every write a rank made before arriving is visible to every rank after
/// it leaves.
///
/// A rank that times out has still been counted; the barrier is unusable
/// afterwards and the owning communicator must be poisoned.
#[derive(Debug)]
pub(crate) struct SpinBarrier {
    size: usize,
    arrived: AtomicUsize,
    epoch: AtomicU64,
}

impl SpinBarrier {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            size,
            arrived: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    /// Block until all `size` ranks have called `wait` for this epoch.
    pub(crate) fn wait(&self, policy: &WaitPolicy) -> Result<(), TimedOut> {
        self.wait_or_abort(policy, || false).map(|_| ())
    }

    /// Like [`wait`](Self::wait), but gives up as soon as `abort` returns
    /// true. Returns `Ok(false)` in that case.
    pub(crate) fn wait_or_abort(
        &self,
        policy: &WaitPolicy,
        abort: impl Fn() -> bool,
    ) -> Result<bool, TimedOut> {
        let epoch = self.epoch.load(Ordering::Acquire);
        if self.arrived.fetch_add(1, Ordering::AcqRel) + 1 == self.size {
            self.arrived.store(0, Ordering::Relaxed);
            self.epoch.fetch_add(1, Ordering::AcqRel);
            return Ok(true);
        }
        let released = || self.epoch.load(Ordering::Acquire) != epoch;
        policy.wait_until(|| released() || abort())?;
        Ok(released())
    }

    /// Number of completed barrier rounds.
    #[cfg(test)]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}
