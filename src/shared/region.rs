use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{CollError, Result};
use crate::shared::barrier::SpinBarrier;
use crate::shared::slot::SlotRing;
use crate::types::{CommId, Rank};

/// The memory shared by all ranks of one communicator.
///
/// Created by whichever rank reaches `create` first and referenced by every
/// rank's [`Communicator`](crate::Communicator) handle through an `Arc`. It
/// lives as long as the longest-lived handle; the owning context unregisters
/// it when the last rank detaches.
#[derive(Debug)]
pub(crate) struct SharedRegion {
    unique_id: CommId,
    size: usize,
    ring: SlotRing,
    barrier: SpinBarrier,
    attached: Box<[AtomicBool]>,
    live: AtomicUsize,
    poisoned: AtomicBool,
}

impl SharedRegion {
    pub(crate) fn new(unique_id: CommId, size: usize) -> Self {
        Self {
            unique_id,
            size,
            ring: SlotRing::new(size),
            barrier: SpinBarrier::new(size),
            attached: (0..size).map(|_| AtomicBool::new(false)).collect(),
            live: AtomicUsize::new(0),
            poisoned: AtomicBool::new(false),
        }
    }

    pub(crate) fn unique_id(&self) -> CommId {
        self.unique_id
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn ring(&self) -> &SlotRing {
        &self.ring
    }

    pub(crate) fn barrier(&self) -> &SpinBarrier {
        &self.barrier
    }

    /// Claim `rank`'s seat. Each rank may attach once.
    pub(crate) fn attach(&self, rank: Rank) -> Result<()> {
        if self.attached[rank].swap(true, Ordering::AcqRel) {
            return Err(CollError::RankAlreadyAttached {
                unique_id: self.unique_id,
                rank,
            });
        }
        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Release `rank`'s seat. Returns true if this was the last attached rank.
    pub(crate) fn detach(&self, rank: Rank) -> bool {
        if !self.attached[rank].swap(false, Ordering::AcqRel) {
            return false;
        }
        self.live.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn live_ranks(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Mark the region unusable. Peers blocked on it notice and bail out.
    pub(crate) fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }
}
