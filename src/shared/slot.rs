//! Publication slots: where each rank advertises its outgoing buffer.
//!
//! Every rank owns exactly one [`SlotEntry`] per [`BufferSlot`] and is the
//! only writer of it. Peers read the entry after observing its sequence
//! number. The sequence number is the ready flag: payload fields are stored
//! first and the sequence number last, so an acquire-load that sees the
//! expected sequence also sees the payload.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::{CollError, Result};
use crate::types::Rank;

/// Sequence value of an empty entry.
const EMPTY: u64 = 0;

/// Sequence number written when publishing for `generation`.
pub(crate) const fn seq_for(generation: u64) -> u64 {
    generation + 1
}

/// One rank's publication cell.
#[derive(Debug)]
pub(crate) struct SlotEntry {
    seq: AtomicU64,
    ptr: AtomicPtr<u8>,
    len: AtomicUsize,
    displs: AtomicPtr<usize>,
    counts: AtomicPtr<usize>,
    table_len: AtomicUsize,
    /// Readers currently copying out of this entry.
    pins: AtomicUsize,
}

impl SlotEntry {
    fn new() -> Self {
        Self {
            seq: AtomicU64::new(EMPTY),
            ptr: AtomicPtr::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
            displs: AtomicPtr::new(ptr::null_mut()),
            counts: AtomicPtr::new(ptr::null_mut()),
            table_len: AtomicUsize::new(0),
            pins: AtomicUsize::new(0),
        }
    }

    /// Publish `data` (and optionally the sender's count/displacement
    /// tables) for `generation`.
    ///
    /// The caller must keep `data` and the tables alive and unmodified until
    /// either every peer has passed the trailing barrier or the entry has
    /// been retracted.
    pub(crate) fn publish(
        &self,
        generation: u64,
        data: &[u8],
        tables: Option<(&[usize], &[usize])>,
    ) -> Result<()> {
        if self.seq.load(Ordering::Relaxed) != EMPTY {
            return Err(CollError::SlotNotReclaimed { generation });
        }
        self.ptr.store(data.as_ptr().cast_mut(), Ordering::Relaxed);
        self.len.store(data.len(), Ordering::Relaxed);
        match tables {
            Some((counts, displs)) => {
                debug_assert_eq!(counts.len(), displs.len());
                self.counts.store(counts.as_ptr().cast_mut(), Ordering::Relaxed);
                self.displs.store(displs.as_ptr().cast_mut(), Ordering::Relaxed);
                self.table_len.store(displs.len(), Ordering::Relaxed);
            }
            None => {
                self.counts.store(ptr::null_mut(), Ordering::Relaxed);
                self.displs.store(ptr::null_mut(), Ordering::Relaxed);
                self.table_len.store(0, Ordering::Relaxed);
            }
        }
        self.seq.store(seq_for(generation), Ordering::SeqCst);
        Ok(())
    }

    /// Pin the entry and return its publication if it was made for
    /// `generation`. Returns `None` (and leaves the entry unpinned) otherwise.
    pub(crate) fn acquire(&self, generation: u64) -> Option<Pinned<'_>> {
        self.pins.fetch_add(1, Ordering::SeqCst);
        if self.seq.load(Ordering::SeqCst) != seq_for(generation) {
            self.pins.fetch_sub(1, Ordering::Release);
            return None;
        }
        let displs = self.displs.load(Ordering::Relaxed);
        let counts = self.counts.load(Ordering::Relaxed);
        let table_len = self.table_len.load(Ordering::Relaxed);
        Some(Pinned {
            entry: self,
            ptr: self.ptr.load(Ordering::Relaxed),
            len: self.len.load(Ordering::Relaxed),
            tables: (!displs.is_null()).then_some((counts, displs, table_len)),
        })
    }

    /// Clear the entry after every peer has passed the trailing barrier.
    pub(crate) fn reclaim(&self) {
        debug_assert_eq!(self.pins.load(Ordering::Relaxed), 0);
        self.clear();
    }

    /// Withdraw a publication on an abort path, then wait for in-flight
    /// readers to drain. Readers never block while pinned, so the drain is
    /// bounded by the length of one copy.
    pub(crate) fn retract(&self) {
        self.seq.store(EMPTY, Ordering::SeqCst);
        while self.pins.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }
        self.clear();
    }

    fn clear(&self) {
        self.ptr.store(ptr::null_mut(), Ordering::Relaxed);
        self.len.store(0, Ordering::Relaxed);
        self.displs.store(ptr::null_mut(), Ordering::Relaxed);
        self.counts.store(ptr::null_mut(), Ordering::Relaxed);
        self.table_len.store(0, Ordering::Relaxed);
        self.seq.store(EMPTY, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.seq.load(Ordering::Acquire) == EMPTY
    }
}

/// A pinned view of a peer's publication. Unpins on drop.
pub(crate) struct Pinned<'a> {
    entry: &'a SlotEntry,
    ptr: *const u8,
    len: usize,
    tables: Option<(*const usize, *const usize, usize)>,
}

impl Pinned<'_> {
    /// The published bytes.
    pub(crate) fn bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: the publisher keeps the buffer alive and unmodified until it
        // reclaims or retracts the entry; reclaim happens only after every
        // reader passed the barrier and retract waits for this pin to drop.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// The publisher's (counts, displacements) tables, if it published any.
    pub(crate) fn tables(&self) -> Option<(&[usize], &[usize])> {
        self.tables.map(|(counts, displs, len)| {
            // SAFETY: same lifetime argument as `bytes`.
            unsafe {
                (
                    std::slice::from_raw_parts(counts, len),
                    std::slice::from_raw_parts(displs, len),
                )
            }
        })
    }
}

impl Drop for Pinned<'_> {
    fn drop(&mut self) {
        self.entry.pins.fetch_sub(1, Ordering::Release);
    }
}

/// One generation's set of entries, indexed by rank. Entries are padded so
/// that ranks spinning on different peers do not share cache lines.
#[derive(Debug)]
pub(crate) struct BufferSlot {
    entries: Box<[CachePadded<SlotEntry>]>,
}

impl BufferSlot {
    fn new(ranks: usize) -> Self {
        Self {
            entries: (0..ranks)
                .map(|_| CachePadded::new(SlotEntry::new()))
                .collect(),
        }
    }

    pub(crate) fn entry(&self, rank: Rank) -> &SlotEntry {
        &self.entries[rank]
    }
}

/// Two-generation ring of slots. Generation `g` uses slot `g % 2`, so a rank
/// can publish generation `g + 1` while a slow peer is still reclaiming its
/// entry of generation `g`.
#[derive(Debug)]
pub(crate) struct SlotRing {
    slots: [BufferSlot; 2],
}

impl SlotRing {
    pub(crate) fn new(ranks: usize) -> Self {
        Self {
            slots: [BufferSlot::new(ranks), BufferSlot::new(ranks)],
        }
    }

    pub(crate) fn slot(&self, generation: u64) -> &BufferSlot {
        &self.slots[(generation % 2) as usize]
    }
}
