use std::sync::Arc;

use crate::collective;
use crate::context::ContextInner;
use crate::error::{CollError, Result};
use crate::memory::{BufferView, BufferViewMut, SendSource};
use crate::shared::SharedRegion;
use crate::types::{CollElement, CommId, Rank};

/// Lifecycle of one rank's handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommState {
    Active,
    /// A wait expired or a peer aborted; collectives are refused but the
    /// handle must still be destroyed.
    Poisoned,
    Destroyed,
}

/// One rank's handle to a node-local communicator.
///
/// Created by [`CollContext::create_communicator`](crate::CollContext::create_communicator),
/// owned by the calling rank, and destroyed exactly once with
/// [`destroy`](Self::destroy). Collectives take `&mut self`: a rank runs one
/// collective at a time on a given communicator.
pub struct Communicator {
    global_rank: Rank,
    physical_rank: usize,
    rank_mapping: Option<Vec<usize>>,
    region: Arc<SharedRegion>,
    ctx: Arc<ContextInner>,
    /// Number of collectives this rank has completed. Selects the slot.
    generation: u64,
    state: CommState,
}

impl Communicator {
    pub(crate) fn new(
        global_rank: Rank,
        physical_rank: usize,
        rank_mapping: Option<Vec<usize>>,
        region: Arc<SharedRegion>,
        ctx: Arc<ContextInner>,
    ) -> Self {
        Self {
            global_rank,
            physical_rank,
            rank_mapping,
            region,
            ctx,
            generation: 0,
            state: CommState::Active,
        }
    }

    /// This rank's logical index.
    pub fn rank(&self) -> Rank {
        self.global_rank
    }

    /// Number of ranks in the communicator.
    pub fn size(&self) -> usize {
        self.region.size()
    }

    pub fn physical_rank(&self) -> usize {
        self.physical_rank
    }

    pub fn unique_id(&self) -> CommId {
        self.region.unique_id()
    }

    /// Logical → physical rank table, if one was supplied at creation.
    pub fn rank_mapping(&self) -> Option<&[usize]> {
        self.rank_mapping.as_deref()
    }

    pub fn state(&self) -> CommState {
        self.state
    }

    /// Number of collectives completed on this handle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn region(&self) -> &SharedRegion {
        &self.region
    }

    pub(crate) fn ctx(&self) -> &ContextInner {
        &self.ctx
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.state {
            CommState::Active => Ok(()),
            CommState::Poisoned => Err(CollError::CommunicatorPoisoned {
                unique_id: self.unique_id(),
            }),
            CommState::Destroyed => Err(CollError::AlreadyDestroyed {
                unique_id: self.unique_id(),
                rank: self.global_rank,
            }),
        }
    }

    pub(crate) fn advance(&mut self) {
        self.generation += 1;
    }

    pub(crate) fn mark_poisoned(&mut self) {
        self.state = CommState::Poisoned;
    }

    /// Release this rank's share of the communicator.
    ///
    /// `scheduled_rank` is the index the runtime ran this teardown on; it
    /// must match the handle's rank. Healthy communicators rendezvous with
    /// every peer first, so no rank frees shared state another rank is
    /// still using. Poisoned communicators skip the rendezvous.
    pub fn destroy(&mut self, scheduled_rank: Rank) -> Result<()> {
        if self.state == CommState::Destroyed {
            return Err(CollError::AlreadyDestroyed {
                unique_id: self.unique_id(),
                rank: self.global_rank,
            });
        }
        if scheduled_rank != self.global_rank {
            return Err(CollError::ScheduledRankMismatch {
                expected: scheduled_rank,
                actual: self.global_rank,
            });
        }

        let mut outcome = Ok(());
        if self.state == CommState::Active {
            let region = &self.region;
            match region
                .barrier()
                .wait_or_abort(self.ctx.policy(), || region.is_poisoned())
            {
                Ok(_) => {}
                Err(timed_out) => {
                    tracing::warn!(
                        unique_id = region.unique_id(),
                        rank = self.global_rank,
                        "destroy rendezvous timed out"
                    );
                    region.poison();
                    outcome = Err(timed_out.into_error("destroy", "rendezvous"));
                }
            }
        }

        self.state = CommState::Destroyed;
        self.ctx.release(&self.region, self.global_rank)?;
        tracing::info!(
            unique_id = self.unique_id(),
            rank = self.global_rank,
            "communicator destroyed"
        );
        outcome
    }

    // ========================================================================
    // Collective operations
    // ========================================================================

    /// Fixed-size all-to-all over byte views.
    ///
    /// Segment `r` of the send data (`sendcount` elements) goes to rank `r`;
    /// receive segment `r` is filled with what rank `r` sent here.
    pub fn alltoall(
        &mut self,
        send: SendSource<'_>,
        sendcount: usize,
        recv: BufferViewMut<'_>,
        recvcount: usize,
    ) -> Result<()> {
        collective::alltoall(self, send, sendcount, recv, recvcount)
    }

    /// Variable-size all-to-all over byte views.
    ///
    /// Counts and displacements are in elements and have one entry per rank.
    #[allow(clippy::too_many_arguments)]
    pub fn alltoallv(
        &mut self,
        send: SendSource<'_>,
        sendcounts: &[usize],
        sdispls: &[usize],
        recv: BufferViewMut<'_>,
        recvcounts: &[usize],
        rdispls: &[usize],
    ) -> Result<()> {
        collective::alltoallv(self, send, sendcounts, sdispls, recv, recvcounts, rdispls)
    }

    /// Allgather over byte views: every rank contributes `sendcount`
    /// elements; receive block `r` holds rank `r`'s contribution.
    pub fn allgather(
        &mut self,
        send: SendSource<'_>,
        sendcount: usize,
        recv: BufferViewMut<'_>,
        recvcount: usize,
    ) -> Result<()> {
        collective::allgather(self, send, sendcount, recv, recvcount)
    }

    /// Elements per rank when `len` elements are split evenly across the
    /// communicator.
    fn per_rank(&self, operation: &'static str, len: usize) -> Result<usize> {
        let world_size = self.size();
        if len % world_size != 0 {
            return Err(CollError::UnevenSplit {
                operation,
                len,
                world_size,
            });
        }
        Ok(len / world_size)
    }

    /// All-to-all on typed slices. Both slices must have the same length,
    /// a multiple of the communicator size.
    pub fn alltoall_slice<T: CollElement>(&mut self, send: &[T], recv: &mut [T]) -> Result<()> {
        if send.len() != recv.len() {
            return Err(CollError::CountMismatch {
                operation: "alltoall",
                send: send.len(),
                recv: recv.len(),
            });
        }
        let count = self.per_rank("alltoall", send.len())?;
        self.alltoall(
            BufferView::of(send).into(),
            count,
            BufferViewMut::of(recv),
            count,
        )
    }

    /// In-place all-to-all: `buf` is both the send and the receive buffer.
    pub fn alltoall_in_place<T: CollElement>(&mut self, buf: &mut [T]) -> Result<()> {
        let count = self.per_rank("alltoall", buf.len())?;
        self.alltoall(SendSource::InPlace, count, BufferViewMut::of(buf), count)
    }

    pub fn alltoallv_slice<T: CollElement>(
        &mut self,
        send: &[T],
        sendcounts: &[usize],
        sdispls: &[usize],
        recv: &mut [T],
        recvcounts: &[usize],
        rdispls: &[usize],
    ) -> Result<()> {
        self.alltoallv(
            BufferView::of(send).into(),
            sendcounts,
            sdispls,
            BufferViewMut::of(recv),
            recvcounts,
            rdispls,
        )
    }

    pub fn alltoallv_in_place<T: CollElement>(
        &mut self,
        buf: &mut [T],
        sendcounts: &[usize],
        sdispls: &[usize],
        recvcounts: &[usize],
        rdispls: &[usize],
    ) -> Result<()> {
        self.alltoallv(
            SendSource::InPlace,
            sendcounts,
            sdispls,
            BufferViewMut::of(buf),
            recvcounts,
            rdispls,
        )
    }

    /// Allgather on typed slices. `recv` must hold exactly one `send`-sized
    /// block per rank.
    pub fn allgather_slice<T: CollElement>(&mut self, send: &[T], recv: &mut [T]) -> Result<()> {
        let count = self.per_rank("allgather", recv.len())?;
        if count != send.len() {
            return Err(CollError::CountMismatch {
                operation: "allgather",
                send: send.len(),
                recv: count,
            });
        }
        self.allgather(
            BufferView::of(send).into(),
            count,
            BufferViewMut::of(recv),
            count,
        )
    }

    /// In-place allgather: this rank's contribution is read from its own
    /// block of `buf`.
    pub fn allgather_in_place<T: CollElement>(&mut self, buf: &mut [T]) -> Result<()> {
        let count = self.per_rank("allgather", buf.len())?;
        self.allgather(SendSource::InPlace, count, BufferViewMut::of(buf), count)
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("unique_id", &self.unique_id())
            .field("global_rank", &self.global_rank)
            .field("size", &self.size())
            .field("physical_rank", &self.physical_rank)
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        if self.state == CommState::Destroyed {
            return;
        }
        tracing::warn!(
            unique_id = self.unique_id(),
            rank = self.global_rank,
            "communicator dropped without destroy; detaching"
        );
        if let Err(e) = self.ctx.release(&self.region, self.global_rank) {
            tracing::warn!(error = %e, "failed to detach communicator");
        }
    }
}
