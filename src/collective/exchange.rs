//! The publish → pull → barrier → reclaim cycle shared by every collective.

use crate::comm::Communicator;
use crate::error::{CollError, Result};
use crate::shared::slot::Pinned;
use crate::types::Rank;

/// Peers in the order the alltoall family drains them: the immediately
/// preceding rank first, wrapping backwards, ending with this rank itself.
pub(crate) fn backward_rotation(rank: Rank, size: usize) -> impl Iterator<Item = Rank> {
    (1..=size).map(move |i| (rank + size - i) % size)
}

/// Peers in ascending rank order.
pub(crate) fn ascending(size: usize) -> impl Iterator<Item = Rank> {
    0..size
}

/// Run one collective round on `comm`.
///
/// Publishes `outgoing` (and `tables`, if any) into this rank's entry of the
/// current generation's slot, then for each source in `order` waits for that
/// peer's publication and hands it to `pull`. The first error `pull`
/// returns stops further copies but not the round: the rank still meets its
/// peers at the barrier, because they may be reading `outgoing`. After the
/// barrier the entry is reclaimed and the generation advances.
///
/// If a wait times out, or a peer poisons the communicator, the rank
/// retracts its publication, waits out any reader still copying from it,
/// poisons the communicator, and returns the error.
pub(crate) fn run_exchange(
    comm: &mut Communicator,
    operation: &'static str,
    outgoing: &[u8],
    tables: Option<(&[usize], &[usize])>,
    order: impl Iterator<Item = Rank>,
    mut pull: impl FnMut(Rank, &Pinned<'_>) -> Result<()>,
) -> Result<()> {
    comm.ensure_active()?;

    let rank = comm.rank();
    let generation = comm.generation();
    let policy = *comm.ctx().policy();

    tracing::debug!(
        operation,
        rank,
        unique_id = comm.unique_id(),
        size = comm.size(),
        generation,
        "collective start"
    );

    let outcome = {
        let region = comm.region();
        let slot = region.ring().slot(generation);
        let mine = slot.entry(rank);
        mine.publish(generation, outgoing, tables)?;

        let mut failure: Option<CollError> = None;
        let mut abort: Option<CollError> = None;

        for source in order {
            let entry = slot.entry(source);
            let mut pinned = None;
            let waited = policy.wait_until(|| {
                if region.is_poisoned() {
                    return true;
                }
                pinned = entry.acquire(generation);
                pinned.is_some()
            });
            match (waited, pinned) {
                (Err(timed_out), _) => {
                    abort = Some(timed_out.into_error(operation, "pull"));
                    break;
                }
                (Ok(()), None) => {
                    abort = Some(CollError::CommunicatorPoisoned {
                        unique_id: region.unique_id(),
                    });
                    break;
                }
                (Ok(()), Some(peer)) => {
                    if let Err(e) = pull(source, &peer) {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        if abort.is_none() {
            match region
                .barrier()
                .wait_or_abort(&policy, || region.is_poisoned())
            {
                Ok(true) => {}
                Ok(false) => {
                    abort = Some(CollError::CommunicatorPoisoned {
                        unique_id: region.unique_id(),
                    });
                }
                Err(timed_out) => abort = Some(timed_out.into_error(operation, "barrier")),
            }
        }

        match abort {
            Some(e) => {
                mine.retract();
                region.poison();
                Err(e)
            }
            None => {
                mine.reclaim();
                failure.map_or(Ok(()), Err)
            }
        }
    };

    match outcome {
        Err(e) if e.is_fatal() => {
            tracing::warn!(operation, rank, error = %e, "collective aborted; communicator poisoned");
            comm.mark_poisoned();
            Err(e)
        }
        other => {
            comm.advance();
            other
        }
    }
}

/// Byte range `[offset, offset + len)` checked against `available`.
pub(crate) fn segment(
    operation: &'static str,
    peer: Rank,
    offset: usize,
    len: usize,
    available: usize,
) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(offset..end),
        _ => Err(CollError::SegmentOutOfBounds {
            operation,
            peer,
            offset,
            len,
            available,
        }),
    }
}

/// Like [`segment`], but for a range given in elements of `elem` bytes.
/// An offset or length whose byte size overflows is out of bounds.
pub(crate) fn elem_segment(
    operation: &'static str,
    peer: Rank,
    offset: usize,
    len: usize,
    elem: usize,
    available: usize,
) -> Result<std::ops::Range<usize>> {
    match (offset.checked_mul(elem), len.checked_mul(elem)) {
        (Some(offset), Some(len)) => segment(operation, peer, offset, len, available),
        _ => Err(CollError::SegmentOutOfBounds {
            operation,
            peer,
            offset: offset.saturating_mul(elem),
            len: len.saturating_mul(elem),
            available,
        }),
    }
}

/// Byte size of `world` blocks of `count` elements, or `None` on overflow.
pub(crate) fn block_bytes(count: usize, elem: usize, world: usize) -> Option<(usize, usize)> {
    let block = count.checked_mul(elem)?;
    Some((block, block.checked_mul(world)?))
}
