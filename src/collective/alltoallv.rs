use crate::collective::exchange::{backward_rotation, elem_segment, run_exchange};
use crate::comm::Communicator;
use crate::error::{CollError, Result};
use crate::memory::{BufferViewMut, ScratchBuf, SendSource};

const OP: &str = "alltoallv";

/// Variable-size all-to-all.
///
/// Besides its buffer, each rank publishes its `sendcounts`/`sdispls`
/// tables. A reader locates the segment addressed to it through the
/// publisher's displacement entry for the reader's rank, cross-checks the
/// publisher's count against its own `recvcounts`, and lands the data at
/// `rdispls[publisher]`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn alltoallv(
    comm: &mut Communicator,
    send: SendSource<'_>,
    sendcounts: &[usize],
    sdispls: &[usize],
    mut recv: BufferViewMut<'_>,
    recvcounts: &[usize],
    rdispls: &[usize],
) -> Result<()> {
    let world = comm.size();
    let rank = comm.rank();

    for (table, len) in [
        ("sendcounts", sendcounts.len()),
        ("sdispls", sdispls.len()),
        ("recvcounts", recvcounts.len()),
        ("rdispls", rdispls.len()),
    ] {
        if len != world {
            return Err(CollError::TableLength {
                table,
                expected: world,
                actual: len,
            });
        }
    }
    if let SendSource::Buffer(view) = send
        && view.dtype() != recv.dtype()
    {
        return Err(CollError::TypeMismatch {
            send: view.dtype(),
            recv: recv.dtype(),
        });
    }

    let elem = recv.dtype().size_in_bytes();

    // Every incoming segment must land inside the receive buffer.
    for peer in 0..world {
        elem_segment(
            OP,
            peer,
            rdispls[peer],
            recvcounts[peer],
            elem,
            recv.len_bytes(),
        )?;
    }

    let scratch: ScratchBuf;
    let outgoing: &[u8] = match send {
        SendSource::Buffer(view) => {
            for peer in 0..world {
                elem_segment(
                    OP,
                    peer,
                    sdispls[peer],
                    sendcounts[peer],
                    elem,
                    view.len_bytes(),
                )?;
            }
            view.as_bytes()
        }
        SendSource::InPlace => {
            // Outgoing segments may be listed in any order; copy up to the
            // furthest end.
            let mut span = 0;
            for peer in 0..world {
                let end = elem_segment(
                    OP,
                    peer,
                    sdispls[peer],
                    sendcounts[peer],
                    elem,
                    recv.len_bytes(),
                )?
                .end;
                span = span.max(end);
            }
            scratch = comm.ctx().scratch().copy_of(&recv.as_bytes()[..span])?;
            &scratch[..]
        }
    };

    let dst = recv.as_bytes_mut();
    run_exchange(
        comm,
        OP,
        outgoing,
        Some((sendcounts, sdispls)),
        backward_rotation(rank, world),
        |source, peer| {
            let (counts, displs) = peer.tables().ok_or(CollError::TableLength {
                table: "published sendcounts",
                expected: world,
                actual: 0,
            })?;
            if counts.len() != world {
                return Err(CollError::TableLength {
                    table: "published sendcounts",
                    expected: world,
                    actual: counts.len(),
                });
            }
            if counts[rank] != recvcounts[source] {
                return Err(CollError::PeerCountMismatch {
                    operation: OP,
                    peer: source,
                    sent: counts[rank],
                    expected: recvcounts[source],
                });
            }
            let data = peer.bytes();
            let from = elem_segment(OP, source, displs[rank], counts[rank], elem, data.len())?;
            let to = elem_segment(
                OP,
                source,
                rdispls[source],
                recvcounts[source],
                elem,
                dst.len(),
            )?;
            dst[to].copy_from_slice(&data[from]);
            Ok(())
        },
    )
}
