use crate::collective::exchange::{ascending, block_bytes, run_exchange, segment};
use crate::comm::Communicator;
use crate::error::{CollError, Result};
use crate::memory::{BufferViewMut, ScratchBuf, SendSource};

const OP: &str = "allgather";

/// Node-local allgather: rank `r`'s `count` elements land in receive block
/// `r` on every rank. In-place calls take the local contribution from the
/// rank's own block of the receive buffer.
pub(crate) fn allgather(
    comm: &mut Communicator,
    send: SendSource<'_>,
    sendcount: usize,
    mut recv: BufferViewMut<'_>,
    recvcount: usize,
) -> Result<()> {
    if let SendSource::Buffer(view) = send
        && view.dtype() != recv.dtype()
    {
        return Err(CollError::TypeMismatch {
            send: view.dtype(),
            recv: recv.dtype(),
        });
    }
    if sendcount != recvcount {
        return Err(CollError::CountMismatch {
            operation: OP,
            send: sendcount,
            recv: recvcount,
        });
    }

    let world = comm.size();
    let rank = comm.rank();
    let Some((block, total)) = block_bytes(recvcount, recv.dtype().size_in_bytes(), world) else {
        return Err(CollError::BufferSizeMismatch {
            expected: usize::MAX,
            actual: recv.len_bytes(),
        });
    };

    if recv.len_bytes() < total {
        return Err(CollError::BufferSizeMismatch {
            expected: total,
            actual: recv.len_bytes(),
        });
    }

    let scratch: ScratchBuf;
    let outgoing: &[u8] = match send {
        SendSource::Buffer(view) => {
            if view.len_bytes() < block {
                return Err(CollError::BufferSizeMismatch {
                    expected: block,
                    actual: view.len_bytes(),
                });
            }
            &view.as_bytes()[..block]
        }
        SendSource::InPlace => {
            let own = rank * block..(rank + 1) * block;
            scratch = comm.ctx().scratch().copy_of(&recv.as_bytes()[own])?;
            &scratch[..]
        }
    };

    let dst = recv.as_bytes_mut();
    run_exchange(comm, OP, outgoing, None, ascending(world), |source, peer| {
        let data = peer.bytes();
        let range = segment(OP, source, 0, block, data.len())?;
        dst[source * block..(source + 1) * block].copy_from_slice(&data[range]);
        Ok(())
    })
}
