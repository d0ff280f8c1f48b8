use crate::collective::exchange::{backward_rotation, block_bytes, run_exchange, segment};
use crate::comm::Communicator;
use crate::error::{CollError, Result};
use crate::memory::{BufferViewMut, ScratchBuf, SendSource};

const OP: &str = "alltoall";

/// Fixed-size all-to-all.
///
/// Each rank publishes its whole send region; every peer then copies the
/// `chunk` addressed to it (segment `peer_rank` of the publisher's data)
/// into receive segment `publisher_rank`. In-place calls publish a scratch
/// copy of the receive buffer, because this rank starts overwriting the
/// receive buffer while peers are still reading.
pub(crate) fn alltoall(
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
    let Some((chunk, total)) = block_bytes(recvcount, recv.dtype().size_in_bytes(), world) else {
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
            if view.len_bytes() < total {
                return Err(CollError::BufferSizeMismatch {
                    expected: total,
                    actual: view.len_bytes(),
                });
            }
            &view.as_bytes()[..total]
        }
        SendSource::InPlace => {
            scratch = comm.ctx().scratch().copy_of(&recv.as_bytes()[..total])?;
            &scratch[..]
        }
    };

    let dst = recv.as_bytes_mut();
    let src_off = rank * chunk;
    run_exchange(
        comm,
        OP,
        outgoing,
        None,
        backward_rotation(rank, world),
        |source, peer| {
            let data = peer.bytes();
            let range = segment(OP, source, src_off, chunk, data.len())?;
            dst[source * chunk..(source + 1) * chunk].copy_from_slice(&data[range]);
            Ok(())
        },
    )
}
