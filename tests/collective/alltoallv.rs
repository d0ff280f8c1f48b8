use shmcoll::{CollError, CommState};

use super::helpers::{packed_displs, run_ranks};

/// Elements rank `src` sends to rank `dst`. Symmetric, and zero on some pairs.
fn ragged_count(src: usize, dst: usize) -> usize {
    (src + dst) % 4
}

fn payload(src: usize, dst: usize, k: usize) -> i64 {
    (src * 1000 + dst * 100 + k) as i64
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoallv_uniform_matches_alltoall() {
    let results = run_ranks(4, |comm| {
        let world = comm.size();
        let rank = comm.rank() as i32;
        let send: Vec<i32> = (0..(world * 2) as i32).map(|i| rank * 100 + i).collect();

        let mut fixed = vec![0i32; world * 2];
        comm.alltoall_slice(&send, &mut fixed).unwrap();

        let counts = vec![2usize; world];
        let displs = packed_displs(&counts);
        let mut variable = vec![0i32; world * 2];
        comm.alltoallv_slice(&send, &counts, &displs, &mut variable, &counts, &displs)
            .unwrap();

        (fixed, variable)
    })
    .await;

    for (rank, (fixed, variable)) in results.iter().enumerate() {
        assert_eq!(fixed, variable, "rank {rank}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoallv_ragged() {
    let world = 4;
    let results = run_ranks(world, move |comm| {
        let rank = comm.rank();
        let sendcounts: Vec<usize> = (0..world).map(|d| ragged_count(rank, d)).collect();
        let sdispls = packed_displs(&sendcounts);
        let send: Vec<i64> = (0..world)
            .flat_map(|d| (0..sendcounts[d]).map(move |k| payload(rank, d, k)))
            .collect();

        // Leave a gap in front of every incoming segment.
        let recvcounts: Vec<usize> = (0..world).map(|s| ragged_count(s, rank)).collect();
        let rdispls: Vec<usize> = packed_displs(&recvcounts)
            .iter()
            .enumerate()
            .map(|(s, d)| d + s + 1)
            .collect();
        let total = rdispls[world - 1] + recvcounts[world - 1];
        let mut recv = vec![-1i64; total];

        comm.alltoallv_slice(&send, &sendcounts, &sdispls, &mut recv, &recvcounts, &rdispls)
            .unwrap();
        (recv, recvcounts, rdispls)
    })
    .await;

    for (rank, (recv, recvcounts, rdispls)) in results.iter().enumerate() {
        for src in 0..world {
            let got = &recv[rdispls[src]..rdispls[src] + recvcounts[src]];
            let expected: Vec<i64> = (0..recvcounts[src]).map(|k| payload(src, rank, k)).collect();
            assert_eq!(got, expected.as_slice(), "rank {rank} from {src}");
            // The gap in front of each segment is untouched.
            assert_eq!(recv[rdispls[src] - 1], -1, "rank {rank} gap before {src}");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoallv_unordered_send_displacements() {
    // Segments sit in the send buffer in reverse rank order.
    let world = 3;
    let results = run_ranks(world, move |comm| {
        let rank = comm.rank();
        let sendcounts: Vec<usize> = (0..world).map(|d| d + 1).collect();
        let mut sdispls = vec![0usize; world];
        let mut offset = 0;
        for d in (0..world).rev() {
            sdispls[d] = offset;
            offset += sendcounts[d];
        }
        let mut send = vec![0u32; offset];
        for d in 0..world {
            for k in 0..sendcounts[d] {
                send[sdispls[d] + k] = (rank * 10 + d) as u32;
            }
        }

        let recvcounts = vec![rank + 1; world];
        let rdispls = packed_displs(&recvcounts);
        let mut recv = vec![0u32; world * (rank + 1)];
        comm.alltoallv_slice(&send, &sendcounts, &sdispls, &mut recv, &recvcounts, &rdispls)
            .unwrap();
        recv
    })
    .await;

    for (rank, recv) in results.iter().enumerate() {
        let expected: Vec<u32> = (0..world)
            .flat_map(|src| std::iter::repeat_n((src * 10 + rank) as u32, rank + 1))
            .collect();
        assert_eq!(recv, &expected, "rank {rank}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoallv_in_place() {
    let world = 3;
    let results = run_ranks(world, move |comm| {
        let rank = comm.rank();
        // Symmetric counts: the receive layout equals the send layout.
        let counts: Vec<usize> = (0..world).map(|p| ragged_count(rank, p)).collect();
        let displs = packed_displs(&counts);
        let mut buf: Vec<i64> = (0..world)
            .flat_map(|d| (0..counts[d]).map(move |k| payload(rank, d, k)))
            .collect();
        comm.alltoallv_in_place(&mut buf, &counts, &displs, &counts, &displs)
            .unwrap();
        (buf, counts, displs)
    })
    .await;

    for (rank, (buf, counts, displs)) in results.iter().enumerate() {
        for src in 0..world {
            let got = &buf[displs[src]..displs[src] + counts[src]];
            let expected: Vec<i64> = (0..counts[src]).map(|k| payload(src, rank, k)).collect();
            assert_eq!(got, expected.as_slice(), "rank {rank} from {src}");
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoallv_peer_count_mismatch() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let send = [7u8; 4];
        let mut recv = [0u8; 4];
        // Rank 1 sends one element to rank 0, but rank 0 expects two.
        let sendcounts = [1usize, 1];
        let recvcounts = if rank == 0 { [1usize, 2] } else { [1, 1] };
        let first = comm.alltoallv_slice(&send, &sendcounts, &[0, 1], &mut recv, &recvcounts, &[0, 1]);

        // The round still completed on both ranks, so they stay in step.
        let counts = [1usize, 1];
        let second =
            comm.alltoallv_slice(&send, &counts, &[0, 1], &mut recv, &counts, &[0, 1]);
        (first, second.is_ok(), comm.state(), comm.generation())
    })
    .await;

    let (first, second_ok, state, generation) = &results[0];
    assert!(matches!(
        first,
        Err(CollError::PeerCountMismatch {
            peer: 1,
            sent: 1,
            expected: 2,
            ..
        })
    ));
    assert!(*second_ok);
    assert_eq!(*state, CommState::Active);
    assert_eq!(*generation, 2);

    let (first, second_ok, _, _) = &results[1];
    assert!(first.is_ok());
    assert!(*second_ok);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoallv_table_and_bounds_checks() {
    let results = run_ranks(2, |comm| {
        let send = [1u16, 2, 3, 4];
        let mut recv = [0u16; 4];
        let short_table = comm
            .alltoallv_slice(&send, &[1], &[0], &mut recv, &[1, 1], &[0, 1])
            .unwrap_err();
        let out_of_bounds = comm
            .alltoallv_slice(&send, &[1, 1], &[0, 1], &mut recv, &[1, 1], &[0, 4])
            .unwrap_err();
        (short_table, out_of_bounds)
    })
    .await;

    for (short_table, out_of_bounds) in results {
        assert!(matches!(
            short_table,
            CollError::TableLength {
                table: "sendcounts",
                expected: 2,
                actual: 1
            }
        ));
        assert!(matches!(
            out_of_bounds,
            CollError::SegmentOutOfBounds { peer: 1, .. }
        ));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoallv_overflowing_displacements_are_errors() {
    let results = run_ranks(2, |comm| {
        let huge = usize::MAX / 4;
        let send = [1u64, 2];
        let mut recv = [0u64; 2];

        let recv_side = comm
            .alltoallv_slice(&send, &[1, 1], &[0, 1], &mut recv, &[1, 1], &[0, huge])
            .unwrap_err();
        let send_side = comm
            .alltoallv_slice(&send, &[1, 1], &[huge, 0], &mut recv, &[1, 1], &[0, 1])
            .unwrap_err();
        let huge_count = comm
            .alltoallv_slice(&send, &[huge, 1], &[0, 1], &mut recv, &[1, 1], &[0, 1])
            .unwrap_err();
        let in_place = comm
            .alltoallv_in_place(&mut recv, &[1, 1], &[0, huge], &[1, 1], &[0, 1])
            .unwrap_err();

        (recv_side, send_side, huge_count, in_place, comm.state())
    })
    .await;

    for (recv_side, send_side, huge_count, in_place, state) in results {
        assert!(matches!(
            recv_side,
            CollError::SegmentOutOfBounds { peer: 1, .. }
        ));
        assert!(matches!(
            send_side,
            CollError::SegmentOutOfBounds { peer: 0, .. }
        ));
        assert!(matches!(
            huge_count,
            CollError::SegmentOutOfBounds { peer: 0, .. }
        ));
        assert!(matches!(
            in_place,
            CollError::SegmentOutOfBounds { peer: 1, .. }
        ));
        assert_eq!(state, CommState::Active);
    }
}
