use shmcoll::{BufferView, BufferViewMut, CollError, CommState};

use super::helpers::run_ranks;

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoall_4_ranks_i32() {
    let results = run_ranks(4, |comm| {
        let rank = comm.rank() as i32;
        let send: Vec<i32> = (0..4).map(|i| 10 * rank + i).collect();
        let mut recv = vec![-1i32; 4];
        comm.alltoall_slice(&send, &mut recv).unwrap();
        recv
    })
    .await;

    assert_eq!(results[0], vec![0, 10, 20, 30]);
    assert_eq!(results[1], vec![1, 11, 21, 31]);
    assert_eq!(results[2], vec![2, 12, 22, 32]);
    assert_eq!(results[3], vec![3, 13, 23, 33]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoall_is_a_transpose() {
    const SEG: usize = 3;
    for world in [1usize, 2, 3, 5] {
        let results = run_ranks(world, move |comm| {
            let rank = comm.rank() as u64;
            // Segment `dest` carries marker (rank, dest) in every element.
            let send: Vec<u64> = (0..world as u64)
                .flat_map(|dest| (0..SEG as u64).map(move |k| rank * 1000 + dest * 10 + k))
                .collect();
            let mut recv = vec![0u64; world * SEG];
            comm.alltoall_slice(&send, &mut recv).unwrap();
            recv
        })
        .await;

        for (rank, recv) in results.iter().enumerate() {
            for src in 0..world {
                for k in 0..SEG {
                    assert_eq!(
                        recv[src * SEG + k],
                        (src * 1000 + rank * 10 + k) as u64,
                        "world {world}: rank {rank} segment {src}"
                    );
                }
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoall_in_place_matches_out_of_place() {
    let results = run_ranks(3, |comm| {
        let rank = comm.rank() as f64;
        let data: Vec<f64> = (0..6).map(|i| rank + i as f64 / 10.0).collect();

        let mut out_of_place = vec![0.0f64; 6];
        comm.alltoall_slice(&data, &mut out_of_place).unwrap();

        let mut in_place = data.clone();
        comm.alltoall_in_place(&mut in_place).unwrap();

        (out_of_place, in_place)
    })
    .await;

    for (rank, (out_of_place, in_place)) in results.iter().enumerate() {
        assert_eq!(out_of_place, in_place, "rank {rank} in-place diverged");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoall_repeated_rounds() {
    let results = run_ranks(4, |comm| {
        let rank = comm.rank() as u32;
        let mut ok = true;
        for round in 0..25u32 {
            let send: Vec<u32> = (0..4).map(|dest| round * 100 + rank * 10 + dest).collect();
            let mut recv = vec![0u32; 4];
            comm.alltoall_slice(&send, &mut recv).unwrap();
            let expected: Vec<u32> = (0..4).map(|src| round * 100 + src * 10 + rank).collect();
            ok &= recv == expected;
        }
        (ok, comm.generation())
    })
    .await;

    for (rank, (ok, generation)) in results.into_iter().enumerate() {
        assert!(ok, "rank {rank} saw stale data");
        assert_eq!(generation, 25);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoall_rejects_bad_arguments() {
    let results = run_ranks(2, |comm| {
        let send = [1i32, 2];
        let mut recv_f32 = [0f32; 2];
        let type_err = comm
            .alltoall(
                BufferView::of(&send).into(),
                1,
                BufferViewMut::of(&mut recv_f32),
                1,
            )
            .unwrap_err();

        let mut recv = [0i32; 2];
        let count_err = comm
            .alltoall(
                BufferView::of(&send).into(),
                1,
                BufferViewMut::of(&mut recv),
                2,
            )
            .unwrap_err();

        let mut short = [0i32; 1];
        let size_err = comm
            .alltoall(
                BufferView::of(&send).into(),
                1,
                BufferViewMut::of(&mut short),
                1,
            )
            .unwrap_err();

        // Argument errors are local: the communicator is still usable.
        let state = comm.state();
        comm.alltoall_slice(&send, &mut recv).unwrap();
        (type_err, count_err, size_err, state, comm.generation())
    })
    .await;

    for (type_err, count_err, size_err, state, generation) in results {
        assert!(matches!(type_err, CollError::TypeMismatch { .. }));
        assert!(matches!(
            count_err,
            CollError::CountMismatch {
                send: 1,
                recv: 2,
                ..
            }
        ));
        assert!(matches!(
            size_err,
            CollError::BufferSizeMismatch {
                expected: 8,
                actual: 4
            }
        ));
        assert_eq!(state, CommState::Active);
        assert_eq!(generation, 1);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoall_slice_rejects_uneven_or_mismatched_lengths() {
    let results = run_ranks(2, |comm| {
        let mut recv = [0i32; 5];
        let uneven = comm
            .alltoall_slice(&[1, 2, 3, 4, 5], &mut recv)
            .unwrap_err();
        let untouched = recv == [0; 5];

        let mut oversized = [0i32; 8];
        let mismatched = comm.alltoall_slice(&[1, 2], &mut oversized).unwrap_err();

        let mut buf = [1u8, 2, 3];
        let in_place = comm.alltoall_in_place(&mut buf).unwrap_err();

        (uneven, untouched, mismatched, in_place, comm.generation())
    })
    .await;

    for (uneven, untouched, mismatched, in_place, generation) in results {
        assert!(matches!(
            uneven,
            CollError::UnevenSplit {
                len: 5,
                world_size: 2,
                ..
            }
        ));
        assert!(untouched);
        assert!(matches!(
            mismatched,
            CollError::CountMismatch {
                send: 2,
                recv: 8,
                ..
            }
        ));
        assert!(matches!(in_place, CollError::UnevenSplit { len: 3, .. }));
        assert_eq!(generation, 0);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_alltoall_overflowing_count_is_an_error() {
    let results = run_ranks(2, |comm| {
        let send = [0u64; 2];
        let mut recv = [0u64; 2];
        comm.alltoall(
            BufferView::of(&send).into(),
            usize::MAX / 4,
            BufferViewMut::of(&mut recv),
            usize::MAX / 4,
        )
        .unwrap_err()
    })
    .await;

    for err in results {
        assert!(matches!(err, CollError::BufferSizeMismatch { actual: 16, .. }));
    }
}
