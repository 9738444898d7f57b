use super::helpers::{bytes_of_i32, i32s_of, run_world};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tcpmpi::{DataType, ReduceOp};

/// After bcast(root = 0) every rank holds the root's buffer.
#[tokio::test]
async fn test_bcast_from_root() {
    run_world(4, |comm| async move {
        let mut buf = if comm.rank() == 0 {
            bytes_of_i32(&[42])
        } else {
            vec![0u8; 4]
        };
        comm.bcast(&mut buf, 1, DataType::I32, 0).await.unwrap();
        assert_eq!(i32s_of(&buf), vec![42]);
    })
    .await;
}

/// reduce(sum) folds every contribution on the root; non-root output
/// buffers are untouched.
#[tokio::test]
async fn test_reduce_sum_to_root() {
    run_world(4, |comm| async move {
        let contribution = bytes_of_i32(&[comm.rank() + 1]);
        let mut result = bytes_of_i32(&[-1]);
        comm.reduce(&contribution, &mut result, 1, DataType::I32, ReduceOp::Sum, 0)
            .await
            .unwrap();
        if comm.rank() == 0 {
            assert_eq!(i32s_of(&result), vec![10]);
        } else {
            assert_eq!(i32s_of(&result), vec![-1]);
        }
    })
    .await;
}

/// scatter(root = 0) of [0,1,2,3] with one element per rank.
#[tokio::test]
async fn test_scatter_one_element_each() {
    run_world(4, |comm| async move {
        let send = if comm.rank() == 0 {
            bytes_of_i32(&[0, 1, 2, 3])
        } else {
            Vec::new()
        };
        let mut recv = vec![0u8; 4];
        comm.scatter(&send, &mut recv, 1, DataType::I32, 0)
            .await
            .unwrap();
        assert_eq!(i32s_of(&recv), vec![comm.rank()]);
    })
    .await;
}

/// allgather of [rank] yields [0,1,2,3] everywhere.
#[tokio::test]
async fn test_allgather_ranks() {
    run_world(4, |comm| async move {
        let send = bytes_of_i32(&[comm.rank()]);
        let mut recv = vec![0u8; 16];
        comm.allgather(&send, &mut recv, 1, DataType::I32)
            .await
            .unwrap();
        assert_eq!(i32s_of(&recv), vec![0, 1, 2, 3]);
    })
    .await;
}

/// allreduce equals reduce-to-0 + bcast-from-0 on every rank.
#[tokio::test]
async fn test_allreduce_max() {
    run_world(4, |comm| async move {
        let send = bytes_of_i32(&[comm.rank() * 10, -comm.rank()]);
        let mut recv = vec![0u8; 8];
        comm.allreduce(&send, &mut recv, 2, DataType::I32, ReduceOp::Max)
            .await
            .unwrap();
        assert_eq!(i32s_of(&recv), vec![30, 0]);
    })
    .await;
}

/// No rank leaves the barrier before every rank has entered it.
#[tokio::test]
async fn test_barrier_waits_for_all() {
    let entered = Arc::new(AtomicI32::new(0));
    let seen = Arc::clone(&entered);
    run_world(4, move |comm| {
        let entered = Arc::clone(&seen);
        async move {
            // Stagger arrivals so an early release would be visible.
            tokio::time::sleep(std::time::Duration::from_millis(10 * comm.rank() as u64)).await;
            entered.fetch_add(1, Ordering::SeqCst);
            comm.barrier().await.unwrap();
            assert_eq!(entered.load(Ordering::SeqCst), 4);
        }
    })
    .await;
}

/// alltoall: rank r's slice i lands at slot r of rank i.
#[tokio::test]
async fn test_alltoall_permutes_slices() {
    run_world(4, |comm| async move {
        let rank = comm.rank();
        let send = bytes_of_i32(&[rank * 10, rank * 10 + 1, rank * 10 + 2, rank * 10 + 3]);
        let mut recv = vec![0u8; 16];
        comm.alltoall(&send, &mut recv, 1, DataType::I32)
            .await
            .unwrap();
        assert_eq!(
            i32s_of(&recv),
            vec![rank, 10 + rank, 20 + rank, 30 + rank]
        );
    })
    .await;
}

/// Inclusive scan: rank r folds ranks 0..=r.
#[tokio::test]
async fn test_scan_inclusive_sum() {
    run_world(4, |comm| async move {
        let rank = comm.rank();
        let mut buf = bytes_of_i32(&[rank + 1]);
        comm.scan(&mut buf, 1, DataType::I32, ReduceOp::Sum)
            .await
            .unwrap();
        let expected: i32 = (1..=rank + 1).sum();
        assert_eq!(i32s_of(&buf), vec![expected]);
    })
    .await;
}

/// Exclusive scan: rank r folds ranks 0..r; rank 0 gets the identity.
#[tokio::test]
async fn test_exscan_sum() {
    run_world(4, |comm| async move {
        let rank = comm.rank();
        let mut buf = bytes_of_i32(&[rank + 1]);
        comm.exscan(&mut buf, 1, DataType::I32, ReduceOp::Sum)
            .await
            .unwrap();
        let expected: i32 = (1..=rank).sum();
        assert_eq!(i32s_of(&buf), vec![expected]);
    })
    .await;
}

/// scatter(root) then gather(root) is the identity on the root's buffer.
#[tokio::test]
async fn test_scatter_gather_roundtrip() {
    run_world(4, |comm| async move {
        let original = bytes_of_i32(&[3, 1, 4, 1]);
        let send = if comm.rank() == 2 {
            original.clone()
        } else {
            Vec::new()
        };
        let mut chunk = vec![0u8; 4];
        comm.scatter(&send, &mut chunk, 1, DataType::I32, 2)
            .await
            .unwrap();

        let mut gathered = vec![0u8; 16];
        comm.gather(&chunk, &mut gathered, 1, DataType::I32, 2)
            .await
            .unwrap();
        if comm.rank() == 2 {
            assert_eq!(gathered, original);
        }
    })
    .await;
}

/// MinLoc over (value, index) pairs picks the lowest value, ties resolved
/// to the lower index.
#[tokio::test]
async fn test_reduce_minloc_pairs() {
    run_world(4, |comm| async move {
        let values = [5, 3, 9, 3];
        let rank = comm.rank();
        let pair = bytes_of_i32(&[values[rank as usize], rank]);
        let mut result = vec![0u8; 8];
        comm.reduce(&pair, &mut result, 2, DataType::I32, ReduceOp::MinLoc, 0)
            .await
            .unwrap();
        if rank == 0 {
            assert_eq!(i32s_of(&result), vec![3, 1]);
        }
    })
    .await;
}

/// Logical reduction over Bool buffers.
#[tokio::test]
async fn test_allreduce_logical_and_bool() {
    run_world(4, |comm| async move {
        // Only rank 2 contributes a false in slot 1.
        let send = vec![1u8, u8::from(comm.rank() != 2)];
        let mut recv = vec![0u8; 2];
        comm.allreduce(&send, &mut recv, 2, DataType::Bool, ReduceOp::LogicalAnd)
            .await
            .unwrap();
        assert_eq!(recv, vec![1, 0]);
    })
    .await;
}

/// An unsupported (op, dtype) pair fails on every rank before any traffic.
#[tokio::test]
async fn test_collective_invalid_datatype() {
    run_world(2, |comm| async move {
        let send = vec![0u8; 8];
        let mut recv = vec![0u8; 8];
        let err = comm
            .allreduce(&send, &mut recv, 2, DataType::F32, ReduceOp::BitAnd)
            .await
            .unwrap_err();
        assert!(matches!(err, tcpmpi::MpiError::InvalidDatatype { .. }));
    })
    .await;
}

/// In a size-1 world every collective is a local operation.
#[tokio::test]
async fn test_single_rank_collectives() {
    run_world(1, |comm| async move {
        comm.barrier().await.unwrap();

        let mut buf = bytes_of_i32(&[7]);
        comm.bcast(&mut buf, 1, DataType::I32, 0).await.unwrap();
        assert_eq!(i32s_of(&buf), vec![7]);

        let send = bytes_of_i32(&[5]);
        let mut recv = vec![0u8; 4];
        comm.reduce(&send, &mut recv, 1, DataType::I32, ReduceOp::Sum, 0)
            .await
            .unwrap();
        assert_eq!(i32s_of(&recv), vec![5]);

        let mut recv = vec![0u8; 4];
        comm.allgather(&send, &mut recv, 1, DataType::I32)
            .await
            .unwrap();
        assert_eq!(i32s_of(&recv), vec![5]);

        let mut recv = vec![0u8; 4];
        comm.alltoall(&send, &mut recv, 1, DataType::I32)
            .await
            .unwrap();
        assert_eq!(i32s_of(&recv), vec![5]);

        let mut buf = bytes_of_i32(&[9]);
        comm.scan(&mut buf, 1, DataType::I32, ReduceOp::Sum)
            .await
            .unwrap();
        assert_eq!(i32s_of(&buf), vec![9]);

        let mut buf = bytes_of_i32(&[9]);
        comm.exscan(&mut buf, 1, DataType::I32, ReduceOp::Sum)
            .await
            .unwrap();
        assert_eq!(i32s_of(&buf), vec![0]);
    })
    .await;
}

/// Collectives on a duplicated communicator work independently.
#[tokio::test]
async fn test_collectives_on_dup() {
    run_world(2, |comm| async move {
        let dup = comm.dup().unwrap();
        let send = bytes_of_i32(&[comm.rank() + 1]);
        let mut recv = vec![0u8; 4];
        dup.allreduce(&send, &mut recv, 1, DataType::I32, ReduceOp::Prod)
            .await
            .unwrap();
        assert_eq!(i32s_of(&recv), vec![2]);

        comm.barrier().await.unwrap();
    })
    .await;
}
