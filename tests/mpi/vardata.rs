use super::helpers::{bytes_of_i32, i32s_of, run_world};
use tcpmpi::{DataType, MpiError};

/// gatherv packs per-rank chunks contiguously in rank order.
#[tokio::test]
async fn test_gatherv_variable_chunks() {
    run_world(4, |comm| async move {
        let rank = comm.rank();
        let counts = [1usize, 2, 3, 4];
        let send: Vec<i32> = (0..counts[rank as usize]).map(|_| rank).collect();
        let send = bytes_of_i32(&send);

        let mut recv = vec![0u8; 40];
        comm.gatherv(&send, &mut recv, &counts, DataType::I32, 0)
            .await
            .unwrap();
        if rank == 0 {
            assert_eq!(i32s_of(&recv), vec![0, 1, 1, 2, 2, 2, 3, 3, 3, 3]);
        }
    })
    .await;
}

/// scatterv reads per-rank chunks contiguously in rank order.
#[tokio::test]
async fn test_scatterv_variable_chunks() {
    run_world(3, |comm| async move {
        let rank = comm.rank();
        let counts = [2usize, 1, 3];
        let send = if rank == 1 {
            bytes_of_i32(&[10, 11, 20, 30, 31, 32])
        } else {
            Vec::new()
        };

        let mut recv = vec![0u8; counts[rank as usize] * 4];
        comm.scatterv(&send, &counts, &mut recv, DataType::I32, 1)
            .await
            .unwrap();
        let expected: Vec<i32> = match rank {
            0 => vec![10, 11],
            1 => vec![20],
            _ => vec![30, 31, 32],
        };
        assert_eq!(i32s_of(&recv), expected);
    })
    .await;
}

/// scatterv then gatherv round-trips the root's buffer.
#[tokio::test]
async fn test_scatterv_gatherv_roundtrip() {
    run_world(3, |comm| async move {
        let counts = [3usize, 0, 1];
        let original = bytes_of_i32(&[1, 2, 3, 4]);
        let send = if comm.rank() == 0 {
            original.clone()
        } else {
            Vec::new()
        };

        let mut chunk = vec![0u8; counts[comm.rank() as usize] * 4];
        comm.scatterv(&send, &counts, &mut chunk, DataType::I32, 0)
            .await
            .unwrap();

        let mut gathered = vec![0u8; 16];
        comm.gatherv(&chunk, &mut gathered, &counts, DataType::I32, 0)
            .await
            .unwrap();
        if comm.rank() == 0 {
            assert_eq!(gathered, original);
        }
    })
    .await;
}

/// alltoallv with asymmetric chunk sizes.
#[tokio::test]
async fn test_alltoallv_asymmetric() {
    run_world(2, |comm| async move {
        let rank = comm.rank();
        // Rank 0 sends 1 element to itself and 2 to rank 1;
        // rank 1 sends 3 elements to rank 0 and 1 to itself.
        let (send_counts, recv_counts, send_vals) = if rank == 0 {
            ([1usize, 2], [1usize, 3], vec![100, 1, 2])
        } else {
            ([3usize, 1], [2usize, 1], vec![7, 8, 9, 200])
        };
        let send = bytes_of_i32(&send_vals);
        let recv_total: usize = recv_counts.iter().sum();
        let mut recv = vec![0u8; recv_total * 4];

        comm.alltoallv(&send, &send_counts, &mut recv, &recv_counts, DataType::I32)
            .await
            .unwrap();

        let expected = if rank == 0 {
            vec![100, 7, 8, 9]
        } else {
            vec![1, 2, 200]
        };
        assert_eq!(i32s_of(&recv), expected);
    })
    .await;
}

/// Count-vector length must match the world size.
#[tokio::test]
async fn test_vardata_count_validation() {
    run_world(2, |comm| async move {
        let send = bytes_of_i32(&[1]);
        let mut recv = vec![0u8; 8];
        let err = comm
            .gatherv(&send, &mut recv, &[1], DataType::I32, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, MpiError::OperationFailed(_)));
    })
    .await;
}
