use super::helpers::{bytes_of_i32, i32s_of, run_world};
use tcpmpi::{ANY_SOURCE, ANY_TAG, DataType, MpiError, Status};

/// Wildcard receive reports the actual source and tag.
#[tokio::test]
async fn test_recv_any_reports_actual_origin() {
    run_world(2, |comm| async move {
        if comm.rank() == 0 {
            let data = bytes_of_i32(&[100]);
            comm.send(&data, 1, DataType::I32, 1, 0).await.unwrap();
        } else {
            let mut buf = vec![0u8; 4];
            let status = comm
                .recv(&mut buf, 1, DataType::I32, ANY_SOURCE, ANY_TAG)
                .await
                .unwrap();
            assert_eq!(
                status,
                Status {
                    source: 0,
                    tag: 0,
                    count: 1
                }
            );
            assert_eq!(i32s_of(&buf), vec![100]);
        }
    })
    .await;
}

/// Messages between one (src, dst, tag) triple arrive in send order.
#[tokio::test]
async fn test_same_tag_preserves_send_order() {
    run_world(2, |comm| async move {
        if comm.rank() == 0 {
            for v in 1..=5i32 {
                comm.send(&bytes_of_i32(&[v]), 1, DataType::I32, 1, 7)
                    .await
                    .unwrap();
            }
        } else {
            for expected in 1..=5i32 {
                let mut buf = vec![0u8; 4];
                comm.recv(&mut buf, 1, DataType::I32, 0, 7).await.unwrap();
                assert_eq!(i32s_of(&buf), vec![expected]);
            }
        }
    })
    .await;
}

/// Receives posted in the "wrong" order still match by tag.
#[tokio::test]
async fn test_interleaved_tags_match_by_tag() {
    run_world(2, |comm| async move {
        if comm.rank() == 0 {
            let a = comm
                .isend(&bytes_of_i32(&[1]), 1, DataType::I32, 1, 1)
                .unwrap();
            let b = comm
                .isend(&bytes_of_i32(&[2]), 1, DataType::I32, 1, 2)
                .unwrap();
            a.wait().await.unwrap();
            b.wait().await.unwrap();
        } else {
            let mut buf_tag2 = vec![0u8; 4];
            let mut buf_tag1 = vec![0u8; 4];
            let req_tag2 = unsafe {
                comm.irecv(buf_tag2.as_mut_ptr(), 1, DataType::I32, 0, 2)
            }
            .unwrap();
            let req_tag1 = unsafe {
                comm.irecv(buf_tag1.as_mut_ptr(), 1, DataType::I32, 0, 1)
            }
            .unwrap();

            req_tag2.wait().await.unwrap();
            req_tag1.wait().await.unwrap();
            assert_eq!(i32s_of(&buf_tag2), vec![2]);
            assert_eq!(i32s_of(&buf_tag1), vec![1]);
        }
    })
    .await;
}

/// Zero-length payloads are legal and complete with count 0.
#[tokio::test]
async fn test_zero_length_message() {
    run_world(2, |comm| async move {
        if comm.rank() == 0 {
            comm.send(&[], 0, DataType::I32, 1, 3).await.unwrap();
        } else {
            let mut buf = vec![0u8; 8];
            let status = comm.recv(&mut buf, 2, DataType::I32, 0, 3).await.unwrap();
            assert_eq!(status.count, 0);
        }
    })
    .await;
}

/// Self-sends go through the local unexpected queue, no network needed.
#[tokio::test]
async fn test_send_to_self() {
    run_world(1, |comm| async move {
        let data = bytes_of_i32(&[7, 8]);
        comm.send(&data, 2, DataType::I32, 0, 5).await.unwrap();

        let mut buf = vec![0u8; 8];
        let status = comm.recv(&mut buf, 2, DataType::I32, 0, 5).await.unwrap();
        assert_eq!(status.source, 0);
        assert_eq!(status.count, 2);
        assert_eq!(i32s_of(&buf), vec![7, 8]);
    })
    .await;
}

/// A frame bigger than the posted buffer fails the receive with truncation.
#[tokio::test]
async fn test_truncation_fails_receive() {
    run_world(2, |comm| async move {
        if comm.rank() == 0 {
            let data = bytes_of_i32(&[1, 2, 3, 4]);
            comm.send(&data, 4, DataType::I32, 1, 9).await.unwrap();
        } else {
            let mut buf = vec![0u8; 8];
            let err = comm
                .recv(&mut buf, 2, DataType::I32, 0, 9)
                .await
                .unwrap_err();
            assert!(matches!(err, MpiError::Truncated { received: 16, capacity: 8 }));
            assert!(err.is_communication());
        }
    })
    .await;
}

/// Two wildcard receives drain messages from distinct senders.
#[tokio::test]
async fn test_wildcard_from_multiple_sources() {
    run_world(3, |comm| async move {
        match comm.rank() {
            0 => {
                let mut seen = Vec::new();
                for _ in 0..2 {
                    let mut buf = vec![0u8; 4];
                    let status = comm
                        .recv(&mut buf, 1, DataType::I32, ANY_SOURCE, ANY_TAG)
                        .await
                        .unwrap();
                    assert_eq!(i32s_of(&buf), vec![status.source * 11]);
                    assert_eq!(status.tag, status.source);
                    seen.push(status.source);
                }
                seen.sort_unstable();
                assert_eq!(seen, vec![1, 2]);
            }
            r => {
                comm.send(&bytes_of_i32(&[r * 11]), 1, DataType::I32, 0, r)
                    .await
                    .unwrap();
            }
        }
    })
    .await;
}

/// Rank, tag, and buffer validation happens before any traffic.
#[tokio::test]
async fn test_validation_errors() {
    run_world(1, |comm| async move {
        let data = bytes_of_i32(&[1]);
        assert!(matches!(
            comm.send(&data, 1, DataType::I32, 5, 0).await,
            Err(MpiError::InvalidRank { rank: 5, .. })
        ));
        assert!(matches!(
            comm.send(&data, 1, DataType::I32, 0, -3).await,
            Err(MpiError::InvalidTag(-3))
        ));
        // Tag inside the collective band.
        assert!(matches!(
            comm.send(&data, 1, DataType::I32, 0, 1000).await,
            Err(MpiError::InvalidTag(1000))
        ));
        assert!(matches!(
            comm.isend(&data, 2, DataType::I32, 0, 0),
            Err(MpiError::OperationFailed(_))
        ));
        let mut buf = vec![0u8; 4];
        assert!(matches!(
            comm.recv(&mut buf, 1, DataType::I32, -2, 0).await,
            Err(MpiError::InvalidRank { rank: -2, .. })
        ));
    })
    .await;
}

/// Probe sees a queued message without consuming it.
#[tokio::test]
async fn test_probe_and_iprobe() {
    run_world(2, |comm| async move {
        if comm.rank() == 0 {
            comm.send(&bytes_of_i32(&[1, 2, 3]), 3, DataType::I32, 1, 5)
                .await
                .unwrap();
        } else {
            let status = comm.probe(0, 5, DataType::I32).await.unwrap();
            assert_eq!(
                status,
                Status {
                    source: 0,
                    tag: 5,
                    count: 3
                }
            );

            // Still queued.
            let peeked = comm.iprobe(ANY_SOURCE, ANY_TAG, DataType::I32).unwrap();
            assert_eq!(peeked, Some(status));

            let mut buf = vec![0u8; 12];
            comm.recv(&mut buf, 3, DataType::I32, 0, 5).await.unwrap();
            assert_eq!(i32s_of(&buf), vec![1, 2, 3]);

            // Consumed now.
            assert_eq!(comm.iprobe(0, 5, DataType::I32).unwrap(), None);
        }
    })
    .await;
}

/// Traffic on a duplicated communicator never matches the parent's.
#[tokio::test]
async fn test_dup_isolates_tag_space() {
    run_world(2, |comm| async move {
        let dup = comm.dup().unwrap();
        if comm.rank() == 0 {
            // Same tag on both communicators, dup first on the wire.
            dup.send(&bytes_of_i32(&[22]), 1, DataType::I32, 1, 4)
                .await
                .unwrap();
            comm.send(&bytes_of_i32(&[11]), 1, DataType::I32, 1, 4)
                .await
                .unwrap();
        } else {
            // Receive on the parent first: must get the parent's message
            // even though the dup's frame arrived earlier.
            let mut buf = vec![0u8; 4];
            comm.recv(&mut buf, 1, DataType::I32, 0, 4).await.unwrap();
            assert_eq!(i32s_of(&buf), vec![11]);

            dup.recv(&mut buf, 1, DataType::I32, 0, 4).await.unwrap();
            assert_eq!(i32s_of(&buf), vec![22]);
        }
    })
    .await;
}
