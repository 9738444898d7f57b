use super::helpers::{alloc_port_base, bytes_of_i32, i32s_of};
use std::time::Duration;
use tcpmpi::{DataType, MpiConfig, MpiError};

/// The whole singleton lifecycle in one sequence (the global state makes
/// the phases order-dependent, so they live in a single test).
#[tokio::test]
async fn test_initialize_finalize_lifecycle() {
    // Finalize before any initialize.
    assert!(matches!(
        tcpmpi::finalize().await,
        Err(MpiError::NotInitialized)
    ));

    // An impossible identity is rejected before any socket is touched,
    // and the singleton is released.
    let bad_rank = MpiConfig {
        size: 2,
        rank: 7,
        port_base: alloc_port_base(),
        ..MpiConfig::default()
    };
    assert!(matches!(
        tcpmpi::initialize_with(bad_rank).await,
        Err(MpiError::InitFailed(_))
    ));

    // A 2-rank job with no partner process fails with a connection error
    // once the init timeout lapses, and releases the singleton again.
    let doomed = MpiConfig {
        size: 2,
        rank: 0,
        port_base: alloc_port_base(),
        init_timeout: Duration::from_millis(300),
        ..MpiConfig::default()
    };
    assert!(matches!(
        tcpmpi::initialize_with(doomed).await,
        Err(MpiError::Connection { .. })
    ));

    // Default environment: a single-rank world.
    let world = tcpmpi::initialize().await.unwrap();
    assert_eq!(world.rank(), 0);
    assert_eq!(world.size(), 1);

    // Double initialize is rejected while the first is live.
    assert!(matches!(
        tcpmpi::initialize().await,
        Err(MpiError::AlreadyInitialized)
    ));

    // The world communicator works: self round-trip.
    world
        .send(&bytes_of_i32(&[13]), 1, DataType::I32, 0, 1)
        .await
        .unwrap();
    let mut buf = vec![0u8; 4];
    world.recv(&mut buf, 1, DataType::I32, 0, 1).await.unwrap();
    assert_eq!(i32s_of(&buf), vec![13]);

    // A receive with no matching message outlives into finalize, which
    // surfaces a communication error on it.
    let mut orphan_buf = vec![0u8; 4];
    let orphan =
        unsafe { world.irecv(orphan_buf.as_mut_ptr(), 1, DataType::I32, 0, 99) }.unwrap();
    assert!(orphan.test().is_none());

    tcpmpi::finalize().await.unwrap();

    assert!(matches!(
        orphan.wait().await,
        Err(MpiError::Communication { .. })
    ));

    // A fresh cycle after finalize is permitted.
    let fresh = tcpmpi::initialize().await.unwrap();
    assert_eq!(fresh.size(), 1);
    tcpmpi::finalize().await.unwrap();

    // Handles from the finalized cycle stay dead.
    assert!(matches!(
        world.send(&bytes_of_i32(&[1]), 1, DataType::I32, 0, 1).await,
        Err(MpiError::NotInitialized)
    ));
    assert!(matches!(world.barrier().await, Err(MpiError::NotInitialized)));

    // Finalize is not repeatable.
    assert!(matches!(
        tcpmpi::finalize().await,
        Err(MpiError::NotInitialized)
    ));
}

/// bootstrap_local rejects an empty world.
#[tokio::test]
async fn test_bootstrap_rejects_empty_world() {
    assert!(matches!(
        tcpmpi::bootstrap_local(0, alloc_port_base()).await,
        Err(MpiError::InitFailed(_))
    ));
}

/// Dropping one side of an in-process world leaves the other side's
/// pending receive cancellable.
#[tokio::test]
async fn test_pending_receive_cancellable_after_peer_gone() {
    let comms = tcpmpi::bootstrap_local(2, alloc_port_base()).await.unwrap();
    let mut iter = comms.into_iter();
    let c0 = iter.next().unwrap();
    let c1 = iter.next().unwrap();

    let mut buf = vec![0u8; 4];
    let pending = unsafe { c1.irecv(buf.as_mut_ptr(), 1, DataType::I32, 0, 2) }.unwrap();
    assert!(pending.test().is_none());

    drop(c0);
    pending.cancel().unwrap();
    assert!(matches!(pending.wait().await, Err(MpiError::Cancelled)));
}
