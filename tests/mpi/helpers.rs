use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use tcpmpi::Communicator;

/// Each in-process world takes a disjoint port range so tests can run
/// concurrently within this binary.
static NEXT_PORT_BASE: AtomicU16 = AtomicU16::new(46000);

pub fn alloc_port_base() -> u16 {
    NEXT_PORT_BASE.fetch_add(16, Ordering::Relaxed)
}

/// Run `f` on every rank of a freshly meshed local world concurrently.
/// Keeps all communicators alive until every task completes.
pub async fn run_world<F, Fut>(world_size: i32, f: F)
where
    F: Fn(Arc<Communicator>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let comms = tcpmpi::bootstrap_local(world_size, alloc_port_base())
        .await
        .unwrap();

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for comm in comms {
        let comm = Arc::new(comm);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(comm).await }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

pub fn bytes_of_i32(vals: &[i32]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn i32s_of(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}
