//! Point-to-point send/recv between two ranks.
//!
//! Spawns a 2-rank world in-process. Rank 0 sends an i32 vector to rank 1,
//! which receives it and prints the result.
//!
//! ```bash
//! cargo run --example send_recv
//! ```

use std::sync::Arc;
use tcpmpi::{Communicator, DataType};

#[tokio::main]
async fn main() -> tcpmpi::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let comms: Vec<Arc<Communicator>> = tcpmpi::bootstrap_local(2, 47000)
        .await?
        .into_iter()
        .map(Arc::new)
        .collect();

    let c0 = Arc::clone(&comms[0]);
    let c1 = Arc::clone(&comms[1]);

    let values: Vec<i32> = vec![1, 2, 3, 4];
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

    // send and recv run concurrently; tag 42 matches sender and receiver.
    let sender =
        tokio::spawn(async move { c0.send(&payload, 4, DataType::I32, 1, 42).await });
    let receiver = tokio::spawn(async move {
        let mut buf = vec![0u8; 16];
        let status = c1.recv(&mut buf, 4, DataType::I32, 0, 42).await?;
        Ok::<_, tcpmpi::MpiError>((status, buf))
    });

    sender.await.expect("send task panicked")?;
    let (status, buf) = receiver.await.expect("recv task panicked")?;

    let received: Vec<i32> = buf
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().expect("4-byte chunk")))
        .collect();
    println!(
        "rank 1 received {:?} (source {}, tag {}, count {})",
        received, status.source, status.tag, status.count
    );
    // Output: rank 1 received [1, 2, 3, 4] (source 0, tag 42, count 4)

    Ok(())
}
