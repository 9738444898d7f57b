//! Pass a counter around a ring, incrementing at every hop.
//!
//! ```bash
//! cargo run --example ring
//! ```

use std::sync::Arc;
use tcpmpi::{Communicator, DataType};

const HOPS: i32 = 2;

#[tokio::main]
async fn main() -> tcpmpi::Result<()> {
    let world_size = 4;
    let comms: Vec<Arc<Communicator>> = tcpmpi::bootstrap_local(world_size, 47200)
        .await?
        .into_iter()
        .map(Arc::new)
        .collect();

    let mut tasks = Vec::new();
    for comm in &comms {
        let comm = Arc::clone(comm);
        tasks.push(tokio::spawn(async move {
            let rank = comm.rank();
            let size = comm.size();
            let next = (rank + 1) % size;
            let prev = (rank + size - 1) % size;

            let mut counter: i32 = 0;
            for _lap in 0..HOPS {
                if rank == 0 {
                    comm.send(&(counter + 1).to_le_bytes(), 1, DataType::I32, next, 0)
                        .await?;
                    let mut buf = [0u8; 4];
                    comm.recv(&mut buf, 1, DataType::I32, prev, 0).await?;
                    counter = i32::from_le_bytes(buf);
                } else {
                    let mut buf = [0u8; 4];
                    comm.recv(&mut buf, 1, DataType::I32, prev, 0).await?;
                    counter = i32::from_le_bytes(buf);
                    comm.send(&(counter + 1).to_le_bytes(), 1, DataType::I32, next, 0)
                        .await?;
                }
            }
            Ok::<_, tcpmpi::MpiError>((rank, counter))
        }));
    }

    for task in tasks {
        let (rank, counter) = task.await.expect("rank task panicked")?;
        println!("rank {rank}: counter = {counter}");
    }
    // After 2 laps of 4 ranks, rank 0 sees 8.
    Ok(())
}
