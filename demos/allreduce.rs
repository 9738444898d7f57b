//! Sum-allreduce across a 4-rank world.
//!
//! ```bash
//! cargo run --example allreduce
//! ```

use std::sync::Arc;
use tcpmpi::{Communicator, DataType, ReduceOp};

#[tokio::main]
async fn main() -> tcpmpi::Result<()> {
    let comms: Vec<Arc<Communicator>> = tcpmpi::bootstrap_local(4, 47100)
        .await?
        .into_iter()
        .map(Arc::new)
        .collect();

    let mut tasks = Vec::new();
    for comm in &comms {
        let comm = Arc::clone(comm);
        tasks.push(tokio::spawn(async move {
            let contribution = (comm.rank() + 1).to_le_bytes();
            let mut result = [0u8; 4];
            comm.allreduce(&contribution, &mut result, 1, DataType::I32, ReduceOp::Sum)
                .await?;
            Ok::<_, tcpmpi::MpiError>((comm.rank(), i32::from_le_bytes(result)))
        }));
    }

    for task in tasks {
        let (rank, sum) = task.await.expect("rank task panicked")?;
        println!("rank {rank}: sum = {sum}");
        // Every rank prints sum = 10.
    }
    Ok(())
}
