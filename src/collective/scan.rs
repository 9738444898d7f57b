use crate::collective::helpers::{SCAN_TAG, coll_recv, coll_send};
use crate::comm::Communicator;
use crate::error::Result;
use crate::kernels;
use crate::types::{DataType, ReduceOp};

/// Shared machinery of both scans: every rank fans its local contribution
/// out to all higher ranks, while folding the contributions of all lower
/// ranks (in ascending rank order) into an accumulator.
///
/// Returns the fold of ranks `0..rank`, or `None` on rank 0.
async fn fold_lower_ranks(
    comm: &Communicator,
    local: &[u8],
    count: usize,
    dtype: DataType,
    op: ReduceOp,
) -> Result<Option<Vec<u8>>> {
    let size = comm.size();
    let rank = comm.rank();
    let nbytes = local.len();

    let sends = futures::future::try_join_all(
        (rank + 1..size).map(|r| coll_send(comm, r, SCAN_TAG, local, "scan")),
    );
    let folds = async {
        if rank == 0 {
            return Ok(None);
        }
        let mut acc = vec![0u8; nbytes];
        coll_recv(comm, 0, SCAN_TAG, &mut acc, "scan").await?;
        let mut contribution = vec![0u8; nbytes];
        for r in 1..rank {
            coll_recv(comm, r, SCAN_TAG, &mut contribution, "scan").await?;
            kernels::fold(&mut acc, &contribution, count, dtype, op)?;
        }
        Ok(Some(acc))
    };

    let (_, lower) = tokio::try_join!(sends, folds)?;
    Ok(lower)
}

impl Communicator {
    /// Inclusive prefix reduction in place: rank `r` ends up with the fold
    /// of ranks `0..=r`.
    pub async fn scan(
        &self,
        buf: &mut [u8],
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<()> {
        self.ensure_active()?;
        kernels::ensure_supported(dtype, op)?;
        let nbytes = Self::span_bytes(buf.len(), count, dtype)?;
        if self.size() <= 1 {
            return Ok(());
        }

        let local = buf[..nbytes].to_vec();
        if let Some(mut acc) = fold_lower_ranks(self, &local, count, dtype, op).await? {
            kernels::fold(&mut acc, &local, count, dtype, op)?;
            buf[..nbytes].copy_from_slice(&acc);
        }
        Ok(())
    }

    /// Exclusive prefix reduction in place: rank `r` ends up with the fold
    /// of ranks `0..r`; rank 0 gets the operation's identity.
    pub async fn exscan(
        &self,
        buf: &mut [u8],
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<()> {
        self.ensure_active()?;
        kernels::ensure_supported(dtype, op)?;
        let nbytes = Self::span_bytes(buf.len(), count, dtype)?;
        if self.size() <= 1 {
            let id = kernels::identity(count, dtype, op)?;
            buf[..nbytes].copy_from_slice(&id);
            return Ok(());
        }

        let local = buf[..nbytes].to_vec();
        match fold_lower_ranks(self, &local, count, dtype, op).await? {
            Some(acc) => buf[..nbytes].copy_from_slice(&acc),
            None => {
                let id = kernels::identity(count, dtype, op)?;
                buf[..nbytes].copy_from_slice(&id);
            }
        }
        Ok(())
    }
}
