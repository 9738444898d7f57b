//! Variable-count collectives: per-rank chunk sizes instead of one uniform
//! count.

use crate::collective::helpers::{
    ALLTOALLV_TAG_BASE, GATHERV_TAG, SCATTERV_TAG, coll_recv, coll_send, displacements,
};
use crate::comm::Communicator;
use crate::error::{MpiError, Result};
use crate::types::{DataType, Rank};

fn check_counts(len: usize, size: i32, operation: &'static str) -> Result<()> {
    if len != size as usize {
        return Err(MpiError::OperationFailed(format!(
            "{operation} needs one count per rank ({size}), got {len}"
        )));
    }
    Ok(())
}

impl Communicator {
    /// Gather `counts[r]` elements from rank `r` into `recv_buf` on `root`,
    /// packed contiguously in rank order.
    ///
    /// Every rank passes the same `counts`; rank `r` contributes
    /// `counts[r]` elements of `send_buf`.
    pub async fn gatherv(
        &self,
        send_buf: &[u8],
        recv_buf: &mut [u8],
        counts: &[usize],
        dtype: DataType,
        root: Rank,
    ) -> Result<()> {
        self.ensure_active()?;
        self.validate_rank(root)?;
        check_counts(counts.len(), self.size(), "gatherv")?;
        let own = Self::span_bytes(send_buf.len(), counts[self.rank() as usize], dtype)?;

        if self.size() <= 1 {
            Self::span_bytes(recv_buf.len(), counts[0], dtype)?;
            recv_buf[..own].copy_from_slice(&send_buf[..own]);
            return Ok(());
        }

        if self.rank() == root {
            let elem = dtype.size_in_bytes();
            let displs = displacements(counts, elem);
            let total: usize = counts.iter().map(|c| c * elem).sum();
            if recv_buf.len() < total {
                return Err(MpiError::OperationFailed(format!(
                    "gatherv needs {total} bytes at the root, buffer has {}",
                    recv_buf.len()
                )));
            }

            let own_off = displs[root as usize];
            recv_buf[own_off..own_off + own].copy_from_slice(&send_buf[..own]);

            for r in (0..self.size()).filter(|&r| r != root) {
                let off = displs[r as usize];
                let len = counts[r as usize] * elem;
                coll_recv(
                    self,
                    r,
                    GATHERV_TAG,
                    &mut recv_buf[off..off + len],
                    "gatherv",
                )
                .await?;
            }
        } else {
            coll_send(self, root, GATHERV_TAG, &send_buf[..own], "gatherv").await?;
        }
        Ok(())
    }

    /// Scatter `counts[r]` elements of `send_buf` on `root` to rank `r`,
    /// read contiguously in rank order.
    pub async fn scatterv(
        &self,
        send_buf: &[u8],
        counts: &[usize],
        recv_buf: &mut [u8],
        dtype: DataType,
        root: Rank,
    ) -> Result<()> {
        self.ensure_active()?;
        self.validate_rank(root)?;
        check_counts(counts.len(), self.size(), "scatterv")?;
        let own = Self::span_bytes(recv_buf.len(), counts[self.rank() as usize], dtype)?;

        if self.size() <= 1 {
            Self::span_bytes(send_buf.len(), counts[0], dtype)?;
            recv_buf[..own].copy_from_slice(&send_buf[..own]);
            return Ok(());
        }

        if self.rank() == root {
            let elem = dtype.size_in_bytes();
            let displs = displacements(counts, elem);
            let total: usize = counts.iter().map(|c| c * elem).sum();
            if send_buf.len() < total {
                return Err(MpiError::OperationFailed(format!(
                    "scatterv needs {total} bytes at the root, buffer has {}",
                    send_buf.len()
                )));
            }

            let sends = (0..self.size()).filter(|&r| r != root).map(|r| {
                let off = displs[r as usize];
                let len = counts[r as usize] * elem;
                coll_send(self, r, SCATTERV_TAG, &send_buf[off..off + len], "scatterv")
            });
            futures::future::try_join_all(sends).await?;

            let own_off = displs[root as usize];
            recv_buf[..own].copy_from_slice(&send_buf[own_off..own_off + own]);
        } else {
            coll_recv(self, root, SCATTERV_TAG, &mut recv_buf[..own], "scatterv").await?;
        }
        Ok(())
    }

    /// Pairwise exchange with per-rank counts: rank `r` sends
    /// `send_counts[i]` elements to rank `i` and receives `recv_counts[j]`
    /// elements from rank `j`, both packed contiguously in rank order.
    pub async fn alltoallv(
        &self,
        send_buf: &[u8],
        send_counts: &[usize],
        recv_buf: &mut [u8],
        recv_counts: &[usize],
        dtype: DataType,
    ) -> Result<()> {
        self.ensure_active()?;
        let size = self.size();
        let rank = self.rank() as usize;
        check_counts(send_counts.len(), size, "alltoallv")?;
        check_counts(recv_counts.len(), size, "alltoallv")?;
        if send_counts[rank] != recv_counts[rank] {
            return Err(MpiError::OperationFailed(format!(
                "alltoallv self chunk mismatch: sending {} elements, expecting {}",
                send_counts[rank], recv_counts[rank]
            )));
        }

        let elem = dtype.size_in_bytes();
        let send_displs = displacements(send_counts, elem);
        let recv_displs = displacements(recv_counts, elem);
        let send_total: usize = send_counts.iter().map(|c| c * elem).sum();
        let recv_total: usize = recv_counts.iter().map(|c| c * elem).sum();
        if send_buf.len() < send_total || recv_buf.len() < recv_total {
            return Err(MpiError::OperationFailed(
                "alltoallv buffers shorter than the counts describe".into(),
            ));
        }

        let own_len = send_counts[rank] * elem;
        recv_buf[recv_displs[rank]..recv_displs[rank] + own_len]
            .copy_from_slice(&send_buf[send_displs[rank]..send_displs[rank] + own_len]);
        if size <= 1 {
            return Ok(());
        }

        let size = size as usize;
        for step in 1..size {
            let send_to = (rank + step) % size;
            let recv_from = (rank + size - step) % size;

            let send_slice =
                &send_buf[send_displs[send_to]..send_displs[send_to] + send_counts[send_to] * elem];
            let recv_slice = &mut recv_buf
                [recv_displs[recv_from]..recv_displs[recv_from] + recv_counts[recv_from] * elem];

            tokio::try_join!(
                coll_send(
                    self,
                    send_to as Rank,
                    ALLTOALLV_TAG_BASE + rank as i32,
                    send_slice,
                    "alltoallv",
                ),
                coll_recv(
                    self,
                    recv_from as Rank,
                    ALLTOALLV_TAG_BASE + recv_from as i32,
                    recv_slice,
                    "alltoallv",
                ),
            )?;
        }
        Ok(())
    }
}
