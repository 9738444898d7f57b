use crate::collective::helpers::{REDUCE_TAG, coll_recv, coll_send};
use crate::comm::Communicator;
use crate::error::Result;
use crate::kernels;
use crate::types::{DataType, Rank, ReduceOp};

impl Communicator {
    /// Reduce `count` elements from every rank into `recv_buf` on `root`
    /// with the kernel selected by `(op, dtype)`.
    ///
    /// Non-root ranks send their contribution; the root starts from its own
    /// buffer and folds each arriving contribution in ascending rank order.
    /// `recv_buf` on non-root ranks is left untouched.
    pub async fn reduce(
        &self,
        send_buf: &[u8],
        recv_buf: &mut [u8],
        count: usize,
        dtype: DataType,
        op: ReduceOp,
        root: Rank,
    ) -> Result<()> {
        self.ensure_active()?;
        self.validate_rank(root)?;
        kernels::ensure_supported(dtype, op)?;
        let nbytes = Self::span_bytes(send_buf.len(), count, dtype)?;

        if self.size() <= 1 {
            Self::span_bytes(recv_buf.len(), count, dtype)?;
            recv_buf[..nbytes].copy_from_slice(&send_buf[..nbytes]);
            return Ok(());
        }

        if self.rank() == root {
            Self::span_bytes(recv_buf.len(), count, dtype)?;
            recv_buf[..nbytes].copy_from_slice(&send_buf[..nbytes]);

            let mut contribution = vec![0u8; nbytes];
            for r in (0..self.size()).filter(|&r| r != root) {
                coll_recv(self, r, REDUCE_TAG, &mut contribution, "reduce").await?;
                kernels::fold(&mut recv_buf[..nbytes], &contribution, count, dtype, op)?;
            }
        } else {
            coll_send(self, root, REDUCE_TAG, &send_buf[..nbytes], "reduce").await?;
        }
        Ok(())
    }
}
