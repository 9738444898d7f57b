use crate::collective::helpers::{SCATTER_TAG, coll_recv, coll_send};
use crate::comm::Communicator;
use crate::error::{MpiError, Result};
use crate::types::{DataType, Rank};

impl Communicator {
    /// Scatter slice `i` of `send_buf` on `root` to rank `i`; every rank
    /// receives `count` elements into `recv_buf`.
    ///
    /// The root sends all foreign slices concurrently and copies its own
    /// locally. `send_buf` is only read on the root.
    pub async fn scatter(
        &self,
        send_buf: &[u8],
        recv_buf: &mut [u8],
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<()> {
        self.ensure_active()?;
        self.validate_rank(root)?;
        let chunk = Self::span_bytes(recv_buf.len(), count, dtype)?;
        let size = self.size();

        if size <= 1 {
            Self::span_bytes(send_buf.len(), count, dtype)?;
            recv_buf[..chunk].copy_from_slice(&send_buf[..chunk]);
            return Ok(());
        }

        if self.rank() == root {
            let total = chunk * size as usize;
            if send_buf.len() < total {
                return Err(MpiError::OperationFailed(format!(
                    "scatter needs {total} bytes at the root, buffer has {}",
                    send_buf.len()
                )));
            }
            let sends = (0..size).filter(|&r| r != root).map(|r| {
                let slice = &send_buf[r as usize * chunk..][..chunk];
                coll_send(self, r, SCATTER_TAG, slice, "scatter")
            });
            futures::future::try_join_all(sends).await?;

            let own = root as usize * chunk;
            recv_buf[..chunk].copy_from_slice(&send_buf[own..own + chunk]);
        } else {
            coll_recv(self, root, SCATTER_TAG, &mut recv_buf[..chunk], "scatter").await?;
        }
        Ok(())
    }
}
