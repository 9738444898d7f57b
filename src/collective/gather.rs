use crate::collective::helpers::{GATHER_TAG, coll_recv, coll_send};
use crate::comm::Communicator;
use crate::error::{MpiError, Result};
use crate::types::{DataType, Rank};

impl Communicator {
    /// Gather `count` elements from every rank into `recv_buf` on `root`,
    /// placed at offset `rank * count * elem_size` and ordered by rank.
    ///
    /// Flat gather: the root copies its own chunk locally and posts one
    /// concurrent receive per other rank; every other rank sends its chunk.
    /// `recv_buf` is only read on the root.
    pub async fn gather(
        &self,
        send_buf: &[u8],
        recv_buf: &mut [u8],
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<()> {
        self.ensure_active()?;
        self.validate_rank(root)?;
        let chunk = Self::span_bytes(send_buf.len(), count, dtype)?;
        let size = self.size();

        if size <= 1 {
            Self::span_bytes(recv_buf.len(), count, dtype)?;
            recv_buf[..chunk].copy_from_slice(&send_buf[..chunk]);
            return Ok(());
        }

        if self.rank() == root {
            let total = chunk * size as usize;
            if recv_buf.len() < total {
                return Err(MpiError::OperationFailed(format!(
                    "gather needs {total} bytes at the root, buffer has {}",
                    recv_buf.len()
                )));
            }
            let own = root as usize * chunk;
            recv_buf[own..own + chunk].copy_from_slice(&send_buf[..chunk]);

            let recvs = recv_buf[..total]
                .chunks_mut(chunk)
                .enumerate()
                .filter(|(r, _)| *r != root as usize)
                .map(|(r, slot)| coll_recv(self, r as Rank, GATHER_TAG, slot, "gather"));
            futures::future::try_join_all(recvs).await?;
        } else {
            coll_send(self, root, GATHER_TAG, &send_buf[..chunk], "gather").await?;
        }
        Ok(())
    }
}
