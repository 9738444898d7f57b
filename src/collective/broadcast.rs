use crate::collective::helpers::{BCAST_TAG, coll_recv, coll_send};
use crate::comm::Communicator;
use crate::error::Result;
use crate::types::{DataType, Rank};

impl Communicator {
    /// Broadcast `count` elements of `buf` from `root` to every rank.
    ///
    /// Flat fan-out: the root sends to all other ranks concurrently, every
    /// other rank posts one receive from the root.
    pub async fn bcast(
        &self,
        buf: &mut [u8],
        count: usize,
        dtype: DataType,
        root: Rank,
    ) -> Result<()> {
        self.ensure_active()?;
        self.validate_rank(root)?;
        let nbytes = Self::span_bytes(buf.len(), count, dtype)?;
        if self.size() <= 1 {
            return Ok(());
        }

        if self.rank() == root {
            let data = &buf[..nbytes];
            let sends = (0..self.size())
                .filter(|&r| r != root)
                .map(|r| coll_send(self, r, BCAST_TAG, data, "bcast"));
            futures::future::try_join_all(sends).await?;
        } else {
            coll_recv(self, root, BCAST_TAG, &mut buf[..nbytes], "bcast").await?;
        }
        Ok(())
    }
}
