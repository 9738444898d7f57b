use crate::collective::helpers::{BARRIER_TAG, coll_recv, coll_send};
use crate::comm::Communicator;
use crate::error::Result;

impl Communicator {
    /// Block until every rank of the communicator has entered the barrier.
    ///
    /// Two phases through rank 0: every other rank announces arrival, rank 0
    /// releases everyone once all announcements are in.
    pub async fn barrier(&self) -> Result<()> {
        self.ensure_active()?;
        let size = self.size();
        let rank = self.rank();
        if size <= 1 {
            return Ok(());
        }

        if rank == 0 {
            let arrivals = (1..size).map(|r| async move {
                let mut empty: [u8; 0] = [];
                coll_recv(self, r, BARRIER_TAG, &mut empty, "barrier").await
            });
            futures::future::try_join_all(arrivals).await?;

            let releases = (1..size).map(|r| coll_send(self, r, BARRIER_TAG, &[], "barrier"));
            futures::future::try_join_all(releases).await?;
        } else {
            coll_send(self, 0, BARRIER_TAG, &[], "barrier").await?;
            let mut empty: [u8; 0] = [];
            coll_recv(self, 0, BARRIER_TAG, &mut empty, "barrier").await?;
        }
        Ok(())
    }
}
