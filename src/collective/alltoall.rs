use crate::collective::helpers::{ALLTOALL_TAG_BASE, coll_recv, coll_send};
use crate::comm::Communicator;
use crate::error::{MpiError, Result};
use crate::types::DataType;

impl Communicator {
    /// Every rank sends slice `i` of `send_buf` to rank `i` and receives
    /// rank `j`'s slice into position `j` of `recv_buf`.
    ///
    /// Pairwise exchange: in step `s`, rank `r` sends to `r + s` and
    /// receives from `r - s` (mod size), so the symmetric sends can never
    /// deadlock. Tags carry the sender's rank so concurrent steps between
    /// the same pair stay distinct.
    pub async fn alltoall(
        &self,
        send_buf: &[u8],
        recv_buf: &mut [u8],
        count: usize,
        dtype: DataType,
    ) -> Result<()> {
        self.ensure_active()?;
        let size = self.size() as usize;
        let rank = self.rank() as usize;
        let chunk = count * dtype.size_in_bytes();
        let total = chunk * size;
        if send_buf.len() < total || recv_buf.len() < total {
            return Err(MpiError::OperationFailed(format!(
                "alltoall needs {total} bytes in both buffers"
            )));
        }

        // Own slice never touches the network.
        recv_buf[rank * chunk..][..chunk].copy_from_slice(&send_buf[rank * chunk..][..chunk]);
        if size <= 1 {
            return Ok(());
        }

        for step in 1..size {
            let send_to = (rank + step) % size;
            let recv_from = (rank + size - step) % size;

            let send_slice = &send_buf[send_to * chunk..][..chunk];
            let recv_slice = &mut recv_buf[recv_from * chunk..][..chunk];

            tokio::try_join!(
                coll_send(
                    self,
                    send_to as i32,
                    ALLTOALL_TAG_BASE + rank as i32,
                    send_slice,
                    "alltoall",
                ),
                coll_recv(
                    self,
                    recv_from as i32,
                    ALLTOALL_TAG_BASE + recv_from as i32,
                    recv_slice,
                    "alltoall",
                ),
            )?;
        }
        Ok(())
    }
}
