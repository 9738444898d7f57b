use crate::comm::Communicator;
use crate::error::{MpiError, Result};
use crate::types::DataType;

impl Communicator {
    /// Gather every rank's `count` elements into `recv_buf` on all ranks,
    /// ordered by rank.
    ///
    /// Gather-to-0 followed by broadcast-from-0.
    pub async fn allgather(
        &self,
        send_buf: &[u8],
        recv_buf: &mut [u8],
        count: usize,
        dtype: DataType,
    ) -> Result<()> {
        let chunk = Self::span_bytes(send_buf.len(), count, dtype)?;
        let total = chunk * self.size() as usize;
        if recv_buf.len() < total {
            return Err(MpiError::OperationFailed(format!(
                "allgather needs {total} bytes on every rank, buffer has {}",
                recv_buf.len()
            )));
        }
        self.gather(send_buf, recv_buf, count, dtype, 0).await?;
        self.bcast(recv_buf, count * self.size() as usize, dtype, 0)
            .await
    }
}
