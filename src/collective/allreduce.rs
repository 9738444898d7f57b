use crate::comm::Communicator;
use crate::error::Result;
use crate::types::{DataType, ReduceOp};

impl Communicator {
    /// Reduce across all ranks and leave the result in `recv_buf` on every
    /// rank.
    ///
    /// Reduce-to-0 followed by broadcast-from-0; the observable result is
    /// identical to any tree or ring formulation.
    pub async fn allreduce(
        &self,
        send_buf: &[u8],
        recv_buf: &mut [u8],
        count: usize,
        dtype: DataType,
        op: ReduceOp,
    ) -> Result<()> {
        Self::span_bytes(recv_buf.len(), count, dtype)?;
        self.reduce(send_buf, recv_buf, count, dtype, op, 0).await?;
        self.bcast(recv_buf, count, dtype, 0).await
    }
}
