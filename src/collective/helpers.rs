//! Reserved tags and timeout-wrapped point-to-point steps shared by the
//! collective algorithms.
//!
//! Tag assignments inside the reserved band `[1000, 10000)` of each
//! communicator's window:
//!
//! | operation   | tag                  |
//! |-------------|----------------------|
//! | bcast       | 1000                 |
//! | reduce      | 2000                 |
//! | gather      | 3000                 |
//! | scatter     | 4000                 |
//! | alltoall    | 5000 + sender rank   |
//! | scan        | 6000                 |
//! | gatherv     | 7000                 |
//! | scatterv    | 8000                 |
//! | alltoallv   | 8500 + sender rank   |
//! | barrier     | 9999                 |

use crate::comm::Communicator;
use crate::error::{MpiError, Result};
use crate::types::{Rank, Tag};

pub(crate) const BCAST_TAG: Tag = 1000;
pub(crate) const REDUCE_TAG: Tag = 2000;
pub(crate) const GATHER_TAG: Tag = 3000;
pub(crate) const SCATTER_TAG: Tag = 4000;
pub(crate) const ALLTOALL_TAG_BASE: Tag = 5000;
pub(crate) const SCAN_TAG: Tag = 6000;
pub(crate) const GATHERV_TAG: Tag = 7000;
pub(crate) const SCATTERV_TAG: Tag = 8000;
pub(crate) const ALLTOALLV_TAG_BASE: Tag = 8500;
pub(crate) const BARRIER_TAG: Tag = 9999;

/// Send one collective step, bounded by the collective timeout.
pub(crate) async fn coll_send(
    comm: &Communicator,
    dest: Rank,
    tag: Tag,
    data: &[u8],
    operation: &'static str,
) -> Result<()> {
    let timeout = comm.collective_timeout();
    match tokio::time::timeout(timeout, comm.send_wire(dest, comm.wire_tag(tag), data)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(MpiError::CollectiveFailed {
            operation,
            rank: dest,
            reason: e.to_string(),
        }),
        Err(_) => Err(MpiError::CollectiveFailed {
            operation,
            rank: dest,
            reason: format!("send timed out after {}s", timeout.as_secs()),
        }),
    }
}

/// Receive one collective step of exactly `buf.len()` bytes, bounded by the
/// collective timeout. Timing out withdraws the posted receive.
pub(crate) async fn coll_recv(
    comm: &Communicator,
    src: Rank,
    tag: Tag,
    buf: &mut [u8],
    operation: &'static str,
) -> Result<()> {
    let timeout = comm.collective_timeout();
    let expected = buf.len();
    match tokio::time::timeout(timeout, comm.recv_wire(src, comm.wire_tag(tag), buf)).await {
        Ok(Ok(n)) if n == expected => Ok(()),
        Ok(Ok(n)) => Err(MpiError::CollectiveFailed {
            operation,
            rank: src,
            reason: format!("expected {expected} bytes, got {n}"),
        }),
        Ok(Err(e)) => Err(MpiError::CollectiveFailed {
            operation,
            rank: src,
            reason: e.to_string(),
        }),
        Err(_) => Err(MpiError::CollectiveFailed {
            operation,
            rank: src,
            reason: format!("recv timed out after {}s", timeout.as_secs()),
        }),
    }
}

/// Byte offsets of each rank's chunk for variable-count collectives.
pub(crate) fn displacements(counts: &[usize], elem_size: usize) -> Vec<usize> {
    counts
        .iter()
        .scan(0usize, |acc, &c| {
            let off = *acc;
            *acc += c * elem_size;
            Some(off)
        })
        .collect()
}
