use crate::types::{DataType, Rank, Tag};

pub type Result<T> = std::result::Result<T, MpiError>;

/// Every failure mode of the runtime.
///
/// Variants are cloneable so a single completion outcome can be observed
/// through `test` repeatedly and by `wait_all` aggregation; I/O causes are
/// captured as rendered context strings.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MpiError {
    #[error("runtime already initialized")]
    AlreadyInitialized,

    #[error("runtime not initialized")]
    NotInitialized,

    #[error("initialization failed: {0}")]
    InitFailed(String),

    #[error("finalization failed: {0}")]
    FinalizeFailed(String),

    #[error("communicator is no longer valid")]
    InvalidCommunicator,

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: i32 },

    #[error("invalid tag {0}: user tags must be non-negative and outside the reserved band")]
    InvalidTag(Tag),

    #[error("datatype {dtype} not supported by {op}")]
    InvalidDatatype { dtype: DataType, op: &'static str },

    #[error("communication with rank {rank} failed: {reason}")]
    Communication { rank: Rank, reason: String },

    #[error("message truncated: {received} bytes arrived for a {capacity}-byte buffer")]
    Truncated { received: usize, capacity: usize },

    #[error("connection to rank {rank} failed: {reason}")]
    Connection { rank: Rank, reason: String },

    #[error("process spawn failed: {0}")]
    SpawnFailed(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("{operation} failed at rank {rank}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        rank: Rank,
        reason: String,
    },

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl MpiError {
    /// Create a `Communication` error with a rendered reason.
    pub fn communication(rank: Rank, reason: impl std::fmt::Display) -> Self {
        Self::Communication {
            rank,
            reason: reason.to_string(),
        }
    }

    /// Create a `Connection` error with a rendered reason.
    pub fn connection(rank: Rank, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            rank,
            reason: reason.to_string(),
        }
    }

    /// True for transport-level failures (including truncation), the
    /// category the wire contract calls "communication".
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            Self::Communication { .. } | Self::Truncated { .. }
        )
    }
}
