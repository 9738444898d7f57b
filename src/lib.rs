//! MPI-style message passing over plain TCP sockets.
//!
//! A job is `N` processes on one host, each started by an external launcher
//! with its identity in the environment: `TCPMPI_SIZE`, `TCPMPI_RANK` and
//! `TCPMPI_PORT_BASE` (rank `r` listens on `PORT_BASE + r` on loopback).
//! [`initialize`] establishes a persistent full mesh of TCP connections and
//! returns the world [`Communicator`]; [`finalize`] tears everything down.
//!
//! Point-to-point messages are matched by `(source, tag)` with
//! [`ANY_SOURCE`]/[`ANY_TAG`] wildcards; within one `(source, destination,
//! tag)` triple delivery order equals send order. Non-blocking operations
//! return a [`Request`] observed through `wait`/`test`, with
//! [`wait_all`]/[`wait_any`] combinators. Collectives (barrier, bcast,
//! reduce, allreduce, gather(v), scatter(v), allgather, alltoall(v),
//! scan/exscan) are layered on the same primitives.
//!
//! Wire format: a 16-byte little-endian header `{i32 source, i32 tag,
//! i32 length, i32 reserved = 0}` followed by the raw payload bytes.
//!
//! Tags: each communicator owns a window of [`TAG_SPACE_SPAN`] wire tags.
//! User tags must be non-negative, below the span, and outside the band
//! `[1000, 10000)` reserved for collectives (see the table in the
//! collective helpers). Posting `ANY_TAG` receives while a collective is in
//! flight on the same communicator can intercept collective traffic and is
//! erroneous.
//!
//! The transport trusts its network: loopback or equivalent. There is no
//! authentication, encryption, or checksumming beyond TCP's.

mod comm;
mod engine;
mod kernels;
mod manager;
mod request;

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub(crate) mod collective;
pub(crate) mod transport;

pub use comm::Communicator;
pub use config::MpiConfig;
pub use error::{MpiError, Result};
pub use manager::{abort, bootstrap_local, finalize, initialize, initialize_with};
pub use request::{Request, wait_all, wait_any};
pub use types::{
    ANY_SOURCE, ANY_TAG, DataType, Rank, ReduceOp, Status, TAG_SPACE_SPAN, Tag,
};
