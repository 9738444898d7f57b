//! Collective algorithms, layered strictly on the point-to-point paths with
//! tags from the communicator's reserved band.

pub(crate) mod helpers;

mod allgather;
mod allreduce;
mod alltoall;
mod barrier;
mod broadcast;
mod gather;
mod reduce;
mod scan;
mod scatter;
mod vardata;
