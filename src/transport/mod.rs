pub(crate) mod listener;
pub(crate) mod peer;

pub(crate) use listener::{accept_peer, dial_peer};
pub(crate) use peer::{PeerSender, spawn_recv_loop};
