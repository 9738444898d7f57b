//! Connection establishment: deterministic-port listening, dialing with
//! backoff, and the rank handshake.
//!
//! Rank `r` listens on `port_base + r` on loopback. Every connection opens
//! with a 4-byte little-endian handshake carrying the dialer's rank, so the
//! acceptor can file the inbound stream into its peer table.

use crate::error::{MpiError, Result};
use crate::types::Rank;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// First dial-retry delay; doubles up to [`DIAL_RETRY_MAX`]. The overall
/// budget is the caller's init timeout.
const DIAL_RETRY_START: Duration = Duration::from_millis(10);
const DIAL_RETRY_MAX: Duration = Duration::from_millis(500);

/// Loopback address for a given port.
pub(crate) fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Bind this rank's listener.
pub(crate) async fn bind_listener(rank: Rank, port: u16) -> Result<TcpListener> {
    TcpListener::bind(loopback(port))
        .await
        .map_err(|e| MpiError::connection(rank, format!("bind 127.0.0.1:{port}: {e}")))
}

/// Accept one inbound connection and read its rank handshake.
///
/// Range and duplicate checks are the caller's job; this returns whatever
/// rank the dialer claimed.
pub(crate) async fn accept_peer(listener: &TcpListener) -> Result<(Rank, TcpStream)> {
    let (mut stream, addr) = listener
        .accept()
        .await
        .map_err(|e| MpiError::InitFailed(format!("accept: {e}")))?;
    stream
        .set_nodelay(true)
        .map_err(|e| MpiError::InitFailed(format!("set_nodelay: {e}")))?;

    let mut handshake = [0u8; 4];
    stream
        .read_exact(&mut handshake)
        .await
        .map_err(|e| MpiError::InitFailed(format!("handshake from {addr}: {e}")))?;
    let rank = Rank::from_le_bytes(handshake);
    tracing::debug!(peer = rank, %addr, "accepted inbound connection");
    Ok((rank, stream))
}

/// Dial a peer's listener, retrying with exponential backoff until it is up,
/// then send this rank's handshake.
///
/// Retries forever on connection refusal; the caller bounds the whole mesh
/// establishment with its init timeout, which drops this future.
pub(crate) async fn dial_peer(own_rank: Rank, peer: Rank, port: u16) -> Result<(Rank, TcpStream)> {
    let addr = loopback(port);
    let mut delay = DIAL_RETRY_START;
    let mut stream = loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => break stream,
            Err(e) => {
                tracing::debug!(peer, %addr, error = %e, "dial failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(DIAL_RETRY_MAX);
            }
        }
    };
    stream
        .set_nodelay(true)
        .map_err(|e| MpiError::connection(peer, format!("set_nodelay: {e}")))?;
    stream
        .write_all(&own_rank.to_le_bytes())
        .await
        .map_err(|e| MpiError::connection(peer, format!("handshake: {e}")))?;
    tracing::debug!(peer, %addr, "outbound connection established");
    Ok((peer, stream))
}
