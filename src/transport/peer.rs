//! Per-peer transport halves.
//!
//! Each ordered pair of ranks has one dedicated TCP connection: the dialing
//! side keeps the write half and sends frames on it, the accepting side
//! keeps the read half and runs a receive loop feeding the match engine.

use crate::engine::MatchEngine;
use crate::error::{MpiError, Result};
use crate::manager::SendGuard;
use crate::protocol::MAX_PAYLOAD_LEN;
use crate::protocol::frame::{read_frame, write_frame};
use crate::request::CompletionSlot;
use crate::types::{Rank, Status, Tag};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

/// One frame waiting in a peer's outgoing queue.
struct Outgoing {
    remote: Rank,
    source: Rank,
    tag: Tag,
    payload: Vec<u8>,
    /// Outcome published when the kernel has accepted the bytes.
    status: Status,
    slot: Arc<CompletionSlot>,
    /// Keeps the manager's in-flight counter up until the write finishes.
    _guard: SendGuard,
}

impl Drop for Outgoing {
    fn drop(&mut self) {
        // A frame dropped without being written (writer aborted at
        // finalize) must still terminate its request.
        if self.slot.peek().is_none() {
            self.slot.complete(Err(MpiError::communication(
                self.remote,
                "send abandoned at shutdown",
            )));
        }
    }
}

/// Outbound half of a peer connection.
///
/// Sends are pushed onto the outgoing queue synchronously at call time and
/// written by a single writer task, so frames from one caller keep their
/// call order and never interleave on the wire. A send completes when the
/// kernel has accepted the bytes; the only acknowledgement beyond that is
/// TCP's.
pub(crate) struct PeerSender {
    remote: Rank,
    queue: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    failed: Arc<AtomicBool>,
    writer_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PeerSender {
    pub(crate) fn new(remote: Rank, writer: OwnedWriteHalf, send_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let failed = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(write_loop(
            remote,
            writer,
            rx,
            Arc::clone(&failed),
            send_timeout,
        ));
        Self {
            remote,
            queue: Mutex::new(Some(tx)),
            failed,
            writer_task: Mutex::new(Some(task)),
        }
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Queue one frame for the writer task. Returns the completion slot the
    /// caller can wait on; queue order is wire order.
    pub(crate) fn enqueue(
        &self,
        source: Rank,
        tag: Tag,
        payload: Vec<u8>,
        status: Status,
        guard: SendGuard,
    ) -> Result<Arc<CompletionSlot>> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(MpiError::OperationFailed(format!(
                "payload of {} bytes exceeds the frame limit",
                payload.len()
            )));
        }
        if self.is_failed() {
            return Err(MpiError::communication(
                self.remote,
                "peer transport already failed",
            ));
        }

        let slot = CompletionSlot::new();
        let out = Outgoing {
            remote: self.remote,
            source,
            tag,
            payload,
            status,
            slot: Arc::clone(&slot),
            _guard: guard,
        };
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(tx) if tx.send(out).is_ok() => Ok(slot),
            _ => Err(MpiError::communication(
                self.remote,
                "peer transport closed",
            )),
        }
    }

    /// Stop accepting new sends; the writer drains what is already queued,
    /// then half-closes the socket.
    pub(crate) fn close_queue(&self) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.take();
    }

    /// Kill a writer stuck on a send that the kernel will not accept.
    pub(crate) fn abort_writer(&self) {
        let mut task = self
            .writer_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = task.take() {
            task.abort();
        }
    }
}

/// Single writer per peer: pop frames in queue order, write each within the
/// send timeout, publish the outcome.
///
/// The first failure marks the transport failed; everything still queued
/// (and every later enqueue) completes with a communication error. Exits
/// when the queue side is dropped, half-closing the socket so the peer sees
/// EOF.
async fn write_loop(
    remote: Rank,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    failed: Arc<AtomicBool>,
    send_timeout: Duration,
) {
    while let Some(out) = rx.recv().await {
        if failed.load(Ordering::Acquire) {
            out.slot.complete(Err(MpiError::communication(
                remote,
                "peer transport already failed",
            )));
            continue;
        }
        let write = write_frame(&mut writer, out.source, out.tag, &out.payload);
        match tokio::time::timeout(send_timeout, write).await {
            Ok(Ok(())) => out.slot.complete(Ok(out.status)),
            Ok(Err(e)) => {
                failed.store(true, Ordering::Release);
                tracing::warn!(peer = remote, error = %e, "send failed, transport marked failed");
                out.slot.complete(Err(MpiError::communication(remote, e)));
            }
            Err(_) => {
                failed.store(true, Ordering::Release);
                tracing::warn!(
                    peer = remote,
                    timeout_ms = send_timeout.as_millis() as u64,
                    "kernel did not accept frame in time, transport marked failed"
                );
                out.slot.complete(Err(MpiError::communication(
                    remote,
                    format!("send timed out after {}s", send_timeout.as_secs()),
                )));
            }
        }
    }
    let _ = writer.shutdown().await;
}

/// Spawn the receive loop for an inbound connection: read frames in order
/// and hand each to the match engine.
///
/// Runs until EOF or an I/O error; either way the frames already delivered
/// stay valid. The manager aborts the task at finalize.
pub(crate) fn spawn_recv_loop(
    remote: Rank,
    mut reader: OwnedReadHalf,
    engine: Arc<MatchEngine>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if frame.source != remote {
                        // Header identity comes from the sender; a mismatch
                        // with the connection's handshake rank is suspicious
                        // but matching still goes by the header.
                        tracing::debug!(
                            conn = remote,
                            header_src = frame.source,
                            "frame source differs from connection peer"
                        );
                    }
                    engine.deliver(frame);
                }
                Ok(None) => {
                    tracing::debug!(peer = remote, "peer closed connection");
                    return;
                }
                Err(e) => {
                    tracing::warn!(peer = remote, error = %e, "receive loop failed");
                    return;
                }
            }
        }
    })
}
