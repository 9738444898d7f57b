//! Communicators and the point-to-point surface.
//!
//! A communicator is a group of ranks plus a private wire-tag window. All
//! payloads are byte slices; `count` and the datatype fix how many bytes an
//! operation moves and how statuses count elements.

use crate::engine::{RecvDest, TagSelector};
use crate::error::{MpiError, Result};
use crate::manager::ProcessManager;
use crate::protocol::Frame;
use crate::request::{CompletionSlot, Request};
use crate::types::{
    ANY_SOURCE, ANY_TAG, DataType, RESERVED_TAG_HI, RESERVED_TAG_LO, Rank, Status, TAG_SPACE_SPAN,
    Tag,
};
use std::sync::Arc;

/// A group of ranks `{0..size-1}` with this process's rank inside it.
///
/// Duplication ([`Communicator::dup`]) yields a communicator over the same
/// group with a fresh tag window, so its traffic can never match the
/// parent's. Freeing a communicator releases only the tag window; the
/// underlying transports live until [`crate::finalize`].
pub struct Communicator {
    mgr: Arc<ProcessManager>,
    comm_id: i32,
    tag_base: Tag,
}

impl Communicator {
    pub(crate) fn world(mgr: Arc<ProcessManager>) -> Self {
        Self {
            mgr,
            comm_id: 0,
            tag_base: 0,
        }
    }

    /// This process's rank within the communicator (0-indexed).
    pub fn rank(&self) -> Rank {
        self.mgr.rank()
    }

    /// Total number of ranks in the communicator.
    pub fn size(&self) -> i32 {
        self.mgr.size()
    }

    /// The communicator id (0 = world).
    pub fn id(&self) -> i32 {
        self.comm_id
    }

    /// Duplicate: same group, fresh tag window.
    pub fn dup(&self) -> Result<Communicator> {
        self.mgr.check_active()?;
        let comm_id = self.mgr.alloc_comm_id()?;
        Ok(Communicator {
            mgr: Arc::clone(&self.mgr),
            comm_id,
            tag_base: comm_id * TAG_SPACE_SPAN,
        })
    }

    /// Release this communicator's tag window.
    ///
    /// Purely a handle operation: in-flight traffic of other communicators
    /// and the transport mesh are untouched.
    pub fn free(self) {}

    pub(crate) fn collective_timeout(&self) -> std::time::Duration {
        self.mgr.config().collective_timeout
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        self.mgr.check_active()
    }

    pub(crate) fn validate_rank(&self, rank: Rank) -> Result<()> {
        self.validate_dest(rank)
    }

    fn validate_dest(&self, rank: Rank) -> Result<()> {
        if rank < 0 || rank >= self.size() {
            return Err(MpiError::InvalidRank {
                rank,
                world_size: self.size(),
            });
        }
        Ok(())
    }

    fn validate_src(&self, rank: Rank) -> Result<()> {
        if rank == ANY_SOURCE {
            return Ok(());
        }
        self.validate_dest(rank)
    }

    /// User tags: non-negative, inside the window, outside the collective
    /// band `[RESERVED_TAG_LO, RESERVED_TAG_HI)`.
    fn validate_user_tag(&self, tag: Tag) -> Result<()> {
        if tag < 0 || tag >= TAG_SPACE_SPAN || (tag >= RESERVED_TAG_LO && tag < RESERVED_TAG_HI) {
            return Err(MpiError::InvalidTag(tag));
        }
        Ok(())
    }

    fn validate_recv_tag(&self, tag: Tag) -> Result<()> {
        if tag == ANY_TAG {
            return Ok(());
        }
        self.validate_user_tag(tag)
    }

    fn selector_for(&self, tag: Tag) -> TagSelector {
        if tag == ANY_TAG {
            TagSelector::AnyInWindow {
                base: self.tag_base,
                span: TAG_SPACE_SPAN,
            }
        } else {
            TagSelector::Exact(self.tag_base + tag)
        }
    }

    pub(crate) fn span_bytes(buf_len: usize, count: usize, dtype: DataType) -> Result<usize> {
        let nbytes = count * dtype.size_in_bytes();
        if buf_len < nbytes {
            return Err(MpiError::OperationFailed(format!(
                "buffer of {buf_len} bytes holds fewer than {count} {dtype} elements"
            )));
        }
        Ok(nbytes)
    }

    // ── Wire-level paths shared with the collectives ────────────────

    /// Send raw bytes with an already-window-mapped tag.
    ///
    /// Self-sends append straight to the local unexpected queue; no network
    /// connection to self exists.
    pub(crate) async fn send_wire(&self, dest: Rank, wire_tag: Tag, bytes: &[u8]) -> Result<()> {
        if dest == self.rank() {
            self.mgr.engine().deliver(Frame {
                source: self.rank(),
                tag: wire_tag,
                payload: bytes.to_vec(),
            });
            return Ok(());
        }
        let status = Status {
            source: dest,
            tag: wire_tag - self.tag_base,
            count: bytes.len(),
        };
        let slot = self.mgr.peer(dest)?.enqueue(
            self.rank(),
            wire_tag,
            bytes.to_vec(),
            status,
            self.mgr.track_send(),
        )?;
        slot.wait().await.map(|_| ())
    }

    /// Receive raw bytes for an exact wire tag into `buf`; returns the
    /// payload length in bytes.
    pub(crate) async fn recv_wire(&self, src: Rank, wire_tag: Tag, buf: &mut [u8]) -> Result<usize> {
        let slot = CompletionSlot::new();
        let engine = Arc::clone(self.mgr.engine());
        let id = engine.post(
            src,
            TagSelector::Exact(wire_tag),
            self.tag_base,
            RecvDest::new(buf.as_mut_ptr(), buf.len()),
            1,
            Arc::clone(&slot),
        );
        let status = Request::recv(slot, engine, id).wait().await?;
        Ok(status.count)
    }

    pub(crate) fn wire_tag(&self, tag: Tag) -> Tag {
        self.tag_base + tag
    }

    // ── Point-to-point surface ──────────────────────────────────────

    /// Blocking send: frame `count` elements of `buf` and hand them to the
    /// destination's transport. Returns once the kernel has the bytes.
    pub async fn send(
        &self,
        buf: &[u8],
        count: usize,
        dtype: DataType,
        dest: Rank,
        tag: Tag,
    ) -> Result<()> {
        self.mgr.check_active()?;
        self.validate_dest(dest)?;
        self.validate_user_tag(tag)?;
        let nbytes = Self::span_bytes(buf.len(), count, dtype)?;
        self.send_wire(dest, self.wire_tag(tag), &buf[..nbytes]).await
    }

    /// Blocking receive for up to `count` elements. `ANY_SOURCE` / `ANY_TAG`
    /// are legal; the returned status names the actual source and tag.
    ///
    /// Waits indefinitely by default; an arriving payload larger than the
    /// buffer fails with truncation.
    pub async fn recv(
        &self,
        buf: &mut [u8],
        count: usize,
        dtype: DataType,
        src: Rank,
        tag: Tag,
    ) -> Result<Status> {
        self.mgr.check_active()?;
        self.validate_src(src)?;
        self.validate_recv_tag(tag)?;
        let cap = Self::span_bytes(buf.len(), count, dtype)?;

        let slot = CompletionSlot::new();
        let engine = Arc::clone(self.mgr.engine());
        let id = engine.post(
            src,
            self.selector_for(tag),
            self.tag_base,
            RecvDest::new(buf.as_mut_ptr(), cap),
            dtype.size_in_bytes(),
            Arc::clone(&slot),
        );
        // The request's drop hook withdraws the posted receive if this
        // future is dropped before completion, so `buf` is never written
        // after the borrow ends.
        Request::recv(slot, engine, id).wait().await
    }

    /// Non-blocking send. The payload is captured by the framing copy at
    /// call time (the same single copy every send performs), so the request
    /// does not borrow `buf`.
    ///
    /// Completion — observable via `wait`/`test` — means the framed bytes
    /// were handed to the transport.
    pub fn isend(
        &self,
        buf: &[u8],
        count: usize,
        dtype: DataType,
        dest: Rank,
        tag: Tag,
    ) -> Result<Request> {
        self.mgr.check_active()?;
        self.validate_dest(dest)?;
        self.validate_user_tag(tag)?;
        let nbytes = Self::span_bytes(buf.len(), count, dtype)?;

        let wire_tag = self.wire_tag(tag);
        let payload = buf[..nbytes].to_vec();
        let status = Status {
            source: dest,
            tag,
            count,
        };

        if dest == self.rank() {
            self.mgr.engine().deliver(Frame {
                source: self.rank(),
                tag: wire_tag,
                payload,
            });
            let slot = CompletionSlot::new();
            slot.complete(Ok(status));
            return Ok(Request::new(slot));
        }

        // Enqueued here, synchronously: two isends to the same destination
        // and tag keep their call order on the wire.
        let slot = self.mgr.peer(dest)?.enqueue(
            self.rank(),
            wire_tag,
            payload,
            status,
            self.mgr.track_send(),
        )?;
        Ok(Request::new(slot))
    }

    /// Non-blocking receive into a raw destination buffer.
    ///
    /// # Safety
    /// `buf` must be valid for `count * dtype.size_in_bytes()` bytes and
    /// must stay valid and otherwise untouched until the returned request is
    /// waited, successfully cancelled, or dropped. Dropping the request
    /// withdraws the receive under the engine lock before returning.
    pub unsafe fn irecv(
        &self,
        buf: *mut u8,
        count: usize,
        dtype: DataType,
        src: Rank,
        tag: Tag,
    ) -> Result<Request> {
        self.mgr.check_active()?;
        self.validate_src(src)?;
        self.validate_recv_tag(tag)?;
        let cap = count * dtype.size_in_bytes();

        let slot = CompletionSlot::new();
        let engine = Arc::clone(self.mgr.engine());
        let id = engine.post(
            src,
            self.selector_for(tag),
            self.tag_base,
            RecvDest::new(buf, cap),
            dtype.size_in_bytes(),
            Arc::clone(&slot),
        );
        Ok(Request::recv(slot, engine, id))
    }

    /// Block until a matching message is available without receiving it.
    ///
    /// The status counts elements of `dtype`; the message stays queued for a
    /// later `recv`.
    pub async fn probe(&self, src: Rank, tag: Tag, dtype: DataType) -> Result<Status> {
        self.mgr.check_active()?;
        self.validate_src(src)?;
        self.validate_recv_tag(tag)?;
        self.mgr
            .engine()
            .probe(
                src,
                self.selector_for(tag),
                self.tag_base,
                dtype.size_in_bytes(),
            )
            .await
    }

    /// Non-blocking probe: `Ok(None)` when nothing matching has arrived.
    pub fn iprobe(&self, src: Rank, tag: Tag, dtype: DataType) -> Result<Option<Status>> {
        self.mgr.check_active()?;
        self.validate_src(src)?;
        self.validate_recv_tag(tag)?;
        self.mgr.engine().iprobe(
            src,
            self.selector_for(tag),
            self.tag_base,
            dtype.size_in_bytes(),
        )
    }
}
