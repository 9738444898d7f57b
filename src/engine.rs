//! Receive-side matching: pairs arriving frames with posted receives by
//! (source, tag), with wildcard support.
//!
//! Two queues under a single mutex: the unexpected queue (UQ) holds frames
//! that arrived before a matching receive, in arrival order; the
//! posted-receive queue (PRQ) holds receives with no matching frame yet, in
//! post order. Every arriving frame is matched immediately or enqueued,
//! never dropped. Payload copies into the destination buffer happen under
//! the lock, before the completion is published.

use crate::error::{MpiError, Result};
use crate::protocol::Frame;
use crate::request::CompletionSlot;
use crate::types::{ANY_SOURCE, Rank, Status, Tag};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// Tag pattern a posted receive (or probe) matches against wire tags.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TagSelector {
    /// Exact wire tag (window base already applied).
    Exact(Tag),
    /// Any tag inside one communicator's wire-tag window.
    AnyInWindow { base: Tag, span: Tag },
}

impl TagSelector {
    fn matches(&self, wire_tag: Tag) -> bool {
        match *self {
            TagSelector::Exact(t) => wire_tag == t,
            TagSelector::AnyInWindow { base, span } => {
                wire_tag >= base && wire_tag < base + span
            }
        }
    }
}

/// Destination of a posted receive.
///
/// Carries a raw pointer so the engine can deliver from a transport task
/// into a buffer the application thread owns. Whoever posts the receive
/// guarantees the pointer stays valid until the receive is terminal or
/// withdrawn; withdrawal and delivery are serialized by the engine lock.
pub(crate) struct RecvDest {
    ptr: *mut u8,
    cap: usize,
}

// The engine moves destinations between tasks; validity is the poster's
// contract (see `Communicator::irecv`).
unsafe impl Send for RecvDest {}

impl RecvDest {
    pub(crate) fn new(ptr: *mut u8, cap: usize) -> Self {
        Self { ptr, cap }
    }

    fn copy_from(&self, payload: &[u8]) {
        debug_assert!(payload.len() <= self.cap);
        // SAFETY: poster guarantees `ptr` valid for `cap` bytes until the
        // receive is terminal; the engine lock is held here.
        unsafe {
            std::ptr::copy_nonoverlapping(payload.as_ptr(), self.ptr, payload.len());
        }
    }
}

struct PostedRecv {
    id: u64,
    want_src: Rank,
    tags: TagSelector,
    /// Window base of the posting communicator, for translating wire tags
    /// back into user tags in the status.
    tag_base: Tag,
    dest: RecvDest,
    elem_size: usize,
    slot: Arc<CompletionSlot>,
}

impl PostedRecv {
    fn matches(&self, frame: &Frame) -> bool {
        (self.want_src == ANY_SOURCE || self.want_src == frame.source)
            && self.tags.matches(frame.tag)
    }

    fn status_for(&self, frame: &Frame) -> Status {
        Status {
            source: frame.source,
            tag: frame.tag - self.tag_base,
            count: frame.payload.len() / self.elem_size,
        }
    }
}

struct EngineState {
    unexpected: VecDeque<Frame>,
    posted: VecDeque<PostedRecv>,
    closed: bool,
}

/// Per-process matching engine shared by all transports and communicators.
pub(crate) struct MatchEngine {
    state: Mutex<EngineState>,
    /// Pulsed on every UQ insertion; blocking probes park here.
    arrivals: Notify,
    next_id: AtomicU64,
}

impl MatchEngine {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState {
                unexpected: VecDeque::new(),
                posted: VecDeque::new(),
                closed: false,
            }),
            arrivals: Notify::new(),
            next_id: AtomicU64::new(1),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arrival path: match `frame` against the PRQ in post order, or append
    /// it to the UQ.
    pub(crate) fn deliver(&self, frame: Frame) {
        let mut st = self.lock_state();
        if st.closed {
            tracing::debug!(src = frame.source, tag = frame.tag, "frame after shutdown dropped");
            return;
        }
        if let Some(idx) = st.posted.iter().position(|r| r.matches(&frame)) {
            let recv = st.posted.remove(idx).expect("index from position");
            // Copy + complete under the lock: a concurrent cancel (or request
            // drop) blocks here until the destination buffer write is done.
            Self::fulfil(recv, frame);
        } else {
            st.unexpected.push_back(frame);
            drop(st);
            self.arrivals.notify_waiters();
        }
    }

    /// Post path: match the receive against the UQ in arrival order, or
    /// append it to the PRQ. Returns the id used for cancellation.
    pub(crate) fn post(
        &self,
        want_src: Rank,
        tags: TagSelector,
        tag_base: Tag,
        dest: RecvDest,
        elem_size: usize,
        slot: Arc<CompletionSlot>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let recv = PostedRecv {
            id,
            want_src,
            tags,
            tag_base,
            dest,
            elem_size,
            slot,
        };

        let mut st = self.lock_state();
        if st.closed {
            drop(st);
            recv.slot.complete(Err(MpiError::NotInitialized));
            return id;
        }
        if let Some(idx) = st.unexpected.iter().position(|f| recv.matches(f)) {
            let frame = st.unexpected.remove(idx).expect("index from position");
            Self::fulfil(recv, frame);
        } else {
            st.posted.push_back(recv);
        }
        id
    }

    /// Complete a matched pair: truncation check, payload copy, status.
    ///
    /// Runs with the engine lock held so withdrawal can never race the
    /// destination-buffer write; the slot mutex then publishes the copied
    /// bytes to the waiter.
    fn fulfil(recv: PostedRecv, frame: Frame) {
        if frame.payload.len() > recv.dest.cap {
            recv.slot.complete(Err(MpiError::Truncated {
                received: frame.payload.len(),
                capacity: recv.dest.cap,
            }));
            return;
        }
        let status = recv.status_for(&frame);
        recv.dest.copy_from(&frame.payload);
        recv.slot.complete(Ok(status));
    }

    /// Withdraw a posted receive. Fails if it has already been matched.
    pub(crate) fn cancel(&self, id: u64) -> Result<()> {
        let mut st = self.lock_state();
        if let Some(idx) = st.posted.iter().position(|r| r.id == id) {
            let recv = st.posted.remove(idx).expect("index from position");
            drop(st);
            recv.slot.complete(Err(MpiError::Cancelled));
            Ok(())
        } else {
            Err(MpiError::OperationFailed(
                "receive already matched; wait for it instead".into(),
            ))
        }
    }

    /// Inspect the UQ for a matching frame without removing it.
    pub(crate) fn iprobe(
        &self,
        want_src: Rank,
        tags: TagSelector,
        tag_base: Tag,
        elem_size: usize,
    ) -> Result<Option<Status>> {
        let st = self.lock_state();
        if st.closed {
            return Err(MpiError::NotInitialized);
        }
        let found = st.unexpected.iter().find(|f| {
            (want_src == ANY_SOURCE || want_src == f.source) && tags.matches(f.tag)
        });
        Ok(found.map(|f| Status {
            source: f.source,
            tag: f.tag - tag_base,
            count: f.payload.len() / elem_size,
        }))
    }

    /// Block until a matching frame is present in the UQ.
    pub(crate) async fn probe(
        &self,
        want_src: Rank,
        tags: TagSelector,
        tag_base: Tag,
        elem_size: usize,
    ) -> Result<Status> {
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            // Register before scanning, or an arrival landing in between
            // would be missed.
            notified.as_mut().enable();
            if let Some(status) = self.iprobe(want_src, tags, tag_base, elem_size)? {
                return Ok(status);
            }
            notified.await;
        }
    }

    /// Shut the engine down: fail every posted receive, discard unexpected
    /// frames, and reject all further traffic.
    pub(crate) fn close(&self, error: MpiError) {
        let (posted, dropped) = {
            let mut st = self.lock_state();
            st.closed = true;
            let posted: Vec<PostedRecv> = st.posted.drain(..).collect();
            let dropped = st.unexpected.len();
            st.unexpected.clear();
            (posted, dropped)
        };
        if dropped > 0 {
            tracing::debug!(count = dropped, "unexpected frames discarded at shutdown");
        }
        for recv in posted {
            recv.slot.complete(Err(error.clone()));
        }
        // Wake any probes so they observe the closed state.
        self.arrivals.notify_waiters();
    }

    #[cfg(test)]
    fn queue_depths(&self) -> (usize, usize) {
        let st = self.lock_state();
        (st.unexpected.len(), st.posted.len())
    }
}
