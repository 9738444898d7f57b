//! Completion handles for non-blocking operations.
//!
//! Every non-blocking send or receive yields a [`Request`]. The request owns
//! no buffer; the caller keeps the buffer alive (and, for receives,
//! untouched) until the request reaches a terminal state through
//! [`Request::wait`] or [`Request::test`].

use crate::engine::MatchEngine;
use crate::error::{MpiError, Result};
use crate::types::Status;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// One-shot completion slot shared between the party that completes an
/// operation (match engine or send task) and the party that observes it.
///
/// The state mutex doubles as the release/acquire edge: a receive's payload
/// is copied into the destination buffer before `complete` publishes the
/// outcome, so an observer that sees a terminal state also sees the bytes.
pub(crate) struct CompletionSlot {
    state: Mutex<Option<Result<Status>>>,
    done: Notify,
}

impl CompletionSlot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(None),
            done: Notify::new(),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Option<Result<Status>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the terminal outcome. A slot transitions at most once; later
    /// calls are ignored.
    pub(crate) fn complete(&self, outcome: Result<Status>) {
        {
            let mut st = self.lock_state();
            if st.is_some() {
                return;
            }
            *st = Some(outcome);
        }
        self.done.notify_waiters();
    }

    /// Non-blocking observation of the terminal state.
    pub(crate) fn peek(&self) -> Option<Result<Status>> {
        self.lock_state().clone()
    }

    /// Suspend until the slot is terminal.
    pub(crate) async fn wait(&self) -> Result<Status> {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            // Register before checking, or a completion landing in between
            // would be missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.peek() {
                return outcome;
            }
            notified.await;
        }
    }
}

/// Hook that lets a receive request unhook itself from the posted-receive
/// queue on cancellation or early drop.
struct RecvHook {
    engine: Arc<MatchEngine>,
    id: u64,
}

/// Lifecycle handle for a non-blocking operation.
///
/// Terminal states are one-shot: once `wait` or `test` observes completion,
/// the outcome never changes. A receive request dropped before completion
/// withdraws its posted receive under the engine lock, so the engine can
/// never deliver into a buffer whose borrow has ended (same discipline as
/// aborting an in-flight task on handle drop).
pub struct Request {
    pub(crate) slot: Arc<CompletionSlot>,
    recv_hook: Option<RecvHook>,
}

impl Request {
    pub(crate) fn new(slot: Arc<CompletionSlot>) -> Self {
        Self {
            slot,
            recv_hook: None,
        }
    }

    pub(crate) fn recv(slot: Arc<CompletionSlot>, engine: Arc<MatchEngine>, id: u64) -> Self {
        Self {
            slot,
            recv_hook: Some(RecvHook { engine, id }),
        }
    }

    /// Suspend until the operation is terminal and return its outcome.
    pub async fn wait(self) -> Result<Status> {
        self.slot.wait().await
    }

    /// Non-blocking completion check: `None` while pending, otherwise the
    /// terminal outcome.
    pub fn test(&self) -> Option<Result<Status>> {
        self.slot.peek()
    }

    /// Cancel a pending receive.
    ///
    /// Succeeds only if the receive is still in the posted-receive queue;
    /// once matched (or for send requests) cancellation fails and the caller
    /// must still wait.
    pub fn cancel(&self) -> Result<()> {
        match &self.recv_hook {
            Some(hook) => hook.engine.cancel(hook.id),
            None => Err(MpiError::OperationFailed(
                "only receive requests can be cancelled".into(),
            )),
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if let Some(hook) = &self.recv_hook {
            if self.slot.peek().is_none() {
                let _ = hook.engine.cancel(hook.id);
            }
        }
    }
}

/// Wait for every request; return all statuses in order.
///
/// On failure, the remaining requests are still waited to terminal state and
/// the first error encountered is the one reported.
pub async fn wait_all(requests: Vec<Request>) -> Result<Vec<Status>> {
    let mut statuses = Vec::with_capacity(requests.len());
    let mut first_err = None;
    for r in requests {
        match r.wait().await {
            Ok(s) => statuses.push(s),
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(statuses),
    }
}

/// Wait until any one request is terminal; return its index and status.
///
/// The winning request stays in the slice; a later `wait` on it returns the
/// same outcome immediately.
pub async fn wait_any(requests: &[Request]) -> Result<(usize, Status)> {
    if requests.is_empty() {
        return Err(MpiError::OperationFailed(
            "wait_any on an empty request set".into(),
        ));
    }
    let futs: Vec<_> = requests
        .iter()
        .map(|r| Box::pin(r.slot.wait()))
        .collect();
    let (outcome, idx, _rest) = futures::future::select_all(futs).await;
    outcome.map(|s| (idx, s))
}
