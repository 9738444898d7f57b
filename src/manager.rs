//! Process-wide runtime: identity bootstrap, full-mesh connection
//! establishment, and the initialize/finalize lifecycle.

use crate::comm::Communicator;
use crate::config::MpiConfig;
use crate::engine::MatchEngine;
use crate::error::{MpiError, Result};
use crate::transport::{PeerSender, accept_peer, dial_peer, spawn_recv_loop};
use crate::types::{ANY_SOURCE, Rank, TAG_SPACE_SPAN};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// Communicator ids map to wire-tag windows of `TAG_SPACE_SPAN`; this keeps
/// the highest window inside `i32` tag space.
const MAX_COMM_ID: i32 = i32::MAX / TAG_SPACE_SPAN - 1;

/// Counts queued sends whose bytes the kernel has not yet accepted, so
/// finalize can drain them.
pub(crate) struct InflightSends {
    active: AtomicUsize,
    drained: Notify,
}

impl InflightSends {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    #[cfg(test)]
    pub(crate) fn new_for_test() -> Arc<Self> {
        Self::new()
    }

    pub(crate) fn begin(self: &Arc<Self>) -> SendGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        SendGuard {
            tracker: Arc::clone(self),
        }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct SendGuard {
    tracker: Arc<InflightSends>,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.drained.notify_waiters();
        }
    }
}

/// Owner of everything scoped to the initialize/finalize bracket: the
/// listener, one outbound transport per peer, one receive-loop task per
/// peer, the match engine, and the communicator-id allocator.
pub struct ProcessManager {
    rank: Rank,
    size: i32,
    config: MpiConfig,
    engine: Arc<MatchEngine>,
    peers: HashMap<Rank, Arc<PeerSender>>,
    listener: Mutex<Option<TcpListener>>,
    recv_tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    inflight: Arc<InflightSends>,
    next_comm_id: AtomicI32,
    finalized: AtomicBool,
}

impl ProcessManager {
    /// Establish the full mesh for one rank of a job.
    ///
    /// Dials every peer (with backoff, peers may not be up yet) while
    /// accepting every peer's dial, all bounded by the init timeout. The
    /// outbound connection of an ordered pair carries its sends; the inbound
    /// one feeds a receive loop. Returns only when all `size - 1` transports
    /// in each direction are ready.
    pub(crate) async fn connect(config: MpiConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let rank = config.rank;
        let size = config.size;
        let engine = MatchEngine::new();

        // A single-rank job needs no networking at all; loopback traffic
        // goes straight to the unexpected queue.
        if size == 1 {
            tracing::debug!("single-rank job, skipping mesh setup");
            return Ok(Arc::new(Self {
                rank,
                size,
                config,
                engine,
                peers: HashMap::new(),
                listener: Mutex::new(None),
                recv_tasks: Mutex::new(Vec::new()),
                inflight: InflightSends::new(),
                next_comm_id: AtomicI32::new(1),
                finalized: AtomicBool::new(false),
            }));
        }

        let listener = crate::transport::listener::bind_listener(rank, config.port_of(rank)).await?;
        tracing::info!(rank, size, port = config.port_of(rank), "listening for peers");

        let mesh = tokio::time::timeout(config.init_timeout, async {
            let dial_all = async {
                let dials = (0..size)
                    .filter(|&p| p != rank)
                    .map(|p| dial_peer(rank, p, config.port_of(p)));
                let outbound = futures::future::try_join_all(dials).await?;
                Ok::<_, MpiError>(outbound)
            };
            let accept_all = async {
                let mut inbound: HashMap<Rank, tokio::net::TcpStream> = HashMap::new();
                while inbound.len() < (size - 1) as usize {
                    let (peer, stream) = accept_peer(&listener).await?;
                    if peer < 0 || peer >= size || peer == rank {
                        return Err(MpiError::InitFailed(format!(
                            "handshake claims impossible rank {peer}"
                        )));
                    }
                    if inbound.insert(peer, stream).is_some() {
                        return Err(MpiError::InitFailed(format!(
                            "duplicate connection from rank {peer}"
                        )));
                    }
                }
                Ok::<_, MpiError>(inbound)
            };
            tokio::try_join!(dial_all, accept_all)
        })
        .await;

        let (outbound, inbound) = match mesh {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(MpiError::connection(
                    rank,
                    format!(
                        "full mesh not established within {}s",
                        config.init_timeout.as_secs()
                    ),
                ));
            }
        };

        let mut peers = HashMap::new();
        for (peer, stream) in outbound {
            let (read_half, write_half) = stream.into_split();
            // Outbound connections are send-only; the peer's acceptor owns
            // the other direction of the pair.
            drop(read_half);
            peers.insert(
                peer,
                Arc::new(PeerSender::new(peer, write_half, config.send_timeout)),
            );
        }

        let mut recv_tasks = Vec::new();
        for (peer, stream) in inbound {
            let (read_half, write_half) = stream.into_split();
            drop(write_half);
            recv_tasks.push(spawn_recv_loop(peer, read_half, Arc::clone(&engine)));
        }

        tracing::info!(rank, size, "full mesh ready");
        Ok(Arc::new(Self {
            rank,
            size,
            config,
            engine,
            peers,
            listener: Mutex::new(Some(listener)),
            recv_tasks: Mutex::new(recv_tasks),
            inflight: InflightSends::new(),
            next_comm_id: AtomicI32::new(1),
            finalized: AtomicBool::new(false),
        }))
    }

    pub(crate) fn rank(&self) -> Rank {
        self.rank
    }

    pub(crate) fn size(&self) -> i32 {
        self.size
    }

    pub(crate) fn config(&self) -> &MpiConfig {
        &self.config
    }

    pub(crate) fn engine(&self) -> &Arc<MatchEngine> {
        &self.engine
    }

    pub(crate) fn track_send(&self) -> SendGuard {
        self.inflight.begin()
    }

    /// Error unless the manager is live.
    pub(crate) fn check_active(&self) -> Result<()> {
        if self.finalized.load(Ordering::Acquire) {
            Err(MpiError::NotInitialized)
        } else {
            Ok(())
        }
    }

    pub(crate) fn peer(&self, rank: Rank) -> Result<&Arc<PeerSender>> {
        self.peers.get(&rank).ok_or(MpiError::InvalidRank {
            rank,
            world_size: self.size,
        })
    }

    /// Allocate a fresh communicator id (hence a fresh wire-tag window).
    pub(crate) fn alloc_comm_id(&self) -> Result<i32> {
        let id = self.next_comm_id.fetch_add(1, Ordering::Relaxed);
        if id > MAX_COMM_ID {
            return Err(MpiError::OperationFailed(
                "communicator tag space exhausted".into(),
            ));
        }
        Ok(id)
    }

    /// Tear down everything this manager owns.
    ///
    /// Drains in-flight sends (bounded by the send timeout), half-closes
    /// every outbound transport, stops the receive loops, fails any
    /// still-pending receives, and drops the listener. Idempotence is
    /// enforced: a second call reports not-initialized.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(MpiError::NotInitialized);
        }

        // No new sends enter the queues; the writer tasks drain what is
        // already there and half-close the sockets.
        for sender in self.peers.values() {
            sender.close_queue();
        }
        let drained = tokio::time::timeout(self.config.send_timeout, self.inflight.wait_drained())
            .await
            .is_ok();
        if !drained {
            tracing::warn!(rank = self.rank, "pending sends did not drain before finalize");
            for sender in self.peers.values() {
                sender.abort_writer();
            }
        }

        let tasks = {
            let mut guard = self
                .recv_tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            task.abort();
        }

        self.engine.close(MpiError::Communication {
            rank: ANY_SOURCE,
            reason: "runtime finalized while the operation was pending".into(),
        });

        let _listener = {
            let mut guard = self
                .listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };

        tracing::info!(rank = self.rank, "finalized");
        if drained {
            Ok(())
        } else {
            Err(MpiError::FinalizeFailed(
                "pending sends did not drain".into(),
            ))
        }
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        // Receive loops hold the engine alive; stop them if finalize never
        // ran (in-process bootstrap worlds are torn down by drop).
        let tasks = {
            let mut guard = self
                .recv_tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            task.abort();
        }
    }
}

enum GlobalState {
    Empty,
    Initializing,
    Ready(Arc<ProcessManager>),
}

static GLOBAL: Mutex<GlobalState> = Mutex::new(GlobalState::Empty);

fn lock_global() -> std::sync::MutexGuard<'static, GlobalState> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Initialize the runtime from the environment and return the world
/// communicator.
///
/// Reads `TCPMPI_SIZE`, `TCPMPI_RANK` and `TCPMPI_PORT_BASE` (defaults: a
/// single-rank job), establishes the full mesh, and installs the process
/// singleton. Exactly one initialize may be live at a time; a second call
/// fails with `AlreadyInitialized` until `finalize` succeeds.
pub async fn initialize() -> Result<Communicator> {
    initialize_with(MpiConfig::from_env()).await
}

/// Initialize with an explicit config instead of the environment.
pub async fn initialize_with(config: MpiConfig) -> Result<Communicator> {
    {
        let mut g = lock_global();
        match *g {
            GlobalState::Empty => *g = GlobalState::Initializing,
            _ => return Err(MpiError::AlreadyInitialized),
        }
    }

    match ProcessManager::connect(config).await {
        Ok(mgr) => {
            *lock_global() = GlobalState::Ready(Arc::clone(&mgr));
            Ok(Communicator::world(mgr))
        }
        Err(e) => {
            *lock_global() = GlobalState::Empty;
            Err(e)
        }
    }
}

/// Finalize the runtime: drain sends, close every transport and the
/// listener, fail pending receives, release the singleton.
///
/// After a successful finalize the world communicator (and any duplicate)
/// errors with `NotInitialized`; so does a second finalize.
pub async fn finalize() -> Result<()> {
    let mgr = {
        let mut g = lock_global();
        match std::mem::replace(&mut *g, GlobalState::Empty) {
            GlobalState::Ready(mgr) => mgr,
            GlobalState::Initializing => {
                *g = GlobalState::Initializing;
                return Err(MpiError::NotInitialized);
            }
            GlobalState::Empty => return Err(MpiError::NotInitialized),
        }
    };
    mgr.shutdown().await
}

/// Terminate the job immediately with the given exit code.
///
/// Transports are closed by process exit without draining; nothing is
/// flushed. Never returns.
pub fn abort(code: i32) -> ! {
    tracing::error!(code, "aborting job");
    std::process::exit(code);
}

/// Build an in-process world of `world_size` ranks meshed over loopback
/// ports `port_base..port_base + world_size`.
///
/// Every rank runs its discovery and mesh establishment exactly as a real
/// job would; only the identity comes from arguments instead of the
/// environment. Intended for tests and demos. The returned communicators do
/// not use the process singleton and are torn down by drop.
pub async fn bootstrap_local(world_size: i32, port_base: u16) -> Result<Vec<Communicator>> {
    if world_size <= 0 {
        return Err(MpiError::InitFailed(format!(
            "world size must be positive, got {world_size}"
        )));
    }
    let configs = (0..world_size).map(|rank| MpiConfig {
        size: world_size,
        rank,
        port_base,
        ..MpiConfig::default()
    });
    let managers =
        futures::future::try_join_all(configs.map(ProcessManager::connect)).await?;
    Ok(managers.into_iter().map(Communicator::world).collect())
}
