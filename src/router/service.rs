//! Router Worker Loop
//!
//! The single owner of the peer registry and the request cache. Messages are processed
//! one at a time; anything slow (fan-outs, storage reads, identity handshakes, liveness
//! pings) runs in spawned tasks that report back through a oneshot reply or through
//! the mailbox, never by touching router state.
//!
//! A peer that stops answering pings is only demoted: it leaves the registry and its
//! identity handshake is retried until it answers again or membership reports it lost.

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::cache::RequestCache;
use super::config::RouterConfig;
use super::fallback::FallbackRetriever;
use super::merge::merge;
use super::orderer::{ShardFunction, ShardOrderer};
use super::peers::{PeerRegistry, PeerSnapshot, Registration};
use super::transport::PeerTransport;
use super::types::{Candidate, QueryResult, Request};
use crate::error::{Result, RouterError};
use crate::membership::types::{MembershipEvent, NodeId, PeerHandle};
use crate::storage::Storage;

/// Pause between two liveness probes of the same peer.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
/// Consecutive failed probes after which a peer is taken out of rotation.
pub const MAX_MISSED_PINGS: u32 = 3;
/// First pause before retrying a failed identity handshake; doubles up to the max.
pub const HANDSHAKE_RETRY_INITIAL: Duration = Duration::from_millis(500);
pub const HANDSHAKE_RETRY_MAX: Duration = Duration::from_secs(5);

pub enum RouterMessage {
    Request {
        request: Request,
        reply: oneshot::Sender<QueryResult>,
    },
    Retrieve {
        request: Request,
        reply: oneshot::Sender<QueryResult>,
    },
    Switch {
        done: oneshot::Sender<()>,
    },
    Membership(MembershipEvent),
    /// Posted by a liveness monitor; unlike `PeerLost` the peer may come back.
    PeerUnreachable {
        handle: PeerHandle,
    },
    ListPeers {
        reply: oneshot::Sender<BTreeMap<NodeId, PeerHandle>>,
    },
    Shutdown,
}

/// Cloneable entry point into a running router.
///
/// The router stops once every handle is dropped or `shutdown` is called; calls made
/// afterwards fail with [`RouterError::Stopped`].
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::UnboundedSender<RouterMessage>,
    local_id: NodeId,
}

impl RouterHandle {
    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Routed, cached multi-key read.
    pub async fn request(&self, request: Request) -> Result<QueryResult> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterMessage::Request { request, reply })?;
        rx.await.map_err(|_| RouterError::Stopped)
    }

    /// Read answered by this node's storage alone.
    pub async fn retrieve(&self, request: Request) -> Result<QueryResult> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterMessage::Retrieve { request, reply })?;
        rx.await.map_err(|_| RouterError::Stopped)
    }

    /// Switches storage to its next version and drops every cached computation.
    pub async fn switch(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(RouterMessage::Switch { done })?;
        rx.await.map_err(|_| RouterError::Stopped)
    }

    pub async fn list_peers(&self) -> Result<BTreeMap<NodeId, PeerHandle>> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterMessage::ListPeers { reply })?;
        rx.await.map_err(|_| RouterError::Stopped)
    }

    pub fn notify(&self, event: MembershipEvent) -> Result<()> {
        self.send(RouterMessage::Membership(event))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(RouterMessage::Shutdown);
    }

    fn send(&self, message: RouterMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| RouterError::Stopped)
    }
}

pub struct RouterService {
    config: RouterConfig,
    registry: PeerRegistry,
    cache: RequestCache,
    orderer: ShardOrderer,
    retriever: Arc<FallbackRetriever>,
    storage: Arc<dyn Storage>,
    transport: Arc<dyn PeerTransport>,
    /// Weak so that background tasks never keep a stopped router alive.
    mailbox: mpsc::WeakUnboundedSender<RouterMessage>,
    inbox: mpsc::UnboundedReceiver<RouterMessage>,
    monitors: HashMap<PeerHandle, JoinHandle<()>>,
    handshakes: HashMap<SocketAddr, JoinHandle<()>>,
}

impl RouterService {
    /// Builds a router whose registry holds only `local_handle` under `config.local_id`.
    ///
    /// `config` is validated; nothing runs until [`RouterService::run`] is polled.
    pub fn new(
        config: RouterConfig,
        local_handle: PeerHandle,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn PeerTransport>,
        sharding: Arc<dyn ShardFunction>,
    ) -> Result<(Self, RouterHandle)> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_size)
            .ok_or_else(|| RouterError::InvalidConfig("cache-size must be at least 1".into()))?;

        let local_id = config.local_id.clone();
        let (tx, inbox) = mpsc::unbounded_channel();
        let retriever = FallbackRetriever::new(
            local_id.clone(),
            Arc::clone(&storage),
            Arc::clone(&transport),
            config.hop_timeout(),
        );

        let service = Self {
            registry: PeerRegistry::new(local_id.clone(), local_handle),
            cache: RequestCache::new(capacity),
            orderer: ShardOrderer::new(local_id.clone(), sharding),
            retriever: Arc::new(retriever),
            storage,
            transport,
            mailbox: tx.downgrade(),
            inbox,
            monitors: HashMap::new(),
            handshakes: HashMap::new(),
            config,
        };
        Ok((service, RouterHandle { tx, local_id }))
    }

    /// Spawns [`RouterService::run`] on the current runtime.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Router {} started (replicas: {}, hop timeout: {:?}, cache: {})",
            self.config.local_id,
            self.config.replica_count,
            self.retriever.hop_timeout(),
            self.cache.capacity()
        );

        while let Some(message) = self.inbox.recv().await {
            match message {
                RouterMessage::Request { request, reply } => self.handle_request(request, reply),
                RouterMessage::Retrieve { request, reply } => {
                    let storage = Arc::clone(&self.storage);
                    tokio::spawn(async move {
                        let _ = reply.send(storage.retrieve(&request).await);
                    });
                }
                RouterMessage::Switch { done } => {
                    self.storage.switch().await;
                    self.cache.invalidate_all();
                    let _ = done.send(());
                }
                RouterMessage::Membership(event) => self.handle_membership(event),
                RouterMessage::PeerUnreachable { handle } => self.handle_unreachable(handle),
                RouterMessage::ListPeers { reply } => {
                    let _ = reply.send(self.registry.snapshot().as_ref().clone());
                }
                RouterMessage::Shutdown => break,
            }
        }

        for task in self.monitors.drain().map(|(_, task)| task) {
            task.abort();
        }
        for task in self.handshakes.drain().map(|(_, task)| task) {
            task.abort();
        }
        tracing::info!("Router {} stopped", self.config.local_id);
    }

    fn handle_request(&mut self, request: Request, reply: oneshot::Sender<QueryResult>) {
        let peers = self.registry.snapshot();
        let orderer = self.orderer.clone();
        let retriever = Arc::clone(&self.retriever);
        let replica_count = self.config.replica_count;
        let fan_out_request = request.clone();

        let pending = self.cache.get_or_compute(request, move || {
            fan_out(fan_out_request, peers, orderer, retriever, replica_count)
        });

        tokio::spawn(async move {
            let _ = reply.send(pending.await);
        });
    }

    fn handle_membership(&mut self, event: MembershipEvent) {
        match event {
            MembershipEvent::PeerJoined { address } => {
                if self.registry.mark_joined(address) {
                    tracing::debug!("Peer joined at {}, starting identity handshake", address);
                    self.start_handshake(address, Duration::ZERO);
                } else {
                    tracing::debug!("Ignoring join for {}: local or already active", address);
                }
            }
            MembershipEvent::PeerIdentified { id, handle } => {
                let outcome = self.registry.register(id.clone(), handle);
                if outcome == Registration::Refused {
                    tracing::warn!("Ignoring identity {} for {}: no pending join", id, handle);
                    return;
                }
                if let Some(handshake) = self.handshakes.remove(&handle.http_addr) {
                    handshake.abort();
                }
                if let Registration::Moved { from } = outcome {
                    tracing::info!("Peer {} moved from {} to {}", id, from, handle);
                    if let Some(stale) = self.monitors.remove(&from) {
                        stale.abort();
                    }
                }

                tracing::info!(
                    "Registered peer {} at {} ({} known)",
                    id,
                    handle,
                    self.registry.len()
                );
                let monitor = self.spawn_monitor(handle);
                if let Some(previous) = self.monitors.insert(handle, monitor) {
                    previous.abort();
                }
            }
            MembershipEvent::PeerLost { handle } => {
                if let Some(monitor) = self.monitors.remove(&handle) {
                    monitor.abort();
                }
                if let Some(handshake) = self.handshakes.remove(&handle.http_addr) {
                    handshake.abort();
                }
                match self.registry.remove(&handle) {
                    Some(id) => tracing::info!(
                        "Removed peer {} at {} ({} known)",
                        id,
                        handle,
                        self.registry.len()
                    ),
                    None => tracing::warn!("Ignoring loss of unknown peer {}", handle),
                }
            }
        }
    }

    /// Takes a peer whose pings failed out of rotation and starts winning it back.
    fn handle_unreachable(&mut self, handle: PeerHandle) {
        if let Some(monitor) = self.monitors.remove(&handle) {
            monitor.abort();
        }
        let Some(id) = self.registry.remove(&handle) else {
            tracing::debug!("Ignoring unreachable report for unknown peer {}", handle);
            return;
        };

        tracing::warn!(
            "Peer {} at {} unreachable, retrying handshake ({} known)",
            id,
            handle,
            self.registry.len()
        );
        if self.registry.mark_joined(handle.http_addr) {
            self.start_handshake(handle.http_addr, HANDSHAKE_RETRY_INITIAL);
        }
    }

    /// Runs the identity handshake with `address` after `delay`, retrying with backoff
    /// until it succeeds. Replaces any handshake already running for that address.
    fn start_handshake(&mut self, address: SocketAddr, delay: Duration) {
        let transport = Arc::clone(&self.transport);
        let mailbox = self.mailbox.clone();
        let local_id = self.config.local_id.clone();
        let timeout = self.config.request_timeout;

        let task = tokio::spawn(async move {
            let mut delay = delay;
            let mut backoff = HANDSHAKE_RETRY_INITIAL;
            loop {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                match transport.identify(address, &local_id, timeout).await {
                    Ok(id) => {
                        let event = MembershipEvent::PeerIdentified {
                            id,
                            handle: PeerHandle::new(address),
                        };
                        if let Some(tx) = mailbox.upgrade() {
                            let _ = tx.send(RouterMessage::Membership(event));
                        }
                        return;
                    }
                    Err(e) => {
                        tracing::debug!(
                            "Identity handshake with {} failed, retrying in {:?}: {}",
                            address,
                            backoff,
                            e
                        );
                    }
                }

                if mailbox.upgrade().is_none() {
                    return;
                }
                delay = backoff;
                backoff = (backoff * 2).min(HANDSHAKE_RETRY_MAX);
            }
        });

        if let Some(previous) = self.handshakes.insert(address, task) {
            previous.abort();
        }
    }

    /// Pings `handle` every [`MONITOR_INTERVAL`]; reports it unreachable after
    /// [`MAX_MISSED_PINGS`] failures in a row.
    fn spawn_monitor(&self, handle: PeerHandle) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let mut missed = 0;
            loop {
                tokio::time::sleep(MONITOR_INTERVAL).await;

                match transport.ping(&handle, MONITOR_INTERVAL).await {
                    Ok(()) => missed = 0,
                    Err(e) => {
                        missed += 1;
                        tracing::debug!("Ping to {} failed ({}/{}): {}", handle, missed, MAX_MISSED_PINGS, e);
                    }
                }

                if missed >= MAX_MISSED_PINGS {
                    tracing::warn!("Peer {} stopped answering pings", handle);
                    if let Some(tx) = mailbox.upgrade() {
                        let _ = tx.send(RouterMessage::PeerUnreachable { handle });
                    }
                    return;
                }
            }
        })
    }
}

/// One fallback chain per key, all keys concurrently, over a fixed peer snapshot.
async fn fan_out(
    request: Request,
    peers: PeerSnapshot,
    orderer: ShardOrderer,
    retriever: Arc<FallbackRetriever>,
    replica_count: usize,
) -> QueryResult {
    let known: Vec<NodeId> = peers.keys().cloned().collect();
    let retriever = retriever.as_ref();
    let request = &request;

    let lookups = request.keys.iter().map(|key| {
        let candidates: Vec<Candidate> = orderer
            .order(key, &known, replica_count)
            .into_iter()
            .filter_map(|id| {
                let handle = *peers.get(&id)?;
                Some(Candidate { id, handle })
            })
            .collect();

        async move {
            retriever
                .resolve(&request.table, key, &request.columns, &candidates)
                .await
        }
    });

    merge(join_all(lookups).await)
}
