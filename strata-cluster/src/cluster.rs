use crate::adapter::{Adapter, ListenerRoutes, ListenerSpec};
use crate::fsm::{ClusterFsm, ClusterState, ClusterStatus};
use crate::server::{ServerHandle, spawn_server};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use strata_pipeline::{HandlerCatalog, MiddlewareCatalog, MiddlewarePool};
use strata_saga::{ConfigTransaction, Participant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Desired state of one listener, as carried by a snapshot.
#[derive(Clone)]
pub struct ServerConfig {
    pub spec: ListenerSpec,
    pub routes: Arc<ListenerRoutes>,
}

/// Desired state of the whole fleet, sent through the siphon. The sequence
/// number lets a committer wait for *its* snapshot to be reconciled rather
/// than any earlier one.
pub struct Snapshot {
    pub seq: u64,
    pub entries: HashMap<String, ServerConfig>,
}

/// Introspection record of one bound socket.
#[derive(Debug, Clone, Copy)]
pub struct BoundListener {
    pub address: SocketAddr,
    pub socket_id: Uuid,
}

#[derive(Default)]
struct AdapterSlots {
    current: Option<Arc<Adapter>>,
    pending: Option<Arc<Adapter>>,
}

struct WorkerParts {
    siphon_rx: mpsc::Receiver<Snapshot>,
    fsm: ClusterFsm,
}

/// Owns the live fleet of HTTP servers and reconciles it to the most
/// recently committed adapter.
///
/// The siphon channel has capacity 1 and the committer awaits the send, so
/// an unfinished reconcile back-pressures the saga: a newer snapshot
/// obsoletes an older one but never overtakes it.
pub struct ListenerCluster {
    adapters: RwLock<AdapterSlots>,
    pool: Arc<MiddlewarePool>,
    handler_catalog: Arc<HandlerCatalog>,
    siphon_tx: mpsc::Sender<Snapshot>,
    status_rx: watch::Receiver<ClusterStatus>,
    worker: Mutex<Option<WorkerParts>>,
    seq: AtomicU64,
    commit_timeout: Duration,
    bound: Arc<DashMap<String, BoundListener>>,
    drains: TaskTracker,
}

impl ListenerCluster {
    pub fn new(
        middleware_catalog: Arc<MiddlewareCatalog>,
        handler_catalog: Arc<HandlerCatalog>,
    ) -> Self {
        let (siphon_tx, siphon_rx) = mpsc::channel(1);
        let (fsm, status_rx) = ClusterFsm::new();
        Self {
            adapters: RwLock::new(AdapterSlots::default()),
            pool: Arc::new(MiddlewarePool::new(middleware_catalog)),
            handler_catalog,
            siphon_tx,
            status_rx,
            worker: Mutex::new(Some(WorkerParts { siphon_rx, fsm })),
            seq: AtomicU64::new(0),
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
            bound: Arc::new(DashMap::new()),
            drains: TaskTracker::new(),
        }
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Spawn the reconcile worker. Callable once; the returned handle
    /// completes after cancellation once every server has drained.
    pub fn start(&self, cancel: CancellationToken) -> anyhow::Result<JoinHandle<()>> {
        let parts = self
            .worker
            .lock()
            .expect("cluster worker lock")
            .take()
            .ok_or_else(|| anyhow::anyhow!("cluster worker already started"))?;
        let bound = Arc::clone(&self.bound);
        let drains = self.drains.clone();
        Ok(tokio::spawn(run_worker(parts, cancel, bound, drains)))
    }

    pub fn state(&self) -> ClusterState {
        self.status_rx.borrow().state
    }

    /// All bound servers are past their startup gate.
    pub fn is_running(&self) -> bool {
        self.state() == ClusterState::Running
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ClusterStatus> {
        self.status_rx.clone()
    }

    /// Test/introspection hook: the actual bound address of a listener.
    pub fn bound_addr(&self, listener_id: &str) -> Option<SocketAddr> {
        self.bound.get(listener_id).map(|b| b.address)
    }

    /// Test/introspection hook: socket identity, stable across generation
    /// swaps that hand the socket over and fresh for every new bind.
    pub fn socket_identity(&self, listener_id: &str) -> Option<Uuid> {
        self.bound.get(listener_id).map(|b| b.socket_id)
    }

    pub fn current_adapter(&self) -> Option<Arc<Adapter>> {
        self.adapters
            .read()
            .expect("adapter slots lock")
            .current
            .clone()
    }

    pub fn pending_adapter(&self) -> Option<Arc<Adapter>> {
        self.adapters
            .read()
            .expect("adapter slots lock")
            .pending
            .clone()
    }
}

#[async_trait]
impl Participant for ListenerCluster {
    fn name(&self) -> &str {
        "listener-cluster"
    }

    /// Build the adapter for this transaction's config and park it as
    /// pending. Nothing externally observable changes until commit.
    async fn stage(&self, tx: &Arc<ConfigTransaction>) -> anyhow::Result<()> {
        let previous = {
            let slots = self.adapters.read().expect("adapter slots lock");
            if slots.pending.as_ref().is_some_and(|a| a.tx_id == tx.id()) {
                return Ok(());
            }
            slots.current.clone()
        };

        let adapter = Adapter::build(
            tx.id(),
            tx.config(),
            &self.handler_catalog,
            &self.pool,
            previous.as_deref(),
        )?;

        self.adapters.write().expect("adapter slots lock").pending = Some(Arc::new(adapter));
        Ok(())
    }

    async fn compensate(&self, tx: &Arc<ConfigTransaction>) -> anyhow::Result<()> {
        let mut slots = self.adapters.write().expect("adapter slots lock");
        if slots.pending.as_ref().is_some_and(|a| a.tx_id == tx.id()) {
            slots.pending = None;
        }
        Ok(())
    }

    /// Promote pending to current, push the snapshot through the siphon,
    /// and wait for the cluster to report Running for it. On timeout the
    /// transaction fails but the reconcile continues asynchronously.
    async fn commit(&self) -> anyhow::Result<()> {
        let adapter = {
            let mut slots = self.adapters.write().expect("adapter slots lock");
            let pending = slots
                .pending
                .take()
                .ok_or_else(|| anyhow::anyhow!("no staged adapter to commit"))?;
            slots.current = Some(Arc::clone(&pending));
            pending
        };

        // Stale middleware instances go with the outgoing generation.
        self.pool.retain(adapter.middleware_keys());

        let mut entries = HashMap::new();
        for (id, spec) in &adapter.listeners {
            // A listener needs at least one route to be served.
            if let Some(routes) = adapter.routes.get(id)
                && !routes.is_empty()
            {
                entries.insert(
                    id.clone(),
                    ServerConfig {
                        spec: spec.clone(),
                        routes: Arc::clone(routes),
                    },
                );
            }
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.siphon_tx
            .send(Snapshot { seq, entries })
            .await
            .map_err(|_| anyhow::anyhow!("cluster reconcile worker is not running"))?;

        let mut status = self.status_rx.clone();
        let waited = tokio::time::timeout(
            self.commit_timeout,
            status.wait_for(|s| s.state == ClusterState::Running && s.applied_seq >= seq),
        )
        .await;
        match waited {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(anyhow::anyhow!("cluster status channel closed")),
            Err(_) => Err(anyhow::anyhow!(
                "cluster did not reach running within {:?} (reconcile continues asynchronously)",
                self.commit_timeout
            )),
        }
    }
}

async fn run_worker(
    mut parts: WorkerParts,
    cancel: CancellationToken,
    bound: Arc<DashMap<String, BoundListener>>,
    drains: TaskTracker,
) {
    let mut servers: HashMap<String, ServerHandle> = HashMap::new();

    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = parts.siphon_rx.recv() => match msg {
                Some(snapshot) => snapshot,
                None => break,
            },
        };
        reconcile(&mut servers, snapshot, &parts.fsm, &bound, &drains).await;
    }

    shutdown(servers, &parts.fsm, &bound, &drains).await;
}

/// Mutate the live server set to match one desired snapshot.
async fn reconcile(
    servers: &mut HashMap<String, ServerHandle>,
    snapshot: Snapshot,
    fsm: &ClusterFsm,
    bound: &DashMap<String, BoundListener>,
    drains: &TaskTracker,
) {
    if let Err(e) = fsm.transition(ClusterState::Booting) {
        warn!(error = %e, "Reconcile in unexpected cluster state");
    }
    let Snapshot { seq, entries } = snapshot;
    info!(seq, listeners = entries.len(), "Reconciling listener fleet");

    // Servers whose ID left the snapshot stop, finishing in-flight work.
    let stale: Vec<String> = servers
        .keys()
        .filter(|id| !entries.contains_key(*id))
        .cloned()
        .collect();
    for id in stale {
        if let Some(handle) = servers.remove(&id) {
            info!(listener = %id, "Stopping removed listener");
            bound.remove(&id);
            drains.spawn(handle.drain());
        }
    }

    // Deterministic order for the rest.
    let mut ids: Vec<String> = entries.keys().cloned().collect();
    ids.sort();
    for id in ids {
        let desired = &entries[&id];
        match servers.get(&id) {
            Some(existing) if existing.matches(&desired.spec, &desired.routes) => {
                // Unchanged: the socket is not cycled.
            }
            Some(_) => {
                if let Some(old) = servers.remove(&id) {
                    replace_server(&id, old, desired, servers, bound, drains).await;
                }
            }
            None => match spawn_server(desired.spec.clone(), Arc::clone(&desired.routes), None) {
                Ok(handle) => {
                    bound.insert(
                        id.clone(),
                        BoundListener {
                            address: handle.local_addr,
                            socket_id: handle.socket_id,
                        },
                    );
                    servers.insert(id, handle);
                }
                Err(e) => {
                    // Bind failure: report and leave the listener missing.
                    error!(listener = %id, error = %e, "Failed to start listener");
                    bound.remove(&id);
                }
            },
        }
    }

    if let Err(e) = fsm.transition(ClusterState::Running) {
        warn!(error = %e, "Could not mark cluster running");
    }
    fsm.mark_applied(seq);
}

/// Generation swap. Same address: take over the old socket so the file
/// descriptor never cycles; the old generation keeps serving its in-flight
/// connections while it drains in the background. Different address: bind
/// the new socket before the old one goes away.
async fn replace_server(
    id: &str,
    old: ServerHandle,
    desired: &ServerConfig,
    servers: &mut HashMap<String, ServerHandle>,
    bound: &DashMap<String, BoundListener>,
    drains: &TaskTracker,
) {
    let same_address = old.spec.address == desired.spec.address;

    let socket = if same_address {
        match old.surrender().await {
            Ok(socket) => Some(socket),
            Err(e) => {
                // Accept loop already gone; SO_REUSEPORT makes a fresh bind
                // safe while the old connections drain.
                warn!(listener = %id, error = %e, "Socket handoff failed, rebinding");
                None
            }
        }
    } else {
        None
    };

    match spawn_server(desired.spec.clone(), Arc::clone(&desired.routes), socket) {
        Ok(handle) => {
            info!(
                listener = %id,
                addr = %handle.local_addr,
                handoff = same_address,
                "Generation swapped"
            );
            bound.insert(
                id.to_string(),
                BoundListener {
                    address: handle.local_addr,
                    socket_id: handle.socket_id,
                },
            );
            servers.insert(id.to_string(), handle);
            drains.spawn(old.drain());
        }
        Err(e) => {
            error!(listener = %id, error = %e, "Failed to start replacement generation");
            bound.remove(id);
            drains.spawn(old.drain());
        }
    }
}

async fn shutdown(
    servers: HashMap<String, ServerHandle>,
    fsm: &ClusterFsm,
    bound: &DashMap<String, BoundListener>,
    drains: &TaskTracker,
) {
    if let Err(e) = fsm.transition(ClusterState::Stopping) {
        warn!(error = %e, "Unexpected state at cluster shutdown");
    }
    for (id, handle) in servers {
        bound.remove(&id);
        drains.spawn(handle.drain());
    }
    drains.close();
    drains.wait().await;
    if let Err(e) = fsm.transition(ClusterState::Stopped) {
        warn!(error = %e, "Unexpected state after cluster shutdown");
    }
    info!("Listener cluster stopped");
}
