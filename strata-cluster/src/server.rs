use crate::adapter::{ListenerRoutes, ListenerSpec};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::service::TowerToHyperService;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A bound socket travelling from one server generation to the next.
/// The identity survives the handoff, which is what "the listener was not
/// restarted" means observably.
pub(crate) struct SurrenderedSocket {
    pub listener: TcpListener,
    pub socket_id: Uuid,
}

/// One generation of a bound HTTP server: a socket, an accept loop, and a
/// fixed route table. Routes never change in place; a new generation is
/// spawned instead, taking over the socket where possible.
pub(crate) struct ServerHandle {
    pub spec: ListenerSpec,
    pub routes: Arc<ListenerRoutes>,
    pub socket_id: Uuid,
    pub local_addr: SocketAddr,
    surrender_tx: mpsc::Sender<oneshot::Sender<SurrenderedSocket>>,
    accept_cancel: CancellationToken,
    conn_cancel: CancellationToken,
    force_cancel: CancellationToken,
    tracker: TaskTracker,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Reconcile's "leave running" test: spec unchanged and the routes
    /// object pointer-equal or value-equal.
    pub fn matches(&self, spec: &ListenerSpec, routes: &Arc<ListenerRoutes>) -> bool {
        self.spec == *spec
            && (Arc::ptr_eq(&self.routes, routes)
                || self.routes.fingerprint() == routes.fingerprint())
    }

    /// Ask the accept loop to stop accepting and hand its socket back.
    /// In-flight connections keep running until [`ServerHandle::drain`].
    pub async fn surrender(&self) -> anyhow::Result<SurrenderedSocket> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.surrender_tx
            .send(reply_tx)
            .await
            .map_err(|_| anyhow::anyhow!("accept loop is gone"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("accept loop dropped the surrender request"))
    }

    /// Stop accepting, let in-flight requests finish up to the drain
    /// timeout, then force-close whatever is left.
    pub async fn drain(self) {
        let Self {
            spec,
            accept_cancel,
            conn_cancel,
            force_cancel,
            tracker,
            task,
            ..
        } = self;

        accept_cancel.cancel();
        conn_cancel.cancel();
        tracker.close();
        if tokio::time::timeout(spec.drain_timeout, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                listener = %spec.id,
                timeout = ?spec.drain_timeout,
                "Drain timeout exceeded, forcing connections closed"
            );
            force_cancel.cancel();
            tracker.wait().await;
        }
        let _ = task.await;
        info!(listener = %spec.id, "Server drained");
    }
}

/// Bind and start a server generation. When `socket` carries a surrendered
/// listener, the generation continues on the same file descriptor.
pub(crate) fn spawn_server(
    spec: ListenerSpec,
    routes: Arc<ListenerRoutes>,
    socket: Option<SurrenderedSocket>,
) -> anyhow::Result<ServerHandle> {
    let (listener, socket_id) = match socket {
        Some(s) => (s.listener, s.socket_id),
        None => (bind_listener(&spec.address)?, Uuid::new_v4()),
    };
    let local_addr = listener.local_addr()?;

    let app = build_app(Arc::clone(&routes), &spec);
    let (surrender_tx, surrender_rx) = mpsc::channel(1);
    let accept_cancel = CancellationToken::new();
    let conn_cancel = CancellationToken::new();
    let force_cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    let task = tokio::spawn(accept_loop(
        listener,
        socket_id,
        spec.id.clone(),
        app,
        accept_cancel.clone(),
        conn_cancel.clone(),
        force_cancel.clone(),
        tracker.clone(),
        surrender_rx,
    ));

    info!(
        listener = %spec.id,
        addr = %local_addr,
        routes = routes.len(),
        "Server generation started"
    );

    Ok(ServerHandle {
        spec,
        routes,
        socket_id,
        local_addr,
        surrender_tx,
        accept_cancel,
        conn_cancel,
        force_cancel,
        tracker,
        task,
    })
}

/// Bind with SO_REUSEADDR + SO_REUSEPORT so a replacement generation can
/// bind the same address while the outgoing one is still draining.
fn bind_listener(address: &str) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("address {address:?} did not resolve"))?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(TcpListener::from_std(socket.into())?)
}

fn build_app(routes: Arc<ListenerRoutes>, spec: &ListenerSpec) -> axum::Router {
    axum::Router::new()
        .fallback(dispatch)
        .layer(TimeoutLayer::new(spec.read_timeout))
        .with_state(routes)
}

/// The per-request contract of an assembled route: seed the execution-local
/// data map from static data, run the middleware chain (which may
/// short-circuit), invoke the handler, and map handler errors to 500.
async fn dispatch(State(routes): State<Arc<ListenerRoutes>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let Some(route) = routes.match_route(&method, &path) else {
        return (StatusCode::NOT_FOUND, "no route matched\n").into_response();
    };

    let (parts, body) = req.into_parts();
    let mut ctx = strata_pipeline::RequestContext::new(&parts, &route.static_data);

    match strata_pipeline::run_request_hooks(&route.chain, &mut ctx).await {
        strata_pipeline::MiddlewareVerdict::Respond(mut response) => {
            strata_pipeline::run_response_hooks(&route.chain, &ctx, &mut response);
            return response;
        }
        strata_pipeline::MiddlewareVerdict::Continue => {}
    }

    // Header mutations made by the chain reach the handler.
    let mut req = Request::from_parts(parts, body);
    *req.headers_mut() = ctx.headers.clone();

    let mut response = match route.handler.handle_http(req, &ctx.data).await {
        Ok(response) => response,
        Err(e) => {
            error!(method = %method, path = %path, error = %e, "Handler error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n").into_response()
        }
    };
    strata_pipeline::run_response_hooks(&route.chain, &ctx, &mut response);
    response
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    socket_id: Uuid,
    listener_id: String,
    app: axum::Router,
    accept_cancel: CancellationToken,
    conn_cancel: CancellationToken,
    force_cancel: CancellationToken,
    tracker: TaskTracker,
    mut surrender_rx: mpsc::Receiver<oneshot::Sender<SurrenderedSocket>>,
) {
    enum Exit {
        Surrender(oneshot::Sender<SurrenderedSocket>),
        Shutdown,
    }

    let exit = loop {
        tokio::select! {
            biased;
            maybe = surrender_rx.recv() => match maybe {
                Some(reply) => break Exit::Surrender(reply),
                None => break Exit::Shutdown,
            },
            _ = accept_cancel.cancelled() => break Exit::Shutdown,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    serve_connection(
                        stream,
                        peer,
                        app.clone(),
                        conn_cancel.clone(),
                        force_cancel.clone(),
                        &tracker,
                    );
                }
                Err(e) => {
                    error!(listener = %listener_id, error = %e, "Accept error");
                }
            },
        }
    };

    match exit {
        Exit::Surrender(reply) => {
            debug!(listener = %listener_id, "Surrendering socket to next generation");
            if reply
                .send(SurrenderedSocket {
                    listener,
                    socket_id,
                })
                .is_err()
            {
                warn!(listener = %listener_id, "Surrender receiver gone, socket closes");
            }
        }
        Exit::Shutdown => {
            debug!(listener = %listener_id, "Accept loop stopped, releasing socket");
            drop(listener);
        }
    }
}

fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: axum::Router,
    conn_cancel: CancellationToken,
    force_cancel: CancellationToken,
    tracker: &TaskTracker,
) {
    let service = TowerToHyperService::new(app);
    tracker.spawn(async move {
        let io = TokioIo::new(stream);
        let conn_builder = ConnBuilder::new(TokioExecutor::new());
        let conn = conn_builder.serve_connection_with_upgrades(io, service);
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            tokio::select! {
                res = conn.as_mut() => {
                    if let Err(e) = res {
                        debug!(peer = %peer, error = %e, "Connection ended with error");
                    }
                    break;
                }
                // Generation drain: finish the in-flight exchange, then close.
                _ = conn_cancel.cancelled(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
                _ = force_cancel.cancelled(), if draining => {
                    debug!(peer = %peer, "Drain window over, dropping connection");
                    break;
                }
            }
        }
    });
}
