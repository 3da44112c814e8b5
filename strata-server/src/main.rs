// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Strata — dynamically reconfigurable HTTP gateway
//
//  Data plane:   per-listener tokio servers with generation swaps
//  Control:      config service → saga orchestrator → listener cluster
//  Admin API:    axum REST (config push + introspection)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use strata_admin::AdminServer;
use strata_cluster::ListenerCluster;
use strata_core::Config;
use strata_saga::{ConfigService, Participant, SagaOrchestrator, TransactionSource};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Strata — dynamically reconfigurable HTTP gateway"
)]
struct Cli {
    /// TOML server configuration applied at startup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admin API bind address
    #[arg(long, default_value = "127.0.0.1:9280")]
    listen: SocketAddr,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Exit codes: 0 clean shutdown, 1 startup config failure, 2 fatal runtime
/// error.
#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error("configuration failure at startup: {0}")]
    Startup(anyhow::Error),

    #[error("fatal runtime error: {0}")]
    Runtime(anyhow::Error),
}

fn main() {
    let cli = Cli::parse();

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to build tokio runtime");
            std::process::exit(2);
        }
    };

    let code = match runtime.block_on(serve(cli)) {
        Ok(()) => 0,
        Err(e @ ServeError::Startup(_)) => {
            error!(error = %e, "Exiting");
            1
        }
        Err(e @ ServeError::Runtime(_)) => {
            error!(error = %e, "Exiting");
            2
        }
    };
    std::process::exit(code);
}

async fn serve(cli: Cli) -> Result<(), ServeError> {
    info!(version = env!("CARGO_PKG_VERSION"), "Strata starting");
    let cancel = CancellationToken::new();

    // ── Catalogs (built-ins) ──
    let (middleware_catalog, handler_catalog) = strata_builtin::default_catalogs();

    // ── Listener cluster ──
    let cluster = Arc::new(ListenerCluster::new(
        Arc::new(middleware_catalog),
        Arc::new(handler_catalog),
    ));
    let cluster_task = cluster
        .start(cancel.child_token())
        .map_err(ServeError::Runtime)?;

    // ── Config service + saga orchestrator ──
    let service = Arc::new(ConfigService::new());
    let participants: Vec<Arc<dyn Participant>> = vec![
        Arc::clone(&cluster) as Arc<dyn Participant>,
        Arc::clone(&service) as Arc<dyn Participant>,
    ];
    let orchestrator = Arc::new(SagaOrchestrator::new(participants, cancel.child_token()));
    let saga_rx = service.subscribe("saga-orchestrator", 16);
    let saga_task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run(saga_rx).await }
    });

    // ── Startup config (optional) ──
    if let Some(path) = &cli.config {
        let config = Config::from_toml_file(path).map_err(ServeError::Startup)?;
        service
            .update_config(config, TransactionSource::File, "startup")
            .map_err(|e| ServeError::Startup(e.into()))?;
    }

    // ── Admin API ──
    let admin = AdminServer::new(cli.listen, Arc::clone(&service), Arc::clone(&cluster));
    let mut admin_task = tokio::spawn(admin.start(cancel.child_token()));

    info!(admin = %cli.listen, "Strata is ready");

    // ── Wait for shutdown ──
    let admin_result = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping");
            None
        }
        res = &mut admin_task => Some(res),
    };

    // Orderly teardown: stop accepting transactions, compensate anything
    // in-flight, stop the reconciler, drain every server.
    cancel.cancel();
    let _ = saga_task.await;
    let _ = cluster_task.await;

    match admin_result {
        // Admin exited on its own: runtime failure.
        Some(res) => {
            let reason = match res {
                Ok(Ok(())) => anyhow::anyhow!("admin server exited unexpectedly"),
                Ok(Err(e)) => e,
                Err(e) => anyhow::anyhow!("admin task panicked: {e}"),
            };
            Err(ServeError::Runtime(reason))
        }
        None => {
            match admin_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Admin server error during shutdown"),
                Err(e) => error!(error = %e, "Admin task join error"),
            }
            info!("Strata stopped");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
