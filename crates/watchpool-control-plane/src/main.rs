//! watchpool Control Plane Server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use watchpool_control_plane::http::create_router;
use watchpool_control_plane::{
    AppState, Config, HttpTargetResolver, IdleWorkerFactory, InMemoryTaskStore,
    JsonFileTaskStore, Orchestrator, TaskStore,
};

/// watchpool control plane.
#[derive(Parser, Debug)]
#[command(name = "watchpool-control-plane", about = "Elastic worker pools for watched targets")]
struct Args {
    /// HTTP server address
    #[arg(long)]
    http_addr: Option<String>,

    /// Base URL of the target resolver service
    #[arg(long)]
    resolver_url: Option<String>,

    /// Task table file (in-memory when omitted)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Interval between reconciliation ticks in milliseconds
    #[arg(long)]
    reconcile_interval_ms: Option<u64>,

    /// Worker launch pacing used when a request gives none, in milliseconds
    #[arg(long)]
    default_delay_ms: Option<u64>,

    /// Interval between liveness probes in seconds
    #[arg(long)]
    liveness_interval_secs: Option<u64>,

    /// Consecutive probe failures before a target is considered ended
    #[arg(long)]
    liveness_error_cap: Option<u32>,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::default();
        if let Some(addr) = self.http_addr {
            config.http_bind_addr = addr;
        }
        if let Some(url) = self.resolver_url {
            config.resolver_url = url;
        }
        if self.state_file.is_some() {
            config.state_file = self.state_file;
        }
        if let Some(ms) = self.reconcile_interval_ms {
            config.reconcile_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.default_delay_ms {
            config.default_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.liveness_interval_secs {
            config.pool.liveness_poll_interval = Duration::from_secs(secs);
        }
        if let Some(cap) = self.liveness_error_cap {
            config.pool.liveness_error_cap = cap;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("watchpool=info".parse()?))
        .with_target(true)
        .init();

    let http_addr: SocketAddr = config.http_bind_addr.parse()?;

    let store: Arc<dyn TaskStore> = match &config.state_file {
        Some(path) => Arc::new(JsonFileTaskStore::open(path).await?),
        None => {
            info!("No state file configured, task table is in-memory");
            Arc::new(InMemoryTaskStore::new())
        }
    };
    let resolver = Arc::new(HttpTargetResolver::new(&config.resolver_url));

    let orchestrator = Orchestrator::new(
        store,
        Arc::new(IdleWorkerFactory),
        resolver,
        config.pool.clone(),
    );
    let reconciler = orchestrator.spawn_reconciler(config.reconcile_interval);

    let state = AppState::new(Arc::clone(&orchestrator), config.default_delay);
    let router = create_router(state);

    let listener = TcpListener::bind(http_addr).await?;
    info!(
        http_addr = %http_addr,
        resolver_url = %config.resolver_url,
        "Starting watchpool control plane"
    );

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;
    if let Err(e) = served {
        error!(error = %e, "HTTP server error");
    }

    info!("Shutting down");
    orchestrator.shutdown();
    if let Err(e) = reconciler.await {
        error!(error = %e, "Reconciliation loop panicked");
    }

    Ok(())
}
