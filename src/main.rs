//! Order Ledger Watch: entry point
//!
//! Reads order update events as JSON Lines on stdin and reconciles each
//! into its stream's ledger (recent orders + open orders). Runs until
//! stdin closes or SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (path from LEDGER_CONFIG) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build the snapshot repository (JSON files, or in-memory if disabled)
//! 4. Create LedgerService and restore persisted ledgers
//! 5. Spawn metrics recorder + health server on the configured address
//! 6. Spawn repository health probe
//! 7. Spawn the ledger loop over the stdin feed
//! 8. Wait for SIGINT or feed EOF → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use order_ledger_watch::adapters::feeds::JsonlFeed;
use order_ledger_watch::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use order_ledger_watch::adapters::persistence::{InMemoryRepository, StateStore};
use order_ledger_watch::config::{self, AppConfig};
use order_ledger_watch::ports::repository::SnapshotRepository;
use order_ledger_watch::usecases::LedgerService;

/// Interval between repository writability probes.
const REPOSITORY_PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = config::loader::config_path_from_env();
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        recent_capacity = config.ledger.recent_capacity,
        strict_open_set = config.ledger.strict_open_set,
        persistence = config.persistence.enabled,
        "Starting order ledger watch"
    );

    // ── 3. Snapshot repository ──────────────────────────────
    if config.persistence.enabled {
        let store = StateStore::new(&config.persistence.data_dir)
            .await
            .context("Failed to open snapshot store")?;
        run(config, Arc::new(store)).await
    } else {
        warn!("Persistence disabled, ledgers live in memory only");
        run(config, Arc::new(InMemoryRepository::new())).await
    }
}

/// Wire the service around `repository` and run until shutdown.
async fn run<R: SnapshotRepository>(config: AppConfig, repository: Arc<R>) -> Result<()> {
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let health = Arc::new(HealthState::new());

    // ── 4. Ledger service + restore ─────────────────────────
    let service = Arc::new(LedgerService::new(
        Arc::clone(&repository),
        &config.ledger,
        config.persistence.enabled,
    ));
    let restored = service
        .restore_all()
        .await
        .context("Failed to restore ledgers")?;
    info!(streams = restored, "Ledgers ready");

    let mut background = Vec::new();

    // ── 5. Metrics recorder + health server ─────────────────
    if config.metrics.enabled {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to build metrics")?);
        background.push(tokio::spawn(
            Arc::clone(&metrics).run(
                service.subscribe(),
                service.subscribe_drops(),
                shutdown_tx.subscribe(),
            ),
        ));

        let server = HealthServer::new(
            Arc::clone(&health),
            metrics,
            config.metrics.bind_address.clone(),
        );
        let server_shutdown = shutdown_tx.subscribe();
        background.push(tokio::spawn(async move {
            if let Err(e) = server.run(server_shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }));
    }

    // ── 6. Repository health probe ──────────────────────────
    {
        let repository = Arc::clone(&repository);
        let health = Arc::clone(&health);
        let mut probe_shutdown = shutdown_tx.subscribe();
        background.push(tokio::spawn(async move {
            loop {
                let healthy = repository.is_healthy().await;
                health.repository_healthy.store(healthy, Ordering::Relaxed);
                if !healthy {
                    warn!("Snapshot repository is not writable");
                }
                tokio::select! {
                    biased;
                    _ = probe_shutdown.recv() => break,
                    () = tokio::time::sleep(REPOSITORY_PROBE_INTERVAL) => {}
                }
            }
        }));
    }

    // ── 7. Ledger loop over stdin ───────────────────────────
    let loop_service = Arc::clone(&service);
    let loop_shutdown = shutdown_tx.subscribe();
    let mut ledger_handle = tokio::spawn(async move {
        let mut feed = JsonlFeed::stdin();
        loop_service.run(&mut feed, loop_shutdown).await
    });

    info!("All tasks spawned, watching for order events");

    // ── 8. Wait for SIGINT or feed EOF ──────────────────────
    let loop_result = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
            let _ = shutdown_tx.send(());
            tokio::time::timeout(Duration::from_secs(10), &mut ledger_handle).await.ok()
        }
        result = &mut ledger_handle => Some(result),
    };

    health.feed_open.store(false, Ordering::Relaxed);
    let _ = shutdown_tx.send(());

    match loop_result {
        Some(Ok(Ok(applied))) => info!(applied, "Ledger loop finished"),
        Some(Ok(Err(e))) => error!(error = %e, "Ledger loop failed"),
        Some(Err(e)) => error!(error = %e, "Ledger loop task aborted"),
        None => warn!("Ledger loop did not stop in time"),
    }

    for handle in background {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    for stream in service.streams().await {
        if let Some(state) = service.snapshot(&stream).await {
            info!(
                stream = %stream,
                orders = state.orders.len(),
                open_orders = state.open_orders.len(),
                "Final ledger"
            );
        }
    }

    info!("Shutdown complete");
    Ok(())
}
