//! # bazaar-smsd
//!
//! SMS engine daemon: the developer API, the refund reconciler and the
//! vendor balance monitor in one process.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           bazaar-smsd                                   │
//! │                                                                         │
//! │  Client software ──► HTTP /api/sms/send ──► SmsService ──► SQLite       │
//! │                                                 │                       │
//! │                                                 ▼                       │
//! │                                   dispatch ──► vendor gateways          │
//! │                                                 │                       │
//! │                                                 ▼                       │
//! │                                   Reconciler (refunds)                  │
//! │                                                                         │
//! │  BalanceMonitor ──► vendor balance endpoint ──► low-balance alert SMS   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```bash
//! bazaar-smsd                       # config from the platform config dir
//! bazaar-smsd --config ./sms.toml
//! RUST_LOG=bazaar_sms=trace bazaar-smsd
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use bazaar_db::{Database, DbConfig};
use bazaar_sms::{
    ApiServer, BalanceMonitor, HttpGatewayClient, Reconciler, ServiceStats, SmsConfig, SmsService,
};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,bazaar=debug,sqlx=warn";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with_target(true)
        .init();

    let config_path = config_path_arg();
    let config = SmsConfig::load(config_path)?;
    info!(
        db = %config.database.path.display(),
        port = config.server.port,
        alerts = config.alert.enabled,
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = Database::new(DbConfig::new(config.database.path.clone()).max_connections(config.database.max_connections)).await?;

    let stats = Arc::new(RwLock::new(ServiceStats::default()));
    let client = Arc::new(HttpGatewayClient::new(config.dispatch.request_timeout())?);

    let (reconciler, reconciler_handle) = Reconciler::new(db.clone(), config.dispatch.reconcile_delay(), stats.clone());
    let reconciler_task = tokio::spawn(reconciler.run());

    let monitor_handle = if config.alert.enabled {
        let (monitor, handle) = BalanceMonitor::new(client.clone(), config.alert.clone());
        tokio::spawn(monitor.run());
        Some(handle)
    } else {
        info!("Balance alerts disabled");
        None
    };

    let service = SmsService::new(
        db.clone(),
        client,
        config.dispatch.clone(),
        reconciler_handle.clone(),
        stats.clone(),
    );
    let server = ApiServer::new(config.server.clone(), service).start().await?;
    info!(addr = %server.local_addr(), "bazaar-smsd running");

    shutdown_signal().await;
    info!("Shutting down");

    if let Err(e) = server.shutdown().await {
        warn!(?e, "Developer API already stopped");
    }
    if let Some(handle) = monitor_handle {
        if let Err(e) = handle.shutdown().await {
            warn!(?e, "Balance monitor already stopped");
        }
    }
    if let Err(e) = reconciler_handle.shutdown().await {
        warn!(?e, "Reconciler already stopped");
    }
    if let Err(e) = reconciler_task.await {
        error!(?e, "Reconciler task panicked");
    }

    let stats = stats.read().await.clone();
    info!(
        sent = stats.sent,
        failed = stats.failed,
        refunded_parts = stats.refunded_parts,
        "Shutdown complete"
    );
    db.close().await;
    Ok(())
}

fn config_path_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
