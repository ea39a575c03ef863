//! abuse-shield - blocklist and rate limiting service.
//!
//! Loads `config.toml` (or the path given as the first argument), builds the
//! shield, and serves the protected demo API until Ctrl-C.

use abuse_shield::config::{self, Config, LogFormat, StoreBackend};
use abuse_shield::db::Database;
use abuse_shield::notify::{LogSink, Notifier, WebhookSink};
use abuse_shield::security::SystemClock;
use abuse_shield::store::{MemoryStore, RecordStore};
use abuse_shield::{Shield, ShieldError, ShieldParams, http, metrics};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    init_tracing(config.server.log_format);

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        return Err(ShieldError::from(errors).into());
    }

    info!(
        path = %config_path,
        listen = %config.server.listen,
        backend = ?config.database.backend,
        "Starting abuse-shield"
    );

    let store: Arc<dyn RecordStore> = match config.database.backend {
        StoreBackend::Sqlite => Arc::new(Database::new(&config.database.path).await?),
        StoreBackend::Memory => {
            warn!("Using in-memory record store; blocks will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let mut notifier = Notifier::new().with_sink(Arc::new(LogSink));
    if let Some(url) = &config.notify.webhook_url {
        let sink = WebhookSink::new(
            url,
            Duration::from_secs(config.notify.timeout_secs),
            config.notify.max_per_second,
        )?;
        notifier = notifier.with_sink(Arc::new(sink));
        info!(url = %url, "Webhook notifications enabled");
    }

    if config.server.metrics_enabled {
        metrics::init();
        info!("Metrics initialized");
    } else {
        info!("Metrics disabled");
    }

    let shield = Arc::new(Shield::new(ShieldParams::from_config(
        &config,
        store,
        notifier,
        Arc::new(SystemClock),
    )));

    // A store outage at boot should not keep the service down; the hourly
    // resync fills the cache once the store is back.
    match shield.load().await {
        Ok(count) => info!(count, "Loaded active blocks"),
        Err(e) => warn!(error = %e, "Failed to load blocklist, starting with empty cache"),
    }

    let maintenance = shield.start_maintenance();
    info!(tasks = maintenance.task_count(), "Maintenance tasks started");

    if shield.admin_token().is_none() {
        info!("Admin API disabled (no [admin].token)");
    }

    let app = http::router(Arc::clone(&shield), config.server.metrics_enabled);
    http::run_http_server(config.server.listen, app, shutdown_signal()).await?;

    info!("Shutting down");
    maintenance.shutdown().await;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
