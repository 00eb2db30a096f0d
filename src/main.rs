//! Statuspage - headless status page for pre-computed health checks
//!
//! Reads check files from storage, aggregates them into per-endpoint series,
//! a timeline of events and an overall status, and renders a dashboard.

use statuspage::config::Config;
use statuspage::render::{self, Dashboard};
use statuspage::scheduler::Poller;
use statuspage::storage::Storage;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("statuspage=info".parse()?))
        .init();

    // Load configuration
    let cfg = Config::load()?;
    tracing::info!(
        "Starting status page with {} storage, polling every {}s",
        cfg.storage.kind,
        cfg.refresh_interval
    );

    let storage = Arc::new(Storage::from_config(&cfg.storage)?);
    tracing::info!("Storage initialized: {}", storage.kind());

    // Start polling
    let (poller, snapshots) = Poller::new(storage, &cfg);
    let handle = poller.start(cfg.refresh_interval());

    // Draw until interrupted
    let dashboard = Dashboard::new(&cfg);
    let mut stdout = std::io::stdout();
    tokio::select! {
        _ = render::run(&dashboard, snapshots, cfg.label_refresh_interval(), &mut stdout) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        }
    }

    handle.stop().await;
    Ok(())
}
