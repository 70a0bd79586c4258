//! repost-relay — Binary Entrypoint
//! Boots the harvest scheduler and the Axum HTTP server, and stops both on Ctrl-C.

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repost_relay::config::RelayConfig;
use repost_relay::metrics::Metrics;
use repost_relay::{spawn_harvest_scheduler, RelayRuntime};

/// Compact logs by default; `RELAY_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "repost_relay=info,harvest=info,scheduler=info,transform=info,storage=info,warn",
        )
    });

    let json = std::env::var("RELAY_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer().compact()).try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = RelayConfig::load_default().context("loading relay config")?;
    let bind_addr = cfg.bind_addr.clone();
    let interval = cfg.interval();

    let metrics = Metrics::init()?;
    let relay = RelayRuntime::from_config(cfg)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = spawn_harvest_scheduler(relay.job.clone(), interval, shutdown_rx);

    let app = relay.router().merge(metrics.router());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!(%bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
        })
        .await
        .context("http server")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    info!("scheduler stopped, bye");
    Ok(())
}
