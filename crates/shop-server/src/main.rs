//! shop-server binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shop_commerce::outbox::{LogPublisher, OutboxRelay};
use shop_db::{Db, DbConfig};
use shop_server::seed::SeedData;
use tokio::sync::watch;
use shop_server::{logging, ServerConfig};

#[derive(Parser)]
#[command(name = "shop-server")]
#[command(author, version, about = "Order placement and fulfillment service")]
struct Cli {
    /// Config file (TOML, or JSON by extension)
    #[arg(short, long, default_value = "shop.toml")]
    config: PathBuf,

    /// Listen address, overriding the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON file with branches, products and vouchers to load at startup
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    logging::init(&config.logging)?;

    let db = Db::open(&config.database.path, DbConfig::default())
        .with_context(|| format!("Failed to open database {}", config.database.path.display()))?;
    tracing::info!(path = %config.database.path.display(), "database opened");
    if let Some(path) = &cli.seed {
        SeedData::load(path)?.apply(&db).await?;
    }

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let relay = OutboxRelay::new(db.clone(), LogPublisher).with_batch_size(config.outbox.batch_size);
    let relay = tokio::spawn(relay.run(config.outbox.relay_interval(), async move {
        let _ = stop_rx.changed().await;
    }));

    let app = shop_server::app(db, &config);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, "shop-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = stop_tx.send(true);
    if let Err(err) = relay.await {
        tracing::warn!(error = %err, "outbox relay task failed");
    }
    tracing::info!("shop-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
    }
}
