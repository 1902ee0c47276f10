use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use telemetry_service::{
    broadcast::BroadcastRegistry,
    config::AppConfig,
    http::{self, AppState},
    ingest::Ingestor,
    metrics_server, observability,
    store::{PgRowStore, RowStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    // Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
    let store: Arc<dyn RowStore> = Arc::new(PgRowStore::new(pool));
    let broadcast = Arc::new(BroadcastRegistry::new(cfg.broadcast.channel_capacity));
    let ingestor = Arc::new(Ingestor::new(store.clone(), broadcast.clone()));

    let app = http::router(AppState {
        store,
        ingestor,
        broadcast,
        tariff: cfg.tariff.clone(),
    });

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;

    tracing::info!(%addr, "telemetry service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
