//! VIP news ingest service. Binary entrypoint.
//! Boots tracing, loads pipeline config, picks storage, seeds the watch-list
//! and serves the Axum router (trigger, health, metrics).

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vip_news_ingest::api::{create_router, AppState};
use vip_news_ingest::config::PipelineConfig;
use vip_news_ingest::fetch::ReqwestTransport;
use vip_news_ingest::ingest::Ingestor;
use vip_news_ingest::metrics::Metrics;
use vip_news_ingest::storage::{MemoryStore, SqliteStore, Storage};
use vip_news_ingest::vip::Vip;

/// Compact logs filtered by `RUST_LOG`. The runtime may already have a
/// subscriber installed; in that case this is a no-op.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vip_news_ingest=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

async fn open_store(seeds: Vec<Vip>) -> anyhow::Result<Arc<dyn Storage>> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => {
            let store = SqliteStore::connect(url.trim())
                .await
                .context("opening sqlite store")?;
            store.seed_vips(&seeds).await.context("seeding vips")?;
            Ok(Arc::new(store))
        }
        _ => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(MemoryStore::with_vips(seeds)))
        }
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Arc::new(PipelineConfig::load().context("loading pipeline config")?);
    let seeds: Vec<Vip> = config.vips.iter().cloned().map(|s| s.into_vip()).collect();
    let store = open_store(seeds).await?;

    let transport = Arc::new(ReqwestTransport::new().context("building http client")?);
    let ingestor = Ingestor::from_config(store, transport, config).context("building ingestor")?;

    let metrics = Metrics::init()?;
    let state = AppState::from_env(Arc::new(ingestor));
    if state.api_key.is_none() {
        tracing::warn!("API_KEY not set; every ingest trigger will be rejected");
    }

    let router = create_router(state).merge(metrics.router());
    Ok(router.into())
}
