//! zorg-sentiment — service entrypoint.
//! Boots the Axum HTTP API, the Prometheus recorder and the nightly
//! rotation task.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zorg_sentiment::aggregator::Aggregator;
use zorg_sentiment::alerts::AlertWebhook;
use zorg_sentiment::analyzer::SentimentAnalyzer;
use zorg_sentiment::api::{self, AppState};
use zorg_sentiment::config::{ConfigPresence, SentimentConfig, SourceCredentials};
use zorg_sentiment::metrics::Metrics;
use zorg_sentiment::ratelimit::RateLimiterRegistry;
use zorg_sentiment::snapshot::SnapshotService;
use zorg_sentiment::sources;
use zorg_sentiment::storage::{rotation, BucketStore};

/// Compact text logs by default; `LOG_FORMAT=json` switches to structured
/// output for log shippers.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("zorg_sentiment=info,warn"));
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = SentimentConfig::load();
    let creds = SourceCredentials::from_env();
    let presence = ConfigPresence::collect(&cfg, &creds);

    let metrics = Metrics::init(cfg.cache.ttl_minutes * 60 * 1000);

    let store = Arc::new(BucketStore::new(cfg.storage.clone()));
    let limiters = Arc::new(RateLimiterRegistry::new(cfg.rate_limits.clone()));
    let analyzer = SentimentAnalyzer::new(&cfg.analyzer);
    let aggregator = Aggregator::new(
        sources::all_sources(&creds),
        limiters,
        analyzer,
        Arc::clone(&store),
        cfg.aggregation.clone(),
    );
    let alerts = AlertWebhook::new(creds.alert_webhook_url.clone());
    let snapshots = Arc::new(SnapshotService::new(
        aggregator,
        Arc::clone(&store),
        alerts,
        &cfg,
    ));

    rotation::spawn_nightly_rotation(Arc::clone(&store));

    let state = AppState {
        snapshots,
        presence: Arc::new(presence),
    };
    let router = api::create_router(state, &metrics);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "zorg-sentiment listening");
    axum::serve(listener, router).await?;
    Ok(())
}
