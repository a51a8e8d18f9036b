//! One-shot bucket rotation, for cron or manual runs.
//!
//! Usage: `rotate [--dry-run]`

use zorg_sentiment::config::SentimentConfig;
use zorg_sentiment::storage::{rotation, BucketStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zorg_sentiment=info,warn")),
        )
        .compact()
        .init();

    let dry_run = std::env::args().any(|a| a == "--dry-run");
    let cfg = SentimentConfig::load();
    let store = BucketStore::new(cfg.storage.clone());

    let outcome = rotation::rotate_old_buckets(&store, dry_run).await?;
    tracing::info!(
        dry_run,
        days_folded = outcome.days_folded,
        days_skipped = outcome.days_skipped,
        buckets_folded = outcome.buckets_folded,
        buckets_deleted = outcome.buckets_deleted,
        "rotation finished"
    );
    Ok(())
}
