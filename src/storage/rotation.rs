//! Nightly rotation: fold hourly buckets past the long-term horizon into
//! per-month daily aggregates, then drop the hourly files.
//!
//! Days already present in the daily store are never folded twice; their
//! leftover hourly files are still deleted. The whole pass is idempotent,
//! so the standalone rotate binary can be re-run after a crash.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tokio::fs;

use crate::storage::BucketStore;
use crate::types::{DailyAggregate, SentimentBucket};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub days_folded: usize,
    pub days_skipped: usize,
    pub buckets_folded: usize,
    pub buckets_deleted: usize,
}

/// Collapse one day of buckets into its daily aggregate. `None` when the
/// day holds no posts at all.
fn fold_day(date: &str, buckets: &[SentimentBucket]) -> Option<DailyAggregate> {
    let scored: Vec<&SentimentBucket> =
        buckets.iter().filter(|b| b.post_count > 0).collect();
    if scored.is_empty() {
        return None;
    }
    let sum: f64 = scored.iter().map(|b| b.aggregate_score).sum();
    let min = scored
        .iter()
        .map(|b| b.aggregate_score)
        .fold(f64::INFINITY, f64::min);
    let max = scored
        .iter()
        .map(|b| b.aggregate_score)
        .fold(f64::NEG_INFINITY, f64::max);
    Some(DailyAggregate {
        date: date.to_string(),
        avg_composite: sum / scored.len() as f64,
        min_composite: min,
        max_composite: max,
        total_mentions: scored.iter().map(|b| b.post_count).sum(),
        hourly_buckets: scored.len(),
    })
}

/// One rotation pass over everything older than `long_term_retention_days`.
/// With `dry_run` set, reports what would happen without touching disk.
pub async fn rotate_old_buckets(store: &BucketStore, dry_run: bool) -> Result<RotationOutcome> {
    let cutoff_day = (Utc::now()
        - Duration::days(store.config().long_term_retention_days))
    .format("%Y-%m-%d")
    .to_string();

    // month -> day -> bucket ids, oldest first
    let mut by_month: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for (bucket_id, start) in store.bucket_files().await? {
        let day = start.format("%Y-%m-%d").to_string();
        if day >= cutoff_day {
            continue;
        }
        let month = start.format("%Y-%m").to_string();
        by_month
            .entry(month)
            .or_default()
            .entry(day)
            .or_default()
            .push(bucket_id);
    }

    let mut outcome = RotationOutcome::default();
    for (month, days) in by_month {
        let mut daily = store.read_daily_month(&month).await?;
        let existing: HashSet<String> = daily.iter().map(|d| d.date.clone()).collect();
        let mut month_changed = false;
        let mut deletable: Vec<String> = Vec::new();

        for (day, bucket_ids) in days {
            if existing.contains(&day) {
                outcome.days_skipped += 1;
                deletable.extend(bucket_ids);
                continue;
            }

            let mut buckets = Vec::new();
            for id in &bucket_ids {
                if let Some(bucket) = store.read_bucket(id).await {
                    buckets.push(bucket);
                }
            }
            if let Some(aggregate) = fold_day(&day, &buckets) {
                tracing::info!(
                    date = %day,
                    hourly_buckets = aggregate.hourly_buckets,
                    total_mentions = aggregate.total_mentions,
                    "folding day into daily store"
                );
                daily.push(aggregate);
                month_changed = true;
                outcome.days_folded += 1;
                outcome.buckets_folded += bucket_ids.len();
            }
            deletable.extend(bucket_ids);
        }

        if month_changed && !dry_run {
            store.write_daily_month(&month, &daily).await?;
        }

        for bucket_id in deletable {
            outcome.buckets_deleted += 1;
            if dry_run {
                continue;
            }
            let path = store.data_dir().join(format!("{bucket_id}.json"));
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(bucket_id, error = %e, "failed to delete rotated bucket");
                }
            }
        }
    }

    if !dry_run && outcome.buckets_folded > 0 {
        metrics::counter!("sentiment_buckets_rotated_total")
            .increment(outcome.buckets_folded as u64);
    }
    tracing::info!(
        days_folded = outcome.days_folded,
        days_skipped = outcome.days_skipped,
        buckets_deleted = outcome.buckets_deleted,
        dry_run,
        "rotation pass finished"
    );
    Ok(outcome)
}

/// Background task: run a rotation pass shortly after 02:00 UTC every night.
/// Failures are logged and the loop keeps going.
pub fn spawn_nightly_rotation(store: Arc<BucketStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(until_next_run()).await;
            if let Err(e) = rotate_old_buckets(&store, false).await {
                tracing::error!(error = %e, "nightly rotation failed");
            }
        }
    })
}

fn until_next_run() -> std::time::Duration {
    let now = Utc::now();
    let today_run = now
        .date_naive()
        .and_hms_opt(2, 0, 0)
        .expect("02:00 exists every day")
        .and_utc();
    let next = if today_run > now {
        today_run
    } else {
        today_run + Duration::days(1)
    };
    (next - now).to_std().unwrap_or(std::time::Duration::from_secs(60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bucket(day: &str, hour: u32, score: f64, posts: usize) -> SentimentBucket {
        let date = chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap();
        let start = Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).unwrap());
        SentimentBucket {
            bucket_id: crate::storage::bucket_id_for(start),
            start_time: start,
            end_time: start + Duration::minutes(60),
            posts: Vec::new(),
            aggregate_score: score,
            post_count: posts,
        }
    }

    #[test]
    fn fold_day_averages_and_counts() {
        let buckets = vec![
            bucket("2025-06-01", 9, 0.2, 10),
            bucket("2025-06-01", 10, -0.4, 5),
            bucket("2025-06-01", 11, 0.5, 15),
        ];
        let agg = fold_day("2025-06-01", &buckets).unwrap();
        assert_eq!(agg.date, "2025-06-01");
        assert!((agg.avg_composite - 0.1).abs() < 1e-9);
        assert_eq!(agg.min_composite, -0.4);
        assert_eq!(agg.max_composite, 0.5);
        assert_eq!(agg.total_mentions, 30);
        assert_eq!(agg.hourly_buckets, 3);
    }

    #[test]
    fn fold_day_ignores_empty_buckets() {
        let buckets = vec![
            bucket("2025-06-01", 9, 0.0, 0),
            bucket("2025-06-01", 10, 0.6, 4),
        ];
        let agg = fold_day("2025-06-01", &buckets).unwrap();
        assert_eq!(agg.hourly_buckets, 1);
        assert_eq!(agg.total_mentions, 4);
        assert_eq!(agg.avg_composite, 0.6);
    }

    #[test]
    fn fold_day_with_no_posts_is_none() {
        let buckets = vec![bucket("2025-06-01", 9, 0.0, 0)];
        assert!(fold_day("2025-06-01", &buckets).is_none());
    }

    #[test]
    fn next_run_is_within_a_day() {
        let wait = until_next_run();
        assert!(wait <= std::time::Duration::from_secs(24 * 60 * 60));
    }
}
