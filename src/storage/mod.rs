//! storage — durable, time-partitioned bucket files.
//!
//! One JSON file per hourly bucket (`<data_dir>/YYYY-MM-DD-HH.json`) and one
//! per rotated month (`daily-YYYY-MM.json`). All mutations run behind one
//! async mutex and every write lands via temp-file + rename, so a crashed or
//! concurrent writer can never leave a half-written bucket behind.
//!
//! Two horizons apply: `retention_hours` bounds what read-recent returns;
//! `long_term_retention_days` bounds how long hourly files live on disk.
//! Cleanup only deletes hourly files whose calendar day is already folded
//! into the daily store (see `rotation`).

pub mod rotation;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use tokio::fs;
use tokio::sync::Mutex;

use crate::analyzer::calculate_aggregate_score;
use crate::config::StorageConfig;
use crate::types::{AnalyzedPost, Context30Day, DailyAggregate, ExtremePoint, SentimentBucket};

/// Floor an instant to the start of its UTC hour.
pub fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), ts.hour(), 0, 0)
        .single()
        .expect("UTC hour floor is unambiguous")
}

/// Derive the hourly bucket id for an instant, `YYYY-MM-DD-HH` (UTC).
pub fn bucket_id_for(ts: DateTime<Utc>) -> String {
    format!(
        "{:04}-{:02}-{:02}-{:02}",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour()
    )
}

/// Parse a bucket id back into its start instant. `None` for anything that
/// is not a bucket file name (daily files, strays).
pub fn parse_bucket_id(id: &str) -> Option<DateTime<Utc>> {
    let (date_part, hour_part) = id.rsplit_once('-')?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    if hour_part.len() != 2 {
        return None;
    }
    let hour: u32 = hour_part.parse().ok()?;
    if hour > 23 {
        return None;
    }
    let naive = date.and_hms_opt(hour, 0, 0)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[derive(Debug)]
pub struct BucketStore {
    cfg: StorageConfig,
    write_lock: Mutex<()>,
}

impl BucketStore {
    pub fn new(cfg: StorageConfig) -> Self {
        tracing::info!(
            data_dir = %cfg.data_dir.display(),
            retention_hours = cfg.retention_hours,
            "bucket store initialized"
        );
        Self {
            cfg,
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.cfg.data_dir
    }

    pub fn config(&self) -> &StorageConfig {
        &self.cfg
    }

    fn bucket_path(&self, bucket_id: &str) -> PathBuf {
        self.cfg.data_dir.join(format!("{bucket_id}.json"))
    }

    fn daily_path(&self, month: &str) -> PathBuf {
        self.cfg.data_dir.join(format!("daily-{month}.json"))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.cfg.data_dir)
            .await
            .with_context(|| format!("create data dir {}", self.cfg.data_dir.display()))
    }

    /// Read one bucket; missing files are quietly absent, unreadable ones
    /// are logged and treated as absent.
    pub async fn read_bucket(&self, bucket_id: &str) -> Option<SentimentBucket> {
        let path = self.bucket_path(bucket_id);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::error!(bucket_id, error = %e, "failed to read bucket");
                }
                return None;
            }
        };
        match serde_json::from_slice::<SentimentBucket>(&raw) {
            Ok(bucket) => Some(bucket),
            Err(e) => {
                tracing::error!(bucket_id, error = %e, "corrupt bucket file skipped");
                None
            }
        }
    }

    /// Atomic whole-file write: serialize to a sibling temp file, rename over
    /// the target.
    async fn write_bucket(&self, bucket: &SentimentBucket) -> Result<()> {
        let path = self.bucket_path(&bucket.bucket_id);
        let body = serde_json::to_vec_pretty(bucket).context("serialize bucket")?;
        write_atomic(&path, &body).await?;
        tracing::debug!(
            bucket_id = %bucket.bucket_id,
            post_count = bucket.post_count,
            "bucket written"
        );
        Ok(())
    }

    fn empty_bucket(&self, start: DateTime<Utc>) -> SentimentBucket {
        SentimentBucket {
            bucket_id: bucket_id_for(start),
            start_time: start,
            end_time: start + Duration::minutes(self.cfg.bucket_size_minutes),
            posts: Vec::new(),
            aggregate_score: 0.0,
            post_count: 0,
        }
    }

    /// Group posts by hour, merge each group into its bucket (dedup by id,
    /// both against disk and within the batch), recompute the aggregate and
    /// persist. Write failures propagate.
    pub async fn add_posts(&self, posts: &[AnalyzedPost]) -> Result<()> {
        if posts.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        self.ensure_dir().await?;

        let mut by_hour: BTreeMap<DateTime<Utc>, Vec<&AnalyzedPost>> = BTreeMap::new();
        for post in posts {
            by_hour
                .entry(hour_floor(post.created_at))
                .or_default()
                .push(post);
        }

        let buckets_touched = by_hour.len();
        for (start, group) in by_hour {
            let mut bucket = match self.read_bucket(&bucket_id_for(start)).await {
                Some(b) => b,
                None => self.empty_bucket(start),
            };

            let mut seen: HashSet<String> =
                bucket.posts.iter().map(|p| p.id.clone()).collect();
            for post in group {
                if seen.insert(post.id.clone()) {
                    bucket.posts.push(post.clone());
                }
            }
            bucket.post_count = bucket.posts.len();
            bucket.aggregate_score = calculate_aggregate_score(&bucket.posts);

            self.write_bucket(&bucket).await?;
        }

        tracing::info!(
            total_posts = posts.len(),
            buckets_updated = buckets_touched,
            "posts added to buckets"
        );
        Ok(())
    }

    /// All buckets within the retention window, ascending by start time.
    pub async fn get_recent_buckets(&self) -> Result<Vec<SentimentBucket>> {
        let cutoff = Utc::now() - Duration::hours(self.cfg.retention_hours);
        let mut buckets = Vec::new();
        for (bucket_id, start) in self.bucket_files().await? {
            if start < cutoff {
                continue;
            }
            if let Some(bucket) = self.read_bucket(&bucket_id).await {
                if bucket.start_time >= cutoff {
                    buckets.push(bucket);
                }
            }
        }
        buckets.sort_by_key(|b| b.start_time);
        Ok(buckets)
    }

    /// Delete hourly files older than the long-term cutoff, but only those
    /// whose day is already present in the daily store. Returns the number
    /// deleted; repeat calls with nothing left to do return 0.
    pub async fn clean_old_buckets(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let cutoff = Utc::now() - Duration::days(self.cfg.long_term_retention_days);
        let mut folded_days: HashMap<String, HashSet<String>> = HashMap::new();
        let mut deleted = 0usize;

        for (bucket_id, start) in self.bucket_files().await? {
            if start >= cutoff {
                continue;
            }
            let day = start.format("%Y-%m-%d").to_string();
            let month = start.format("%Y-%m").to_string();

            if !folded_days.contains_key(&month) {
                let days = match self.read_daily_month(&month).await {
                    Ok(list) => list.into_iter().map(|d| d.date).collect(),
                    Err(e) => {
                        tracing::warn!(month, error = %e, "daily store unreadable, keeping hourly files");
                        HashSet::new()
                    }
                };
                folded_days.insert(month.clone(), days);
            }
            let folded = folded_days
                .get(&month)
                .map(|days| days.contains(&day))
                .unwrap_or(false);
            if !folded {
                // not rotated yet; rotation will fold and delete it
                continue;
            }

            match fs::remove_file(self.bucket_path(&bucket_id)).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(bucket_id, error = %e, "failed to delete old bucket");
                }
            }
        }

        if deleted > 0 {
            metrics::counter!("sentiment_buckets_deleted_total").increment(deleted as u64);
            tracing::info!(deleted_count = deleted, "old buckets cleaned");
        }
        Ok(deleted)
    }

    /// `(bucket_id, start_time)` for every hourly bucket file on disk.
    /// A missing data dir reads as empty.
    pub(crate) async fn bucket_files(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut out = Vec::new();
        let mut rd = match fs::read_dir(&self.cfg.data_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("list data dir {}", self.cfg.data_dir.display())
                })
            }
        };
        while let Some(entry) = rd.next_entry().await.context("read data dir entry")? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(start) = parse_bucket_id(stem) {
                out.push((stem.to_string(), start));
            }
        }
        out.sort();
        Ok(out)
    }

    /// Rotated aggregates for one `YYYY-MM` month, date-ascending. Missing
    /// file reads as empty; a corrupt file is an error (rotation must not
    /// overwrite data it could not read).
    pub async fn read_daily_month(&self, month: &str) -> Result<Vec<DailyAggregate>> {
        let path = self.daily_path(month);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("read daily store {}", path.display()))
            }
        };
        serde_json::from_slice(&raw)
            .with_context(|| format!("parse daily store {}", path.display()))
    }

    pub(crate) async fn write_daily_month(
        &self,
        month: &str,
        days: &[DailyAggregate],
    ) -> Result<()> {
        self.ensure_dir().await?;
        let mut sorted: Vec<DailyAggregate> = days.to_vec();
        sorted.sort_by(|a, b| a.date.cmp(&b.date));
        let body = serde_json::to_vec_pretty(&sorted).context("serialize daily store")?;
        write_atomic(&self.daily_path(month), &body).await
    }

    /// Min/max aggregate score over the trailing `days`, drawn from hourly
    /// buckets and rotated daily aggregates. `None` when there is no history.
    pub async fn historical_context(&self, days: i64) -> Result<Option<Context30Day>> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut candidates: Vec<ExtremePoint> = Vec::new();
        let mut days_seen: HashSet<String> = HashSet::new();

        for (bucket_id, start) in self.bucket_files().await? {
            if start < cutoff {
                continue;
            }
            if let Some(bucket) = self.read_bucket(&bucket_id).await {
                if bucket.post_count == 0 {
                    continue;
                }
                days_seen.insert(start.format("%Y-%m-%d").to_string());
                candidates.push(ExtremePoint {
                    score: bucket.aggregate_score,
                    at: bucket.start_time,
                });
            }
        }

        for month in months_covering(cutoff, Utc::now()) {
            let daily = match self.read_daily_month(&month).await {
                Ok(daily) => daily,
                Err(e) => {
                    tracing::warn!(month, error = %e, "skipping unreadable daily store");
                    continue;
                }
            };
            for day in daily {
                let Some(date) = NaiveDate::parse_from_str(&day.date, "%Y-%m-%d").ok() else {
                    continue;
                };
                let at = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight"));
                if at < cutoff {
                    continue;
                }
                days_seen.insert(day.date.clone());
                candidates.push(ExtremePoint {
                    score: day.min_composite,
                    at,
                });
                candidates.push(ExtremePoint {
                    score: day.max_composite,
                    at,
                });
            }
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        let mut min = candidates[0].clone();
        let mut max = candidates[0].clone();
        for c in &candidates[1..] {
            if c.score < min.score {
                min = c.clone();
            }
            if c.score > max.score {
                max = c.clone();
            }
        }
        Ok(Some(Context30Day {
            min,
            max,
            days_analyzed: days_seen.len(),
        }))
    }
}

/// `YYYY-MM` keys for every month touched by the range.
fn months_covering(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<String> {
    let mut months = Vec::new();
    let (mut y, mut m) = (from.year(), from.month());
    loop {
        months.push(format!("{y:04}-{m:02}"));
        if (y, m) >= (to.year(), to.month()) {
            break;
        }
        m += 1;
        if m > 12 {
            m = 1;
            y += 1;
        }
    }
    months
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)
        .await
        .with_context(|| format!("write temp file {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename into place {}", path.display()))
}
