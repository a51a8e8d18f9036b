// tests/bucket_store.rs
//
// Disk-level behavior of the hourly bucket store:
// - add_posts groups by hour, dedups by id (within a batch and against disk)
// - get_recent_buckets applies the retention window and sorts ascending
// - clean_old_buckets only removes hourly files whose day is already folded
// - historical_context merges hourly buckets with rotated daily aggregates

use chrono::{DateTime, Duration, Utc};
use tempfile::tempdir;

use zorg_sentiment::config::StorageConfig;
use zorg_sentiment::storage::{bucket_id_for, BucketStore};
use zorg_sentiment::types::{AnalyzedPost, DailyAggregate, SourceId};

fn store_in(root: &std::path::Path) -> BucketStore {
    BucketStore::new(StorageConfig {
        data_dir: root.join("sentiment"),
        ..StorageConfig::default()
    })
}

fn post(id: &str, at: DateTime<Utc>, score: f64) -> AnalyzedPost {
    AnalyzedPost {
        id: id.to_string(),
        source: SourceId::Twitter,
        text: "testbericht".to_string(),
        sentiment_score: score,
        language: "nl".to_string(),
        topics: vec![],
        created_at: at,
        analyzed_at: at,
    }
}

fn daily(date: &str, avg: f64, min: f64, max: f64) -> DailyAggregate {
    DailyAggregate {
        date: date.to_string(),
        avg_composite: avg,
        min_composite: min,
        max_composite: max,
        total_mentions: 10,
        hourly_buckets: 4,
    }
}

#[tokio::test]
async fn posts_merge_into_hourly_buckets_with_dedup() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    let batch = vec![
        post("twitter_a", now, 0.4),
        post("twitter_b", now, -0.2),
        post("twitter_a", now, 0.4), // duplicate id within the batch
    ];
    store.add_posts(&batch).await.expect("add posts");

    let bucket = store
        .read_bucket(&bucket_id_for(now))
        .await
        .expect("bucket on disk");
    assert_eq!(bucket.post_count, 2);
    assert!((bucket.aggregate_score - 0.1).abs() < 1e-9);

    // replaying the same batch must not duplicate anything
    store.add_posts(&batch).await.expect("replay");
    let bucket = store
        .read_bucket(&bucket_id_for(now))
        .await
        .expect("bucket after replay");
    assert_eq!(bucket.post_count, 2);

    // a genuinely new post joins the bucket and moves the aggregate
    store
        .add_posts(&[post("twitter_c", now, 0.1)])
        .await
        .expect("add new post");
    let bucket = store
        .read_bucket(&bucket_id_for(now))
        .await
        .expect("bucket after merge");
    assert_eq!(bucket.post_count, 3);
    assert!((bucket.aggregate_score - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn posts_split_across_hours() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();
    let earlier = now - Duration::hours(1);

    store
        .add_posts(&[post("reddit_x", earlier, 0.5), post("reddit_y", now, -0.5)])
        .await
        .expect("add posts");

    assert_ne!(bucket_id_for(earlier), bucket_id_for(now));
    let first = store
        .read_bucket(&bucket_id_for(earlier))
        .await
        .expect("earlier bucket");
    assert_eq!(first.post_count, 1);
    assert_eq!(first.posts[0].id, "reddit_x");
    let second = store
        .read_bucket(&bucket_id_for(now))
        .await
        .expect("current bucket");
    assert_eq!(second.post_count, 1);
    assert_eq!(second.posts[0].id, "reddit_y");
}

#[tokio::test]
async fn recent_buckets_respect_window_and_order() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    store
        .add_posts(&[
            post("old", now - Duration::hours(30), 0.9),
            post("mid", now - Duration::hours(5), 0.2),
            post("new", now - Duration::hours(1), -0.1),
        ])
        .await
        .expect("add posts");

    let recent = store.get_recent_buckets().await.expect("recent buckets");
    assert_eq!(recent.len(), 2, "30h-old bucket falls outside retention");
    assert!(recent[0].start_time < recent[1].start_time, "ascending order");
    assert_eq!(recent[0].posts[0].id, "mid");
    assert_eq!(recent[1].posts[0].id, "new");
}

#[tokio::test]
async fn daily_files_are_not_recent_buckets() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    store
        .add_posts(&[post("fresh", now, 0.3)])
        .await
        .expect("add posts");
    std::fs::write(
        store.data_dir().join("daily-2025-06.json"),
        serde_json::to_vec_pretty(&vec![daily("2025-06-01", 0.1, -0.2, 0.4)])
            .expect("serialize daily"),
    )
    .expect("write daily file");

    let recent = store.get_recent_buckets().await.expect("recent buckets");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].posts[0].id, "fresh");
}

#[tokio::test]
async fn corrupt_bucket_file_is_skipped() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    store
        .add_posts(&[post("good", now, 0.3)])
        .await
        .expect("add posts");
    let bad_id = bucket_id_for(now - Duration::hours(2));
    std::fs::write(
        store.data_dir().join(format!("{bad_id}.json")),
        b"{ this is not json",
    )
    .expect("write corrupt file");

    let recent = store
        .get_recent_buckets()
        .await
        .expect("reads must tolerate a corrupt file");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].posts[0].id, "good");
}

#[tokio::test]
async fn cleanup_only_deletes_folded_days() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let old = Utc::now() - Duration::days(40);

    store
        .add_posts(&[post("ancient", old, 0.5)])
        .await
        .expect("add old post");

    // day not folded yet: the hourly file must survive
    assert_eq!(store.clean_old_buckets().await.expect("clean"), 0);
    assert!(store.read_bucket(&bucket_id_for(old)).await.is_some());

    // fold the day by hand, then cleanup may drop the hourly file
    let day = old.format("%Y-%m-%d").to_string();
    let month = old.format("%Y-%m").to_string();
    std::fs::write(
        store.data_dir().join(format!("daily-{month}.json")),
        serde_json::to_vec_pretty(&vec![daily(&day, 0.5, 0.5, 0.5)])
            .expect("serialize daily"),
    )
    .expect("write daily file");

    assert_eq!(store.clean_old_buckets().await.expect("clean folded"), 1);
    assert!(store.read_bucket(&bucket_id_for(old)).await.is_none());
    assert_eq!(store.clean_old_buckets().await.expect("idempotent"), 0);
}

#[tokio::test]
async fn historical_context_merges_hourly_and_daily() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let now = Utc::now();

    store
        .add_posts(&[post("recent", now - Duration::hours(2), 0.5)])
        .await
        .expect("add recent post");

    let five_days_ago = now - Duration::days(5);
    let day = five_days_ago.format("%Y-%m-%d").to_string();
    let month = five_days_ago.format("%Y-%m").to_string();
    std::fs::write(
        store.data_dir().join(format!("daily-{month}.json")),
        serde_json::to_vec_pretty(&vec![daily(&day, 0.1, -0.8, 0.9)])
            .expect("serialize daily"),
    )
    .expect("write daily file");

    let ctx = store
        .historical_context(30)
        .await
        .expect("context query")
        .expect("history exists");
    assert_eq!(ctx.min.score, -0.8, "daily minimum wins");
    assert_eq!(ctx.max.score, 0.9, "daily maximum wins");
    assert_eq!(ctx.days_analyzed, 2);
}

#[tokio::test]
async fn historical_context_on_empty_store_is_none() {
    let dir = tempdir().expect("tempdir");
    let store = store_in(dir.path());
    let ctx = store.historical_context(30).await.expect("context query");
    assert!(ctx.is_none());
}
