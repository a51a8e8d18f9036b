//! cache.rs — single-entry TTL cache for the composed snapshot.
//!
//! Last-writer-wins; concurrent misses may both recompute and that is
//! accepted for a single-instance deployment. Expiry is checked on read, so
//! an idle cache holds at most one stale entry.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::SentimentSnapshot;

#[derive(Debug)]
pub struct SnapshotCache {
    inner: Mutex<Option<Entry>>,
    ttl: Duration,
}

#[derive(Debug)]
struct Entry {
    snapshot: SentimentSnapshot,
    stored_at: Instant,
}

impl SnapshotCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(None),
            ttl,
        }
    }

    pub fn with_ttl_minutes(minutes: u64) -> Self {
        Self::with_ttl(Duration::from_secs(minutes * 60))
    }

    /// Fresh copy of the cached snapshot, or `None` on miss/expiry.
    pub fn get(&self) -> Option<SentimentSnapshot> {
        let mut slot = self.inner.lock().expect("snapshot cache mutex poisoned");
        match slot.as_ref() {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                tracing::debug!("snapshot cache hit");
                Some(entry.snapshot.clone())
            }
            Some(_) => {
                tracing::debug!("snapshot cache expired");
                *slot = None;
                None
            }
            None => None,
        }
    }

    pub fn put(&self, snapshot: SentimentSnapshot) {
        let mut slot = self.inner.lock().expect("snapshot cache mutex poisoned");
        *slot = Some(Entry {
            snapshot,
            stored_at: Instant::now(),
        });
    }

    pub fn clear(&self) {
        let mut slot = self.inner.lock().expect("snapshot cache mutex poisoned");
        *slot = None;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
