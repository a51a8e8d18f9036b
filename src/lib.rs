// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod aggregator;
pub mod alerts;
pub mod analyzer;
pub mod api;
pub mod cache;
pub mod config;
pub mod detector;
pub mod error;
pub mod metrics;
pub mod ratelimit;
pub mod snapshot;
pub mod sources;
pub mod storage;
pub mod topics;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::error::SnapshotError;
pub use crate::snapshot::{SnapshotService, MIN_AVAILABLE_SOURCES};
pub use crate::types::{SentimentSnapshot, SourceId};
