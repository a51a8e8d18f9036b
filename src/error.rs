//! error.rs — cycle-level failure taxonomy.
//!
//! Per-source failures never become errors at all (they travel as
//! `DataSourceStatus`); this enum covers the failures that abort a whole
//! snapshot build and must pick a user-visible failure mode at the boundary.

use thiserror::Error;

use crate::types::{DataSourceStatus, SourceId};

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Fewer than 2 sources reported available this cycle.
    #[error("fewer than 2 sources available ({attempted} attempted)")]
    InsufficientSources {
        attempted: usize,
        available: Vec<SourceId>,
        unavailable: Vec<DataSourceStatus>,
    },

    /// Aggregation ran but produced nothing to score.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Storage I/O failed; losing analyzed posts silently is worse than
    /// failing visibly, so this propagates.
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SnapshotError {
    /// True for the degraded-service cases that get the structured 503 body.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            SnapshotError::InsufficientSources { .. } | SnapshotError::InsufficientData(_)
        )
    }
}
