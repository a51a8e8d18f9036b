use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::config::ConfigPresence;
use crate::error::SnapshotError;
use crate::metrics::Metrics;
use crate::snapshot::SnapshotService;
use crate::types::SourceId;

/// Suggested wait before retrying a degraded snapshot, seconds.
const RETRY_AFTER_SECS: u64 = 300;

static CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-snapshot-cache");

#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotService>,
    pub presence: Arc<ConfigPresence>,
}

pub fn create_router(state: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/sentiment", get(get_sentiment))
        .route("/api/sentiment/debug", get(get_debug))
        .with_state(state)
        .merge(metrics.router())
        .layer(CorsLayer::very_permissive())
}

async fn get_sentiment(State(state): State<AppState>) -> Response {
    match state.snapshots.get_snapshot().await {
        Ok((snapshot, outcome)) => {
            let headers = [
                (
                    header::CACHE_CONTROL,
                    cache_control_value(state.snapshots.cache_max_age_secs()),
                ),
                (
                    CACHE_STATUS_HEADER.clone(),
                    HeaderValue::from_static(outcome.header_value()),
                ),
            ];
            (StatusCode::OK, headers, Json(snapshot)).into_response()
        }
        Err(e) => degraded_response(e),
    }
}

async fn get_debug(State(state): State<AppState>) -> Json<ConfigPresence> {
    Json(state.presence.as_ref().clone())
}

fn cache_control_value(max_age_secs: u64) -> HeaderValue {
    HeaderValue::from_str(&format!("public, max-age={max_age_secs}"))
        .unwrap_or_else(|_| HeaderValue::from_static("public, max-age=900"))
}

#[derive(serde::Serialize)]
struct UnavailableSource {
    source_id: SourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

#[derive(serde::Serialize)]
struct DegradedBody {
    error: &'static str,
    sources_attempted: usize,
    sources_available: Vec<SourceId>,
    sources_unavailable: Vec<UnavailableSource>,
    retry_after: u64,
}

#[derive(serde::Serialize)]
struct InsufficientDataBody {
    error: &'static str,
    message: String,
    retry_after: u64,
}

/// Map a failed build to its user-visible failure mode. Degraded cases get
/// a structured body the dashboard can explain; storage trouble stays an
/// opaque 503.
fn degraded_response(err: SnapshotError) -> Response {
    match err {
        SnapshotError::InsufficientSources {
            attempted,
            available,
            unavailable,
        } => {
            let body = DegradedBody {
                error: "service degraded",
                sources_attempted: attempted,
                sources_available: available,
                sources_unavailable: unavailable
                    .into_iter()
                    .map(|s| UnavailableSource {
                        source_id: s.source_id,
                        error_message: s.error_message,
                    })
                    .collect(),
                retry_after: RETRY_AFTER_SECS,
            };
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
        SnapshotError::InsufficientData(message) => {
            let body = InsufficientDataBody {
                error: "insufficient data",
                message,
                retry_after: RETRY_AFTER_SECS,
            };
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
        SnapshotError::Storage(e) => {
            tracing::error!(error = %e, "snapshot failed on storage");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": "service temporarily unavailable" })),
            )
                .into_response()
        }
    }
}
