use std::sync::Arc;

use serde::Deserialize;
use shuttle_axum::axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::export::EXPORT_FILE_NAME;
use crate::ingest::config::Registry;
use crate::ingest::types::{FeedSource, Snapshot, SourceFetcher};
use crate::ingest::{aggregate, fetcher::HttpFetcher};
use crate::sync::{GithubSync, PublishMode, PublishOutcome, SyncError, SyncTarget};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub sync_target: Option<SyncTarget>,
    pub github: GithubSync,
}

impl AppState {
    /// State backed by real HTTP fetching for the given registry.
    pub fn new(
        registry: Registry,
        sync_target: Option<SyncTarget>,
        github: GithubSync,
    ) -> anyhow::Result<Self> {
        let fetcher: HttpFetcher = registry.build_fetcher()?;
        Ok(Self {
            registry: Arc::new(registry),
            fetcher: Arc::new(fetcher),
            sync_target,
            github,
        })
    }

    async fn snapshot(&self) -> Snapshot {
        aggregate(
            &self.registry.enabled_sources(),
            self.fetcher.as_ref(),
            &self.registry.run_options(),
        )
        .await
    }
}

/// JSON error body with a short status message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    retryable: bool,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        let status = match &e {
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::Conflict { .. } => StatusCode::CONFLICT,
            SyncError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "retryable": self.retryable,
        });
        (self.status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/sources", get(list_sources))
        .route("/unified.json", get(download_unified))
        .route("/sync", post(sync_snapshot))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<FeedSource>> {
    Json(state.registry.enabled_sources())
}

async fn download_unified(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = state.snapshot().await;
    let payload = snapshot.to_json_pretty().map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("could not serialize snapshot: {e}"),
        retryable: false,
    })?;
    let disposition = format!("attachment; filename=\"{EXPORT_FILE_NAME}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        payload,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    mode: Option<String>,
}

async fn sync_snapshot(
    State(state): State<AppState>,
    Query(q): Query<SyncQuery>,
) -> Result<Json<PublishOutcome>, ApiError> {
    let mode: PublishMode = match q.mode.as_deref() {
        None => PublishMode::Upsert,
        Some(m) => m.parse().map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?,
    };
    let target = state
        .sync_target
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("sync target is not configured"))?;

    // Reject bad coordinates before spending time on fetching.
    target.validate_for(mode)?;

    let snapshot = state.snapshot().await;
    let outcome = state.github.publish(target, mode, &snapshot).await?;
    Ok(Json(outcome))
}
