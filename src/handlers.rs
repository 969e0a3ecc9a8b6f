use crate::errors::AppError;
use crate::models::*;
use crate::pipeline::ProspectPipeline;
use crate::queue::ApprovalQueue;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ProspectPipeline>,
    pub queue: Arc<ApprovalQueue>,
    /// Expected `X-Reviewer-Token`; `None` leaves queue mutations open.
    pub reviewer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueListParams {
    pub record_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub reviewer: String,
}

/// Pipeline and queue routes. Rate limiting and tracing are layered on by the binary.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/pipeline/run", post(run_pipeline))
        .route("/api/v1/queue", get(list_queue))
        .route("/api/v1/queue/approve-all", post(approve_all))
        .route("/api/v1/queue/:id", get(get_queue_entry))
        .route("/api/v1/queue/:id/approve", post(approve_entry))
        .route("/api/v1/queue/:id/reject", post(reject_entry))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "prospect-pipeline",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/pipeline/run
///
/// Runs discovery through queueing for one target organization and returns
/// both the qualified and the itemized rejected prospects.
pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PipelineRequest>,
) -> Result<Json<PipelineOutcome>, AppError> {
    tracing::info!("POST /pipeline/run - target: {}", request.target_org);
    let outcome = state.pipeline.run(request).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/queue?record_type=lead
pub async fn list_queue(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueueListParams>,
) -> Result<Json<Vec<PendingUpdate>>, AppError> {
    let record_type = params
        .record_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_lowercase().parse::<RecordType>())
        .transpose()
        .map_err(AppError::BadRequest)?;

    let pending = state.queue.list_pending(record_type).await?;
    Ok(Json(pending))
}

/// GET /api/v1/queue/:id
pub async fn get_queue_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PendingUpdate>, AppError> {
    Ok(Json(state.queue.get(id).await?))
}

/// POST /api/v1/queue/:id/approve
pub async fn approve_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<PendingUpdate>, AppError> {
    validate_reviewer_token(&state, &headers)?;
    let reviewer = reviewer_name(&review)?;
    tracing::info!("POST /queue/{}/approve - reviewer: {}", id, reviewer);
    Ok(Json(state.queue.approve(id, reviewer).await?))
}

/// POST /api/v1/queue/:id/reject
pub async fn reject_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<PendingUpdate>, AppError> {
    validate_reviewer_token(&state, &headers)?;
    let reviewer = reviewer_name(&review)?;
    tracing::info!("POST /queue/{}/reject - reviewer: {}", id, reviewer);
    Ok(Json(state.queue.reject(id, reviewer).await?))
}

/// POST /api/v1/queue/approve-all
pub async fn approve_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<BulkApprovalReport>, AppError> {
    validate_reviewer_token(&state, &headers)?;
    let reviewer = reviewer_name(&review)?;
    tracing::info!("POST /queue/approve-all - reviewer: {}", reviewer);
    Ok(Json(state.queue.approve_all_pending(reviewer).await?))
}

fn reviewer_name(review: &ReviewRequest) -> Result<&str, AppError> {
    let reviewer = review.reviewer.trim();
    if reviewer.is_empty() {
        return Err(AppError::BadRequest("reviewer is required".to_string()));
    }
    Ok(reviewer)
}

/// Checks `X-Reviewer-Token` against the configured token, if any.
fn validate_reviewer_token(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(ref expected) = state.reviewer_token else {
        return Ok(());
    };

    let token = headers
        .get("X-Reviewer-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Reviewer-Token header".to_string()))?;

    if token != expected {
        tracing::warn!("Rejected queue mutation with invalid reviewer token");
        return Err(AppError::Unauthorized(
            "Invalid reviewer token".to_string(),
        ));
    }
    Ok(())
}
