//! HTTP handlers for the pipeline control surface and per-business
//! verification views.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::fusion::{SourceVerdict, VerdictConflict};
use crate::metrics::collect_metrics;
use crate::models::{ConfidenceLevel, HasWebsiteVerdict};
use crate::orchestrator::{PipelineController, SettingsPatch};

/// Shared application state
pub struct AppState {
    pub db: PgPool,
    pub controller: Arc<PipelineController>,
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// GET /api/v1/pipeline/status
pub async fn pipeline_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.status())
}

/// POST /api/v1/pipeline/start
///
/// Optional body: a settings patch applied before the loop starts.
pub async fn pipeline_start(
    State(state): State<Arc<AppState>>,
    patch: Option<Json<SettingsPatch>>,
) -> impl IntoResponse {
    let patch = patch.map(|Json(p)| p);
    Json(state.controller.start(patch).await)
}

/// POST /api/v1/pipeline/stop
pub async fn pipeline_stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.stop().await)
}

/// POST /api/v1/pipeline/run-once
pub async fn pipeline_run_once(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.run_once().await)
}

/// PUT /api/v1/pipeline/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> impl IntoResponse {
    let settings = state.controller.update_settings(&patch);
    Json(settings)
}

/// GET /api/v1/metrics
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let metrics = collect_metrics(&state.db).await?;
    Ok(Json(metrics))
}

/// What the export/API layer needs to know about one business.
#[derive(Debug, Serialize)]
pub struct VerificationSummary {
    pub business_id: Uuid,
    pub name: Option<String>,
    pub lead_score: Option<f64>,
    pub scored_at: Option<DateTime<Utc>>,
    pub confidence: ConfidenceLevel,
    pub has_website: HasWebsiteVerdict,
    pub conclusive_sources: usize,
    pub total_weight: f64,
    pub sources: Vec<SourceVerdict>,
    pub conflicts: Vec<VerdictConflict>,
}

/// GET /api/v1/businesses/:id/verification
pub async fn business_verification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (business, fused) = state.controller.verification_summary(id).await?;

    Ok(Json(VerificationSummary {
        business_id: business.id,
        name: business.name.clone(),
        lead_score: business.lead_score,
        scored_at: business.scored_at,
        confidence: fused.confidence,
        has_website: fused.has_website,
        conclusive_sources: fused.conclusive_sources,
        total_weight: fused.total_weight,
        sources: fused.latest,
        conflicts: fused.conflicts,
    }))
}

/// POST /api/v1/businesses/:id/rescore
pub async fn rescore_business(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (score, fused) = state.controller.rescore(id).await?;

    Ok(Json(json!({
        "business_id": id,
        "lead_score": score,
        "confidence": fused.confidence,
        "has_website": fused.has_website,
    })))
}
