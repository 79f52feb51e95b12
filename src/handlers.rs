use crate::config::Config;
use crate::endorsements::EndorsementStore;
use crate::errors::AppError;
use crate::models::{Endorsement, ProfileModel, ProviderId, SubmissionReport};
use crate::submission::SubmissionOrchestrator;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Endorsement status store, the layer's only externally visible state.
    pub store: Arc<dyn EndorsementStore>,
    /// Fan-out orchestrator for profile submissions.
    pub orchestrator: Arc<SubmissionOrchestrator>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-kyb-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /api/v1/submissions
///
/// Accepts a finalized profile from the intake subsystem and fans it out to
/// the requested providers. The response is always the full submission
/// report: partial failure is a valid end state, reported per provider, and
/// never an HTTP error.
///
/// Re-posting the same `reference_id` is a re-submission by design; callers
/// wanting true idempotency check the endorsements endpoint first.
#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub customer_id: Uuid,
    pub providers: Vec<ProviderId>,
    pub profile: ProfileModel,
}

pub async fn submit_profile(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmissionRequest>,
) -> Result<Json<SubmissionReport>, AppError> {
    if request.providers.is_empty() {
        return Err(AppError::BadRequest(
            "At least one provider required".to_string(),
        ));
    }
    if request.profile.reference_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "profile.reference_id is required".to_string(),
        ));
    }

    tracing::info!(
        customer = %request.customer_id,
        reference = %request.profile.reference_id,
        providers = ?request.providers,
        "POST /submissions"
    );

    let report = state
        .orchestrator
        .submit(
            request.customer_id,
            Arc::new(request.profile),
            &request.providers,
        )
        .await;

    if report.all_failed() {
        tracing::warn!(
            customer = %request.customer_id,
            reference = %report.profile_id,
            "Submission failed for every requested provider"
        );
    }

    Ok(Json(report))
}

/// GET /api/v1/endorsements/:customer_id
///
/// Customer-facing verification status is always derived from the store,
/// never from raw provider responses.
pub async fn list_endorsements(
    State(state): State<Arc<AppState>>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Vec<Endorsement>>, AppError> {
    tracing::info!("GET /endorsements/{}", customer_id);

    let endorsements = state.store.list(customer_id).await?;
    Ok(Json(endorsements))
}

/// GET /api/v1/endorsements/:customer_id/:provider
pub async fn get_endorsement(
    State(state): State<Arc<AppState>>,
    Path((customer_id, provider)): Path<(Uuid, String)>,
) -> Result<Json<Endorsement>, AppError> {
    let provider = ProviderId::parse(&provider)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown provider '{}'", provider)))?;

    let endorsement = state
        .store
        .get(customer_id, provider)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No endorsement for customer {} with {}",
                customer_id, provider
            ))
        })?;

    Ok(Json(endorsement))
}
