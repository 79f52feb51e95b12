use crate::endorsements::EndorsementStore;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{EndorsementStatus, ProviderId};
use crate::webhook_models::{StatusEvent, StatusWebhookPayload, StatusWebhookResponse};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

/// Provider Status Webhook Handler
///
/// Receives out-of-band status updates from verification providers (or the
/// relay that polls them): approvals, rejections, and legacy review labels.
/// Validates the webhook secret, normalizes each label through the closed
/// status enum, and upserts the endorsement row.
///
/// Expected payload: single event object OR array of events
/// Authentication: X-Webhook-Token header must match WEBHOOK_SECRET env var
pub async fn provider_status_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<StatusWebhookPayload>,
) -> Result<(StatusCode, Json<StatusWebhookResponse>), AppError> {
    tracing::info!("Received provider status webhook");

    // 1. Validate webhook secret (if configured)
    validate_webhook_secret(&state, &headers)?;

    // 2. Convert payload to vec of events (handles both single and batch)
    let events = payload.into_events();
    let total_received = events.len();
    tracing::info!("Processing {} status event(s)", total_received);

    let mut processed = 0;
    let mut duplicates = 0;
    let mut failed = 0;

    // 3. Process each event; one bad event never blocks the rest
    for event in events {
        match process_status_event(state.store.as_ref(), event).await {
            Ok(ProcessResult::Processed) => {
                processed += 1;
            }
            Ok(ProcessResult::Duplicate) => {
                duplicates += 1;
                tracing::debug!("Skipped duplicate status event");
            }
            Err(e) => {
                failed += 1;
                tracing::error!("Failed to process status event: {}", e);
            }
        }
    }

    tracing::info!(
        "Status webhook complete: {} received, {} processed, {} duplicates, {} failed",
        total_received,
        processed,
        duplicates,
        failed
    );

    Ok((
        StatusCode::OK,
        Json(StatusWebhookResponse {
            status: "received".to_string(),
            received: total_received,
            processed,
            duplicates,
            failed,
        }),
    ))
}

/// Validate webhook secret from X-Webhook-Token header
fn validate_webhook_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    // If no secret is configured, skip validation (warn was already logged at startup)
    let Some(ref expected_secret) = state.config.webhook_secret else {
        return Ok(());
    };

    // Extract token from header
    let token = headers
        .get("X-Webhook-Token")
        .or_else(|| headers.get("x-webhook-token"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Webhook-Token header".to_string()))?;

    // Constant-time comparison to prevent timing attacks
    if !constant_time_compare(token, expected_secret) {
        tracing::warn!("Invalid webhook token received");
        return Err(AppError::Unauthorized("Invalid webhook token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison (basic implementation)
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Processed,
    Duplicate,
}

/// Apply a single status event to the endorsement store.
///
/// Re-delivery of an already-stored status is reported as a duplicate;
/// writing the same terminal status twice leaves the row unchanged either
/// way, so providers may deliver at-least-once.
pub async fn process_status_event(
    store: &dyn EndorsementStore,
    event: StatusEvent,
) -> Result<ProcessResult, AppError> {
    let provider = ProviderId::parse(&event.provider).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown provider '{}' in status event", event.provider))
    })?;

    let status = EndorsementStatus::normalize(&event.status);
    tracing::debug!(
        customer = %event.customer_id,
        provider = %provider,
        label = %event.status,
        normalized = %status,
        "Applying status event"
    );

    if let Some(existing) = store.get(event.customer_id, provider).await? {
        let same_url = event.hosted_url.is_none() || event.hosted_url == existing.hosted_url;
        if existing.status == status && same_url {
            return Ok(ProcessResult::Duplicate);
        }
    }

    store
        .upsert(
            event.customer_id,
            provider,
            status,
            event.hosted_url.as_deref(),
        )
        .await?;

    Ok(ProcessResult::Processed)
}
