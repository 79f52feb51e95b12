use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Provider status webhook body - can be a single event or an array
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StatusWebhookPayload {
    Single(StatusEvent),
    Batch(Vec<StatusEvent>),
}

impl StatusWebhookPayload {
    /// Convert to a vec of events for uniform processing
    pub fn into_events(self) -> Vec<StatusEvent> {
        match self {
            StatusWebhookPayload::Single(event) => vec![event],
            StatusWebhookPayload::Batch(events) => events,
        }
    }
}

/// One out-of-band status update from a provider (webhook or poll relay).
///
/// `status` is the provider's own label; it is normalized through the closed
/// endorsement status enum before storage, never written verbatim.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusEvent {
    pub customer_id: Uuid,

    /// Provider name ("veridoc", "identra", ...)
    pub provider: String,

    /// Provider-reported status label (e.g. "approved", "submitted")
    pub status: String,

    /// Hosted verification flow URL, when the provider offers one
    #[serde(default)]
    pub hosted_url: Option<String>,

    /// Provider-side reference the update pertains to
    #[serde(default)]
    pub provider_reference: Option<String>,

    /// Raw data for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusWebhookResponse {
    pub status: String,
    pub received: usize,
    pub processed: usize,
    pub duplicates: usize,
    pub failed: usize,
}
