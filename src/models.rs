use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

// ============ Provider Identity ============

/// Identifies one configured verification provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Document-centric KYB provider (`POST /v2/kyb`).
    Veridoc,
    /// Identity-graph KYB provider (`POST /v1/identities/business` + document upload).
    Identra,
    /// Simple-business KYC provider (`PUT /v1/businesses`).
    Bizlayer,
    /// Multipart document-sharing KYC provider (`POST /kyc/share/third-vendor`).
    Shareflow,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Veridoc => "veridoc",
            ProviderId::Identra => "identra",
            ProviderId::Bizlayer => "bizlayer",
            ProviderId::Shareflow => "shareflow",
        }
    }

    /// Parse a provider name as it appears in webhook payloads and DB rows.
    pub fn parse(value: &str) -> Option<ProviderId> {
        match value.trim().to_ascii_lowercase().as_str() {
            "veridoc" => Some(ProviderId::Veridoc),
            "identra" => Some(ProviderId::Identra),
            "bizlayer" => Some(ProviderId::Bizlayer),
            "shareflow" => Some(ProviderId::Shareflow),
            _ => None,
        }
    }

    pub fn all() -> [ProviderId; 4] {
        [
            ProviderId::Veridoc,
            ProviderId::Identra,
            ProviderId::Bizlayer,
            ProviderId::Shareflow,
        ]
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Canonical Profile ============

/// Legal structure of the business being onboarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    SoleProp,
    Llc,
    Corporation,
    Partnership,
    Trust,
    Cooperative,
    Other,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::SoleProp => "sole_prop",
            BusinessType::Llc => "llc",
            BusinessType::Corporation => "corporation",
            BusinessType::Partnership => "partnership",
            BusinessType::Trust => "trust",
            BusinessType::Cooperative => "cooperative",
            BusinessType::Other => "other",
        }
    }
}

/// Role of an associated person, derived from the four boolean flags on
/// [`Person`]. See `normalize::derive_roles` for the single derivation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Controller,
    Signer,
    Director,
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Controller => "controller",
            Role::Signer => "signer",
            Role::Director => "director",
            Role::Other => "other",
        }
    }
}

/// What a document is meant to evidence. A single file can serve several
/// purposes (a passport photo page is both an id_front and a proof of
/// nationality for some providers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPurpose {
    IdFront,
    IdBack,
    Selfie,
    IncorporationCertificate,
    ProofOfAddress,
    TaxDocument,
    Other,
}

impl DocumentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentPurpose::IdFront => "id_front",
            DocumentPurpose::IdBack => "id_back",
            DocumentPurpose::Selfie => "selfie",
            DocumentPurpose::IncorporationCertificate => "incorporation_certificate",
            DocumentPurpose::ProofOfAddress => "proof_of_address",
            DocumentPurpose::TaxDocument => "tax_document",
            DocumentPurpose::Other => "other",
        }
    }
}

/// Postal address as collected by the intake form.
///
/// The canonical model stores the country as whatever ISO code the form
/// produced (alpha-2 or alpha-3); adapters convert to the width their
/// provider mandates. Missing optional parts render as empty strings on the
/// wire, never as errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub subdivision: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// ISO country code, alpha-2 or alpha-3.
    pub country: String,
}

/// Pre-decomposed business phone number supplied by intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessPhone {
    pub calling_code: String,
    pub number: String,
}

/// A natural person associated with the business (owner, director, signer...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-text phone as typed into the form; decomposed during
    /// normalization for providers that want calling code + national number.
    #[serde(default)]
    pub phone: Option<String>,
    /// ISO alpha-2 nationality.
    #[serde(default)]
    pub nationality: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub residential_address: Option<Address>,
    /// 0-100.
    #[serde(default)]
    pub ownership_percentage: Option<f64>,
    #[serde(default)]
    pub has_ownership: bool,
    #[serde(default)]
    pub has_control: bool,
    #[serde(default)]
    pub is_signer: bool,
    #[serde(default)]
    pub is_director: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub relationship_established_at: Option<NaiveDate>,
}

/// A document reference resolved by the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub purposes: BTreeSet<DocumentPurpose>,
    /// Opaque handle (URL or byte handle) understood by the storage
    /// collaborator; this layer never interprets it.
    pub file_reference: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Document {
    pub fn has_purpose(&self, purpose: DocumentPurpose) -> bool {
        self.purposes.contains(&purpose)
    }
}

/// Canonical, provider-agnostic snapshot of one submission attempt.
///
/// Built by the form/session-persistence collaborator once intake completes.
/// Immutable from this layer's point of view; tasks share it read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileModel {
    pub legal_name: String,
    #[serde(default)]
    pub trade_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub business_type: BusinessType,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub incorporation_date: Option<NaiveDate>,
    #[serde(default)]
    pub industry_code: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub statement_descriptor: Option<String>,
    pub registered_address: Address,
    #[serde(default)]
    pub physical_address: Option<Address>,
    #[serde(default)]
    pub phone: Option<BusinessPhone>,
    #[serde(default)]
    pub associated_persons: Vec<Person>,
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Caller-supplied idempotency key (e.g. intake session id).
    pub reference_id: String,
}

// ============ Failure Taxonomy ============

/// Structured validation failure for one provider. Always terminal: a
/// caller-input defect, never retried.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrors {
    pub provider: ProviderId,
    pub errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validation failed for {}: {}",
            self.provider,
            self.errors.join("; ")
        )
    }
}

/// Failure taxonomy for provider submissions.
///
/// Adapters resolve every failure mode to one of these values; nothing
/// panics or escapes the adapter boundary. The retry unit keys its policy
/// off the variant.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Missing/malformed required field for a specific provider. Terminal.
    Validation(ValidationErrors),
    /// Timeout, connection failure, 5xx, or rate-limit/auth 4xx. Retryable.
    Transient(String),
    /// Any other 4xx; message captured verbatim for audit. Terminal.
    Permanent(String),
    /// Oversized, wrong format, or missing file. Terminal for the affected
    /// document only.
    Document(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Validation(v) => write!(f, "{}", v),
            ProviderError::Transient(msg) => write!(f, "transient provider error: {}", msg),
            ProviderError::Permanent(msg) => write!(f, "permanent provider error: {}", msg),
            ProviderError::Document(msg) => write!(f, "document error: {}", msg),
        }
    }
}

// ============ Outcomes & Reports ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Normalized result of one provider submission attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub provider: ProviderId,
    pub status: OutcomeStatus,
    pub provider_reference: Option<String>,
    pub error_message: Option<String>,
    /// Raw provider response body, retained for operator-facing audit only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<Value>,
}

impl Outcome {
    pub fn success(provider: ProviderId, reference: String, raw: Option<Value>) -> Self {
        Self {
            provider,
            status: OutcomeStatus::Success,
            provider_reference: Some(reference),
            error_message: None,
            raw_response: raw,
        }
    }

    pub fn failed(provider: ProviderId, message: impl Into<String>) -> Self {
        Self {
            provider,
            status: OutcomeStatus::Failed,
            provider_reference: None,
            error_message: Some(message.into()),
            raw_response: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Acknowledgement returned by an adapter on successful transmission.
#[derive(Debug, Clone)]
pub struct SubmitAck {
    /// Opaque id assigned by the provider.
    pub reference: String,
    /// Hosted verification flow URL, for providers that offer one.
    pub hosted_url: Option<String>,
    /// True when the reference is an identity that still needs documents
    /// uploaded in a second call.
    pub needs_documents: bool,
    pub raw: Value,
}

/// Aggregate result of fanning one profile out to a set of providers.
///
/// Always contains exactly one outcome per requested provider; partial
/// success is an expected, valid end state.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub profile_id: String,
    pub outcomes: BTreeMap<ProviderId, Outcome>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionReport {
    /// True when every requested provider rejected the profile. The caller
    /// treats this as a hard failure of the overall submission.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.values().all(|o| !o.is_success())
    }
}

// ============ Endorsements ============

/// Customer-facing verification status with one provider.
///
/// Closed enum: provider-reported labels pass through
/// [`EndorsementStatus::normalize`] before storage, never verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndorsementStatus {
    NotStarted,
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl EndorsementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndorsementStatus::NotStarted => "not_started",
            EndorsementStatus::Pending => "pending",
            EndorsementStatus::UnderReview => "under_review",
            EndorsementStatus::Approved => "approved",
            EndorsementStatus::Rejected => "rejected",
        }
    }

    /// Map a provider-reported status label onto the closed enum.
    ///
    /// This is the only place label fallbacks live. Legacy review-ish labels
    /// ("submitted", "received", ...) and anything unrecognized collapse to
    /// `UnderReview`: accepting a submission does not imply decisioning, and
    /// an unknown label must never surface to the customer verbatim.
    pub fn normalize(label: &str) -> EndorsementStatus {
        match label.trim().to_ascii_lowercase().as_str() {
            "not_started" => EndorsementStatus::NotStarted,
            "pending" => EndorsementStatus::Pending,
            "under_review" | "in_review" | "submitted" | "received" | "processing"
            | "screening" => EndorsementStatus::UnderReview,
            "approved" | "verified" | "passed" => EndorsementStatus::Approved,
            "rejected" | "declined" | "denied" => EndorsementStatus::Rejected,
            _ => EndorsementStatus::UnderReview,
        }
    }
}

impl fmt::Display for EndorsementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted status for one (customer, provider) pair; the only externally
/// visible state this layer owns.
#[derive(Debug, Clone, Serialize)]
pub struct Endorsement {
    pub customer_id: Uuid,
    pub provider: ProviderId,
    pub status: EndorsementStatus,
    pub hosted_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_submitted_label_normalizes_to_under_review() {
        assert_eq!(
            EndorsementStatus::normalize("submitted"),
            EndorsementStatus::UnderReview
        );
        assert_eq!(
            EndorsementStatus::normalize("SUBMITTED"),
            EndorsementStatus::UnderReview
        );
    }

    #[test]
    fn unknown_labels_never_stored_verbatim() {
        assert_eq!(
            EndorsementStatus::normalize("vendor-status-37"),
            EndorsementStatus::UnderReview
        );
        assert_eq!(
            EndorsementStatus::normalize(""),
            EndorsementStatus::UnderReview
        );
    }

    #[test]
    fn terminal_labels_map_to_terminal_states() {
        assert_eq!(
            EndorsementStatus::normalize("approved"),
            EndorsementStatus::Approved
        );
        assert_eq!(
            EndorsementStatus::normalize("declined"),
            EndorsementStatus::Rejected
        );
    }

    #[test]
    fn provider_parse_roundtrips() {
        for provider in ProviderId::all() {
            assert_eq!(ProviderId::parse(provider.as_str()), Some(provider));
        }
        assert_eq!(ProviderId::parse("acme"), None);
    }
}
