use crate::config::{Config, ProviderConfig, ShareflowConfig};
use crate::documents::{
    check_document_bytes, DocumentSource, DocumentUploader, EncodedDocument,
};
use crate::models::{
    BusinessType, DocumentPurpose, ProfileModel, ProviderError, ProviderId, Role, SubmitAck,
    ValidationErrors,
};
use crate::normalize::{format_date_dmy, format_date_iso, is_valid_email, CanonicalProfile};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============ Payloads ============

/// One file slot in a multipart submission. Bytes are fetched from the
/// storage collaborator at transmission time, not at payload build time.
#[derive(Debug, Clone, Serialize)]
pub struct FileField {
    pub name: String,
    pub file_reference: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultipartPayload {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FileField>,
}

/// Provider wire payload produced by `build_payload`, ready to transmit.
#[derive(Debug, Clone)]
pub enum ProviderPayload {
    Json(Value),
    Multipart(MultipartPayload),
}

impl ProviderPayload {
    /// sha256 of the payload shape, logged with each attempt so operators
    /// can correlate retries without the audit log carrying PII.
    pub fn fingerprint(&self) -> String {
        let bytes = match self {
            ProviderPayload::Json(value) => serde_json::to_vec(value).unwrap_or_default(),
            ProviderPayload::Multipart(multipart) => {
                serde_json::to_vec(multipart).unwrap_or_default()
            }
        };
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }
}

// ============ Adapter Contract ============

/// Pure mapping + validation seam between the canonical profile and one
/// provider's wire format.
///
/// `validate` runs strictly before any network call; `submit` makes exactly
/// one outbound call to the provider and resolves every failure mode to a
/// [`ProviderError`] value. Nothing panics across this boundary.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn validate(&self, profile: &ProfileModel) -> Result<(), ValidationErrors>;

    fn build_payload(&self, profile: &CanonicalProfile)
        -> Result<ProviderPayload, ProviderError>;

    async fn submit(&self, payload: &ProviderPayload) -> Result<SubmitAck, ProviderError>;
}

// ============ Shared response handling ============

fn transport_error(provider: ProviderId, e: reqwest::Error) -> ProviderError {
    ProviderError::Transient(format!("{} request failed: {}", provider, e))
}

/// Classify a non-2xx response per the retry taxonomy: 5xx and
/// auth/rate-limit 4xx recover on their own timescale, every other 4xx is a
/// permanent rejection whose body is kept verbatim for audit.
async fn error_from_response(provider: ProviderId, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if status.is_server_error() || matches!(status.as_u16(), 401 | 403 | 408 | 429) {
        ProviderError::Transient(format!("{} returned status {}: {}", provider, status, body))
    } else {
        ProviderError::Permanent(format!("{} returned status {}: {}", provider, status, body))
    }
}

async fn parse_json_body(
    provider: ProviderId,
    response: reqwest::Response,
) -> Result<Value, ProviderError> {
    response.json().await.map_err(|e| {
        ProviderError::Permanent(format!("Failed to parse {} response: {}", provider, e))
    })
}

/// Pull the provider-assigned reference out of a response body, trying each
/// candidate key as a string then as a number.
fn extract_reference(
    provider: ProviderId,
    data: &Value,
    keys: &[&str],
) -> Result<String, ProviderError> {
    for key in keys {
        if let Some(id) = data.get(key).and_then(|v| v.as_str()) {
            return Ok(id.to_string());
        }
        if let Some(id) = data.get(key).and_then(|v| v.as_i64()) {
            return Ok(id.to_string());
        }
    }
    Err(ProviderError::Permanent(format!(
        "{} response missing reference field (tried {})",
        provider,
        keys.join(", ")
    )))
}

fn expect_json<'a>(
    provider: ProviderId,
    payload: &'a ProviderPayload,
) -> Result<&'a Value, ProviderError> {
    match payload {
        ProviderPayload::Json(value) => Ok(value),
        ProviderPayload::Multipart(_) => Err(ProviderError::Permanent(format!(
            "{} expects a JSON payload",
            provider
        ))),
    }
}

// ============ Veridoc (document-centric KYB) ============

/// Veridoc wants the whole dossier in one `POST /v2/kyb` call: entity,
/// representatives with enumerated roles, and document references.
/// snake_case fields, ISO dates, alpha-3 countries.
pub struct VeridocService {
    client: Client,
    base_url: String,
    token: String,
}

impl VeridocService {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            token: config.credential.clone(),
        }
    }
}

fn veridoc_entity_type(business_type: BusinessType) -> &'static str {
    match business_type {
        BusinessType::SoleProp => "sole_proprietorship",
        BusinessType::Llc => "limited_liability_company",
        BusinessType::Corporation => "corporation",
        BusinessType::Partnership => "partnership",
        BusinessType::Trust => "trust",
        BusinessType::Cooperative => "cooperative",
        BusinessType::Other => "other",
    }
}

#[async_trait]
impl ProviderAdapter for VeridocService {
    fn id(&self) -> ProviderId {
        ProviderId::Veridoc
    }

    fn validate(&self, profile: &ProfileModel) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new(self.id());

        if profile.legal_name.trim().is_empty() {
            errors.push("legal_name is required");
        }
        if profile.registered_address.line1.trim().is_empty() {
            errors.push("registered_address.line1 is required");
        }
        if profile.registered_address.country.trim().is_empty() {
            errors.push("registered_address.country is required");
        }
        if profile.associated_persons.is_empty() {
            errors.push("at least one representative is required");
        }
        if profile.documents.is_empty() {
            errors.push("at least one supporting document is required");
        }

        errors.into_result()
    }

    fn build_payload(
        &self,
        profile: &CanonicalProfile,
    ) -> Result<ProviderPayload, ProviderError> {
        let address = &profile.registered_address;

        let representatives: Vec<Value> = profile
            .persons
            .iter()
            .map(|person| {
                json!({
                    "first_name": person.first_name,
                    "last_name": person.last_name,
                    "date_of_birth": person.birth_date.map(format_date_iso),
                    "email": person.email,
                    // Veridoc takes phones as free text
                    "phone": person.phone_raw,
                    "title": person.title,
                    "roles": person.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
                })
            })
            .collect();

        let documents: Vec<Value> = profile
            .documents
            .iter()
            .map(|document| {
                json!({
                    "kind": document
                        .purposes
                        .iter()
                        .next()
                        .map(|p| p.as_str())
                        .unwrap_or("other"),
                    "file_reference": document.file_reference,
                    "description": document.description,
                })
            })
            .collect();

        Ok(ProviderPayload::Json(json!({
            "name": profile.legal_name,
            "trade_name": profile.trade_name,
            "type": veridoc_entity_type(profile.business_type),
            "description": profile.description,
            "registration_number": profile.registration_number,
            "registered_at": profile.incorporation_date.map(format_date_iso),
            "industry_code": profile.industry_code,
            "website": profile.website,
            "registration_address": {
                "line1": address.line1,
                "line2": address.line2,
                "city": address.city,
                "state": address.subdivision,
                "postal_code": address.postal_code,
                "country": address.country_alpha3,
            },
            "representatives": representatives,
            "documents": documents,
        })))
    }

    async fn submit(&self, payload: &ProviderPayload) -> Result<SubmitAck, ProviderError> {
        let body = expect_json(self.id(), payload)?;
        let url = format!("{}/v2/kyb", self.base_url);

        tracing::info!("Submitting KYB dossier to Veridoc");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(self.id(), e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.id(), response).await);
        }

        let data = parse_json_body(self.id(), response).await?;
        let reference = extract_reference(self.id(), &data, &["id", "entity_id"])?;

        tracing::info!("Veridoc accepted submission: {}", reference);
        Ok(SubmitAck {
            reference,
            hosted_url: None,
            needs_documents: false,
            raw: data,
        })
    }
}

// ============ Identra (identity-graph KYB) ============

/// Identra splits submission in two: `POST /v1/identities/business` creates
/// the identity, then documents go up against the returned id with
/// `PUT /v1/identities/{id}/documents`. camelCase fields, decomposed
/// phones, alpha-2 countries.
pub struct IdentraService {
    client: Client,
    base_url: String,
    token: String,
}

impl IdentraService {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            token: config.credential.clone(),
        }
    }
}

fn identra_business_type(business_type: BusinessType) -> &'static str {
    match business_type {
        BusinessType::SoleProp => "soleProprietorship",
        BusinessType::Llc => "limitedLiabilityCompany",
        BusinessType::Corporation => "corporation",
        BusinessType::Partnership => "partnership",
        BusinessType::Trust => "trust",
        BusinessType::Cooperative => "cooperative",
        BusinessType::Other => "other",
    }
}

#[async_trait]
impl ProviderAdapter for IdentraService {
    fn id(&self) -> ProviderId {
        ProviderId::Identra
    }

    fn validate(&self, profile: &ProfileModel) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new(self.id());

        match profile.email.as_deref() {
            None => errors.push("email is required"),
            Some(email) if !is_valid_email(email) => {
                errors.push(format!("email '{}' is not a valid address", email))
            }
            _ => {}
        }
        if profile.tax_id.as_deref().map_or(true, |t| t.trim().is_empty()) {
            errors.push("tax_id is required");
        }
        if profile.registered_address.country.trim().is_empty() {
            errors.push("registered_address.country is required");
        }

        let mut has_ubo = false;
        for (index, person) in profile.associated_persons.iter().enumerate() {
            if person.has_ownership || person.has_control {
                has_ubo = true;
            }
            if let Some(pct) = person.ownership_percentage {
                if !(0.0..=100.0).contains(&pct) {
                    errors.push(format!(
                        "associated_persons[{}].ownership_percentage must be between 0 and 100",
                        index
                    ));
                }
            }
        }
        if !has_ubo {
            errors.push("at least one person with ownership or control is required");
        }

        errors.into_result()
    }

    fn build_payload(
        &self,
        profile: &CanonicalProfile,
    ) -> Result<ProviderPayload, ProviderError> {
        let address = &profile.registered_address;

        let owners: Vec<Value> = profile
            .persons
            .iter()
            .filter(|p| p.has_role(Role::Owner) || p.has_role(Role::Controller))
            .map(|person| {
                json!({
                    "firstName": person.first_name,
                    "lastName": person.last_name,
                    "dateOfBirth": person.birth_date.map(format_date_iso),
                    "email": person.email,
                    "phone": person.phone.as_ref().map(|parts| json!({
                        "callingCode": parts.calling_code,
                        "number": parts.national_number,
                    })),
                    "nationality": person.nationality_alpha2,
                    "ownershipPercentage": person.ownership_percentage,
                    "roles": person.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
                })
            })
            .collect();

        Ok(ProviderPayload::Json(json!({
            "legalName": profile.legal_name,
            "email": profile.email,
            "taxId": profile.tax_id,
            "businessType": identra_business_type(profile.business_type),
            "incorporationDate": profile.incorporation_date.map(format_date_iso),
            "website": profile.website,
            "address": {
                "streetLine1": address.line1,
                "streetLine2": address.line2,
                "city": address.city,
                "region": address.subdivision,
                "postalCode": address.postal_code,
                "country": address.country_alpha2,
            },
            "phone": profile.phone.as_ref().map(|parts| json!({
                "callingCode": parts.calling_code,
                "number": parts.national_number,
            })),
            "ultimateBeneficialOwners": owners,
        })))
    }

    async fn submit(&self, payload: &ProviderPayload) -> Result<SubmitAck, ProviderError> {
        let body = expect_json(self.id(), payload)?;
        let url = format!("{}/v1/identities/business", self.base_url);

        tracing::info!("Creating business identity with Identra");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(self.id(), e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.id(), response).await);
        }

        let data = parse_json_body(self.id(), response).await?;
        let reference = extract_reference(self.id(), &data, &["id", "identityId"])?;

        tracing::info!("Identra created identity: {}", reference);
        Ok(SubmitAck {
            reference,
            hosted_url: None,
            // Identity creation is step one; documents follow in a second call
            needs_documents: true,
            raw: data,
        })
    }
}

#[async_trait]
impl DocumentUploader for IdentraService {
    async fn upload_documents(
        &self,
        identity_reference: &str,
        documents: Vec<EncodedDocument>,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/v1/identities/{}/documents", self.base_url, identity_reference);

        let body = json!({
            "documents": documents.iter().map(|d| json!({
                "fileName": d.file_name,
                "contentType": d.content_type,
                "content": d.content,
                "purpose": d.purpose.as_str(),
            })).collect::<Vec<_>>(),
        });

        tracing::info!(
            "Uploading {} document(s) to Identra identity {}",
            documents.len(),
            identity_reference
        );

        let response = self
            .client
            .put(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::Identra, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(ProviderId::Identra, response).await);
        }

        Ok(())
    }
}

// ============ Bizlayer (simple-business KYC) ============

/// Bizlayer registers the business itself in one `PUT /v1/businesses` call.
/// PascalCase fields, day-first dates, and a minimum street length its API
/// rejects server-side; we reject it client-side first.
pub struct BizlayerService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BizlayerService {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.credential.clone(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for BizlayerService {
    fn id(&self) -> ProviderId {
        ProviderId::Bizlayer
    }

    fn validate(&self, profile: &ProfileModel) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new(self.id());

        if profile.legal_name.trim().is_empty() {
            errors.push("legal_name is required");
        }
        if profile
            .registration_number
            .as_deref()
            .map_or(true, |r| r.trim().is_empty())
        {
            errors.push("registration_number is required");
        }
        if profile.incorporation_date.is_none() {
            errors.push("incorporation_date is required");
        }
        if profile.registered_address.line1.trim().len() < 2 {
            errors.push("registered_address.line1 must be at least 2 characters");
        }
        if profile.registered_address.country.trim().is_empty() {
            errors.push("registered_address.country is required");
        }

        errors.into_result()
    }

    fn build_payload(
        &self,
        profile: &CanonicalProfile,
    ) -> Result<ProviderPayload, ProviderError> {
        let address = &profile.registered_address;

        Ok(ProviderPayload::Json(json!({
            "RegisteredName": profile.legal_name,
            "TradingName": profile.trade_name,
            "RegistrationNumber": profile.registration_number,
            "TaxNumber": profile.tax_id,
            // Bizlayer takes our business-type vocabulary as-is
            "BusinessType": profile.business_type.as_str(),
            "IncorporationDate": profile.incorporation_date.map(format_date_dmy),
            "Website": profile.website,
            "RegisteredAddress": {
                "Street": address.line1,
                "Unit": address.line2,
                "City": address.city,
                "Province": address.subdivision,
                "PostalCode": address.postal_code,
                "Country": address.country_alpha2,
            },
        })))
    }

    async fn submit(&self, payload: &ProviderPayload) -> Result<SubmitAck, ProviderError> {
        let body = expect_json(self.id(), payload)?;
        let url = format!("{}/v1/businesses", self.base_url);

        tracing::info!("Registering business with Bizlayer");

        let response = self
            .client
            .put(&url)
            .header("X-Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(self.id(), e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.id(), response).await);
        }

        let data = parse_json_body(self.id(), response).await?;
        let reference = extract_reference(self.id(), &data, &["BusinessId", "Id", "id"])?;
        let hosted_url = data
            .get("HostedVerificationUrl")
            .and_then(|v| v.as_str())
            .map(String::from);

        tracing::info!("Bizlayer accepted submission: {}", reference);
        Ok(SubmitAck {
            reference,
            hosted_url,
            needs_documents: false,
            raw: data,
        })
    }
}

// ============ Shareflow (multipart KYC) ============

/// Shareflow shares the applicant's identity documents with its vendor
/// network in one multipart call. Basic auth with merchant credentials;
/// file bytes go inline, so the pre-transmission size/format checks run
/// here rather than in a follow-up task.
pub struct ShareflowService {
    client: Client,
    base_url: String,
    merchant_id: String,
    merchant_key: String,
    source: Arc<dyn DocumentSource>,
}

impl ShareflowService {
    pub fn new(
        config: &ShareflowConfig,
        client: Client,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            merchant_id: config.merchant_id.clone(),
            merchant_key: config.merchant_key.clone(),
            source,
        }
    }

    fn issuer_country(profile: &CanonicalProfile) -> String {
        profile
            .persons
            .first()
            .and_then(|p| p.nationality_alpha2.clone())
            .unwrap_or_else(|| profile.registered_address.country_alpha2.clone())
    }
}

fn find_document<'a>(
    profile: &'a CanonicalProfile,
    purpose: DocumentPurpose,
) -> Option<&'a crate::models::Document> {
    profile.documents.iter().find(|d| d.has_purpose(purpose))
}

#[async_trait]
impl ProviderAdapter for ShareflowService {
    fn id(&self) -> ProviderId {
        ProviderId::Shareflow
    }

    fn validate(&self, profile: &ProfileModel) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new(self.id());

        if profile.reference_id.trim().is_empty() {
            errors.push("reference_id is required");
        }
        if profile.associated_persons.is_empty() {
            errors.push("an applicant person is required");
        } else {
            let applicant = &profile.associated_persons[0];
            if applicant
                .nationality
                .as_deref()
                .map_or(true, |n| n.trim().is_empty())
                && profile.registered_address.country.trim().is_empty()
            {
                errors.push("applicant nationality or registered country is required");
            }
        }
        if !profile
            .documents
            .iter()
            .any(|d| d.has_purpose(DocumentPurpose::IdFront))
        {
            errors.push("an id_front document is required");
        }
        if !profile
            .documents
            .iter()
            .any(|d| d.has_purpose(DocumentPurpose::Selfie))
        {
            errors.push("a selfie document is required");
        }

        errors.into_result()
    }

    fn build_payload(
        &self,
        profile: &CanonicalProfile,
    ) -> Result<ProviderPayload, ProviderError> {
        // Validation guarantees these documents exist
        let id_front = find_document(profile, DocumentPurpose::IdFront).ok_or_else(|| {
            ProviderError::Document("id_front document missing after validation".to_string())
        })?;
        let selfie = find_document(profile, DocumentPurpose::Selfie).ok_or_else(|| {
            ProviderError::Document("selfie document missing after validation".to_string())
        })?;

        let mut fields = vec![
            ("userId".to_string(), profile.reference_id.clone()),
            (
                "idDocIssuerCountry".to_string(),
                Self::issuer_country(profile),
            ),
        ];
        if let Some(applicant) = profile.persons.first() {
            fields.push(("applicantName".to_string(), applicant.full_name()));
        }

        let mut files = vec![
            FileField {
                name: "idDocFrontSide".to_string(),
                file_reference: id_front.file_reference.clone(),
                required: true,
            },
            FileField {
                name: "selfie".to_string(),
                file_reference: selfie.file_reference.clone(),
                required: true,
            },
        ];
        if let Some(id_back) = find_document(profile, DocumentPurpose::IdBack) {
            files.push(FileField {
                name: "idDocBackSide".to_string(),
                file_reference: id_back.file_reference.clone(),
                required: false,
            });
        }

        Ok(ProviderPayload::Multipart(MultipartPayload {
            fields,
            files,
        }))
    }

    async fn submit(&self, payload: &ProviderPayload) -> Result<SubmitAck, ProviderError> {
        let multipart = match payload {
            ProviderPayload::Multipart(multipart) => multipart,
            ProviderPayload::Json(_) => {
                return Err(ProviderError::Permanent(
                    "shareflow expects a multipart payload".to_string(),
                ))
            }
        };

        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &multipart.fields {
            form = form.text(name.clone(), value.clone());
        }

        for file in &multipart.files {
            let bytes = match self.source.fetch(&file.file_reference).await {
                Ok(bytes) => bytes,
                Err(e) if file.required => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping optional file '{}': {}", file.name, e);
                    continue;
                }
            };

            let content_type = match check_document_bytes(&file.file_reference, &bytes) {
                Ok(content_type) => content_type,
                Err(e) if file.required => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping optional file '{}': {}", file.name, e);
                    continue;
                }
            };

            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(file.name.clone())
                .mime_str(content_type)
                .map_err(|e| {
                    ProviderError::Document(format!(
                        "could not attach '{}': {}",
                        file.name, e
                    ))
                })?;
            form = form.part(file.name.clone(), part);
        }

        let url = format!("{}/kyc/share/third-vendor", self.base_url);

        tracing::info!("Sharing KYC documents with Shareflow");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.merchant_id, Some(&self.merchant_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(self.id(), e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.id(), response).await);
        }

        let data = parse_json_body(self.id(), response).await?;
        let reference = extract_reference(self.id(), &data, &["applicantId", "shareToken", "id"])?;

        tracing::info!("Shareflow accepted submission: {}", reference);
        Ok(SubmitAck {
            reference,
            hosted_url: None,
            needs_documents: false,
            raw: data,
        })
    }
}

// ============ Registry ============

/// All configured adapters keyed by provider, plus the upload seams for
/// providers whose contract is identity-then-documents.
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<ProviderId, Arc<dyn ProviderAdapter>>,
    uploaders: BTreeMap<ProviderId, Arc<dyn DocumentUploader>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn register_uploader(
        &mut self,
        provider: ProviderId,
        uploader: Arc<dyn DocumentUploader>,
    ) {
        self.uploaders.insert(provider, uploader);
    }

    pub fn adapter(&self, provider: ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn uploader(&self, provider: ProviderId) -> Option<Arc<dyn DocumentUploader>> {
        self.uploaders.get(&provider).cloned()
    }

    pub fn configured(&self) -> Vec<ProviderId> {
        self.adapters.keys().copied().collect()
    }
}

/// Wire up every provider adapter from configuration. One shared reqwest
/// client; each adapter gets its own base URL and credential.
pub fn build_registry(
    config: &Config,
    client: Client,
    source: Arc<dyn DocumentSource>,
) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry.register(Arc::new(VeridocService::new(&config.veridoc, client.clone())));

    let identra = Arc::new(IdentraService::new(&config.identra, client.clone()));
    registry.register(identra.clone());
    registry.register_uploader(ProviderId::Identra, identra);

    registry.register(Arc::new(BizlayerService::new(
        &config.bizlayer,
        client.clone(),
    )));

    registry.register(Arc::new(ShareflowService::new(
        &config.shareflow,
        client,
        source,
    )));

    registry
}
