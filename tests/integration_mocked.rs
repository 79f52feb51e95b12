/// Integration tests with mocked provider APIs
/// Exercises the full fan-out workflow without hitting real external services
use chrono::NaiveDate;
use rust_kyb_api::config::{ProviderConfig, ShareflowConfig};
use rust_kyb_api::documents::{DocumentSource, StaticDocumentSource};
use rust_kyb_api::endorsements::{EndorsementStore, InMemoryEndorsementStore};
use rust_kyb_api::models::{
    Address, BusinessPhone, BusinessType, Document, DocumentPurpose, EndorsementStatus,
    OutcomeStatus, Person, ProfileModel, ProviderId,
};
use rust_kyb_api::providers::{
    BizlayerService, IdentraService, ProviderRegistry, ShareflowService, VeridocService,
};
use rust_kyb_api::submission::{RetryPolicy, SubmissionOrchestrator};
use rust_kyb_api::webhook_handler::{process_status_event, ProcessResult};
use rust_kyb_api::webhook_models::StatusEvent;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
const PDF: &[u8] = b"%PDF-1.7 test";

fn document_source() -> Arc<StaticDocumentSource> {
    Arc::new(
        StaticDocumentSource::new()
            .with_file("doc-front", JPEG.to_vec())
            .with_file("doc-selfie", JPEG.to_vec())
            .with_file("doc-cert", PDF.to_vec()),
    )
}

/// Registry with every adapter pointed at the mock server.
fn registry_for(base_url: &str, source: Arc<dyn DocumentSource>) -> ProviderRegistry {
    let client = reqwest::Client::new();
    let bearer = ProviderConfig {
        base_url: base_url.to_string(),
        credential: "test-token".to_string(),
    };

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(VeridocService::new(&bearer, client.clone())));

    let identra = Arc::new(IdentraService::new(&bearer, client.clone()));
    registry.register(identra.clone());
    registry.register_uploader(ProviderId::Identra, identra);

    registry.register(Arc::new(BizlayerService::new(
        &ProviderConfig {
            base_url: base_url.to_string(),
            credential: "test-api-key".to_string(),
        },
        client.clone(),
    )));

    registry.register(Arc::new(ShareflowService::new(
        &ShareflowConfig {
            base_url: base_url.to_string(),
            merchant_id: "merchant-1".to_string(),
            merchant_key: "merchant-secret".to_string(),
        },
        client,
        source,
    )));

    registry
}

/// Fast retry policy so retry tests do not sleep for real
fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: vec![Duration::from_millis(10)],
        attempt_timeout: Duration::from_secs(5),
    }
}

fn orchestrator_for(
    base_url: &str,
    store: Arc<InMemoryEndorsementStore>,
    source: Arc<StaticDocumentSource>,
) -> SubmissionOrchestrator {
    SubmissionOrchestrator::new(
        Arc::new(registry_for(base_url, source.clone())),
        store,
        source,
        fast_policy(),
    )
}

fn document(reference: &str, purpose: DocumentPurpose) -> Document {
    let mut purposes = BTreeSet::new();
    purposes.insert(purpose);
    Document {
        purposes,
        file_reference: reference.to_string(),
        description: None,
    }
}

fn sample_profile() -> ProfileModel {
    ProfileModel {
        legal_name: "Acme Holdings LLC".to_string(),
        trade_name: Some("Acme".to_string()),
        description: Some("Industrial anvil wholesale".to_string()),
        email: Some("compliance@acme.example".to_string()),
        business_type: BusinessType::Llc,
        tax_id: Some("83-1234567".to_string()),
        registration_number: Some("REG-12345".to_string()),
        incorporation_date: NaiveDate::from_ymd_opt(2024, 3, 5),
        industry_code: Some("4299".to_string()),
        website: Some("https://acme.example".to_string()),
        statement_descriptor: Some("ACME".to_string()),
        registered_address: Address {
            line1: "1 Market Street".to_string(),
            line2: Some("Suite 400".to_string()),
            city: Some("San Francisco".to_string()),
            subdivision: Some("CA".to_string()),
            postal_code: Some("94105".to_string()),
            country: "US".to_string(),
        },
        physical_address: None,
        phone: Some(BusinessPhone {
            calling_code: "1".to_string(),
            number: "4155550100".to_string(),
        }),
        associated_persons: vec![Person {
            first_name: "Jo".to_string(),
            last_name: "Doe".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1985, 6, 15),
            email: Some("jo@acme.example".to_string()),
            phone: Some("+12025550143".to_string()),
            nationality: Some("US".to_string()),
            tax_id: Some("123-45-6789".to_string()),
            residential_address: None,
            ownership_percentage: Some(40.0),
            has_ownership: true,
            has_control: false,
            is_signer: true,
            is_director: false,
            title: Some("Managing Member".to_string()),
            relationship_established_at: None,
        }],
        documents: vec![
            document("doc-front", DocumentPurpose::IdFront),
            document("doc-selfie", DocumentPurpose::Selfie),
            document("doc-cert", DocumentPurpose::IncorporationCertificate),
        ],
        reference_id: "session-123".to_string(),
    }
}

async fn mount_happy_mocks(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v2/kyb"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vd-1"})))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/identities/business"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "id-9"})))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/identities/id-9/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/businesses"))
        .and(header("X-Api-Key", "test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "BusinessId": "bz-7",
            "HostedVerificationUrl": "https://verify.bizlayer.example/bz-7"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/kyc/share/third-vendor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applicantId": "sf-3"})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn submit_fans_out_to_all_four_providers() {
    let server = MockServer::start().await;
    mount_happy_mocks(&server).await;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = orchestrator_for(&server.uri(), store.clone(), document_source());
    let customer = Uuid::new_v4();

    let report = orchestrator
        .submit(customer, Arc::new(sample_profile()), &ProviderId::all())
        .await;

    assert_eq!(report.outcomes.len(), 4);
    assert_eq!(report.profile_id, "session-123");
    for provider in ProviderId::all() {
        let outcome = &report.outcomes[&provider];
        assert_eq!(
            outcome.status,
            OutcomeStatus::Success,
            "{} should succeed: {:?}",
            provider,
            outcome.error_message
        );
    }
    assert_eq!(
        report.outcomes[&ProviderId::Veridoc].provider_reference.as_deref(),
        Some("vd-1")
    );
    assert_eq!(
        report.outcomes[&ProviderId::Bizlayer].provider_reference.as_deref(),
        Some("bz-7")
    );

    // Every provider transitioned to under_review on successful transmission
    let endorsements = store.list(customer).await.unwrap();
    assert_eq!(endorsements.len(), 4);
    for endorsement in &endorsements {
        assert_eq!(endorsement.status, EndorsementStatus::UnderReview);
    }
    let bizlayer = store
        .get(customer, ProviderId::Bizlayer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        bizlayer.hosted_url.as_deref(),
        Some("https://verify.bizlayer.example/bz-7")
    );
}

#[tokio::test]
async fn wire_formats_match_each_providers_contract() {
    let server = MockServer::start().await;

    // Veridoc: derived role list on the representative, alpha-3 country
    Mock::given(method("POST"))
        .and(path("/v2/kyb"))
        .and(body_partial_json(json!({
            "registration_address": {"country": "USA"},
            "representatives": [{"roles": ["owner", "signer"]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vd-1"})))
        .expect(1)
        .mount(&server)
        .await;

    // Identra: decomposed UBO phone, camelCase, alpha-2 country
    Mock::given(method("POST"))
        .and(path("/v1/identities/business"))
        .and(body_partial_json(json!({
            "address": {"country": "US"},
            "ultimateBeneficialOwners": [{
                "phone": {"callingCode": "1", "number": "2025550143"}
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "id-9"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/identities/id-9/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    // Bizlayer: day-first incorporation date, PascalCase fields
    Mock::given(method("PUT"))
        .and(path("/v1/businesses"))
        .and(body_partial_json(json!({
            "IncorporationDate": "05-03-2024",
            "RegisteredAddress": {"Street": "1 Market Street"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"BusinessId": "bz-7"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = orchestrator_for(&server.uri(), store, document_source());

    let report = orchestrator
        .submit(
            Uuid::new_v4(),
            Arc::new(sample_profile()),
            &[ProviderId::Veridoc, ProviderId::Identra, ProviderId::Bizlayer],
        )
        .await;

    for (provider, outcome) in &report.outcomes {
        assert_eq!(
            outcome.status,
            OutcomeStatus::Success,
            "{} wire format mismatch: {:?}",
            provider,
            outcome.error_message
        );
    }
}

#[tokio::test]
async fn validation_failure_for_one_provider_is_isolated() {
    let server = MockServer::start().await;

    // Mounted first so it takes precedence: Bizlayer must not see any
    // traffic for a profile missing its required registration number
    Mock::given(method("PUT"))
        .and(path("/v1/businesses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"BusinessId": "bz-7"})))
        .expect(0)
        .mount(&server)
        .await;

    mount_happy_mocks(&server).await;

    let mut profile = sample_profile();
    profile.registration_number = None;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = orchestrator_for(&server.uri(), store.clone(), document_source());
    let customer = Uuid::new_v4();

    let report = orchestrator
        .submit(customer, Arc::new(profile), &ProviderId::all())
        .await;

    let bizlayer = &report.outcomes[&ProviderId::Bizlayer];
    assert_eq!(bizlayer.status, OutcomeStatus::Failed);
    assert!(
        bizlayer
            .error_message
            .as_deref()
            .unwrap()
            .contains("registration_number"),
        "unexpected error: {:?}",
        bizlayer.error_message
    );

    // The other three providers are unaffected
    for provider in [ProviderId::Veridoc, ProviderId::Identra, ProviderId::Shareflow] {
        assert_eq!(report.outcomes[&provider].status, OutcomeStatus::Success);
    }

    // The rejected provider still gets its row, created as not_started
    let row = store
        .get(customer, ProviderId::Bizlayer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, EndorsementStatus::NotStarted);
}

#[tokio::test]
async fn transient_failures_retry_up_to_the_attempt_budget() {
    let server = MockServer::start().await;

    // Always 500: exactly max_attempts requests, then a failed outcome
    Mock::given(method("POST"))
        .and(path("/v2/kyb"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(3)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = orchestrator_for(&server.uri(), store, document_source());

    let report = orchestrator
        .submit(
            Uuid::new_v4(),
            Arc::new(sample_profile()),
            &[ProviderId::Veridoc],
        )
        .await;

    let outcome = &report.outcomes[&ProviderId::Veridoc];
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(
        outcome
            .error_message
            .as_deref()
            .unwrap()
            .contains("failed after 3 attempts"),
        "unexpected error: {:?}",
        outcome.error_message
    );
}

#[tokio::test]
async fn permanent_rejections_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/kyb"))
        .respond_with(
            ResponseTemplate::new(422).set_body_string("registration_address unparseable"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = orchestrator_for(&server.uri(), store, document_source());

    let report = orchestrator
        .submit(
            Uuid::new_v4(),
            Arc::new(sample_profile()),
            &[ProviderId::Veridoc],
        )
        .await;

    let outcome = &report.outcomes[&ProviderId::Veridoc];
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    // Provider message captured verbatim for audit
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("registration_address unparseable"));
}

#[tokio::test]
async fn identity_handle_triggers_document_upload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/identities/business"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "id-42"})))
        .expect(1)
        .mount(&server)
        .await;

    // The upload is owed only after the identity handle comes back
    Mock::given(method("PUT"))
        .and(path("/v1/identities/id-42/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = orchestrator_for(&server.uri(), store, document_source());

    let report = orchestrator
        .submit(
            Uuid::new_v4(),
            Arc::new(sample_profile()),
            &[ProviderId::Identra],
        )
        .await;

    assert_eq!(
        report.outcomes[&ProviderId::Identra].provider_reference.as_deref(),
        Some("id-42")
    );
    // Mock expectations assert the PUT happened exactly once
}

#[tokio::test]
async fn shareflow_missing_required_file_fails_closed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/kyc/share/third-vendor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"applicantId": "sf-3"})))
        .expect(0)
        .mount(&server)
        .await;

    // Storage collaborator has no bytes for the front-side document
    let source = Arc::new(
        StaticDocumentSource::new().with_file("doc-selfie", JPEG.to_vec()),
    );
    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = SubmissionOrchestrator::new(
        Arc::new(registry_for(&server.uri(), source.clone())),
        store,
        source,
        fast_policy(),
    );

    let report = orchestrator
        .submit(
            Uuid::new_v4(),
            Arc::new(sample_profile()),
            &[ProviderId::Shareflow],
        )
        .await;

    let outcome = &report.outcomes[&ProviderId::Shareflow];
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(
        outcome.error_message.as_deref().unwrap().contains("document"),
        "unexpected error: {:?}",
        outcome.error_message
    );
}

#[tokio::test]
async fn concurrent_submissions_for_same_pair_are_gated() {
    let server = MockServer::start().await;

    // Exactly one network call may happen for the overlapping pair
    Mock::given(method("POST"))
        .and(path("/v2/kyb"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "vd-1"}))
                .set_delay(Duration::from_millis(400)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = Arc::new(orchestrator_for(&server.uri(), store, document_source()));
    let customer = Uuid::new_v4();
    let profile = Arc::new(sample_profile());

    let first = {
        let orchestrator = orchestrator.clone();
        let profile = profile.clone();
        async move { orchestrator.submit(customer, profile, &[ProviderId::Veridoc]).await }
    };
    let second = {
        let orchestrator = orchestrator.clone();
        let profile = profile.clone();
        async move {
            // Start after the first submission is in flight
            tokio::time::sleep(Duration::from_millis(100)).await;
            orchestrator.submit(customer, profile, &[ProviderId::Veridoc]).await
        }
    };

    let (first_report, second_report) = tokio::join!(first, second);

    let first_outcome = &first_report.outcomes[&ProviderId::Veridoc];
    let second_outcome = &second_report.outcomes[&ProviderId::Veridoc];

    assert_eq!(first_outcome.status, OutcomeStatus::Success);
    assert_eq!(second_outcome.status, OutcomeStatus::Failed);
    assert!(second_outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("already in flight"));
}

#[tokio::test]
async fn cancelled_orchestrator_resolves_without_network_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/kyb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vd-1"})))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryEndorsementStore::new());
    let orchestrator = orchestrator_for(&server.uri(), store, document_source());
    orchestrator.cancel();

    let report = orchestrator
        .submit(
            Uuid::new_v4(),
            Arc::new(sample_profile()),
            &[ProviderId::Veridoc],
        )
        .await;

    let outcome = &report.outcomes[&ProviderId::Veridoc];
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome
        .error_message
        .as_deref()
        .unwrap()
        .contains("cancelled"));
}

// ============ Status webhook processing ============

fn status_event(customer: Uuid, provider: &str, status: &str) -> StatusEvent {
    StatusEvent {
        customer_id: customer,
        provider: provider.to_string(),
        status: status.to_string(),
        hosted_url: None,
        provider_reference: None,
        raw: json!({}),
    }
}

#[tokio::test]
async fn legacy_status_labels_are_normalized_before_storage() {
    let store = InMemoryEndorsementStore::new();
    let customer = Uuid::new_v4();

    let result = process_status_event(&store, status_event(customer, "veridoc", "submitted"))
        .await
        .unwrap();
    assert_eq!(result, ProcessResult::Processed);

    let row = store.get(customer, ProviderId::Veridoc).await.unwrap().unwrap();
    assert_eq!(row.status, EndorsementStatus::UnderReview);
}

#[tokio::test]
async fn duplicate_terminal_status_leaves_row_unchanged() {
    let store = InMemoryEndorsementStore::new();
    let customer = Uuid::new_v4();

    let first = process_status_event(&store, status_event(customer, "bizlayer", "approved"))
        .await
        .unwrap();
    assert_eq!(first, ProcessResult::Processed);

    let before = store.get(customer, ProviderId::Bizlayer).await.unwrap().unwrap();

    let second = process_status_event(&store, status_event(customer, "bizlayer", "approved"))
        .await
        .unwrap();
    assert_eq!(second, ProcessResult::Duplicate);

    let after = store.get(customer, ProviderId::Bizlayer).await.unwrap().unwrap();
    assert_eq!(after.status, EndorsementStatus::Approved);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn unknown_provider_in_status_event_is_rejected() {
    let store = InMemoryEndorsementStore::new();
    let result =
        process_status_event(&store, status_event(Uuid::new_v4(), "acme", "approved")).await;
    assert!(result.is_err());
}
