use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderBreaker};
use crate::config::RetrySettings;
use crate::documents::{DocumentSource, DocumentUploadTask};
use crate::endorsements::EndorsementStore;
use crate::models::{
    EndorsementStatus, Outcome, ProfileModel, ProviderId, SubmissionReport,
};
use crate::normalize::{canonicalize, CanonicalProfile};
use crate::providers::{ProviderAdapter, ProviderRegistry};
use chrono::Utc;
use failsafe::futures::CircuitBreaker as _;
use moka::future::Cache;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============ Retry policy ============

/// Bounded retry policy applied to every submission task.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before retry N is `backoff[min(N-1, len-1)]`, so the schedule
    /// escalates and then holds at the last value.
    pub backoff: Vec<Duration>,
    /// Wall-clock budget per attempt; an attempt past this is abandoned and
    /// counted as a failure.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            attempt_timeout: settings.attempt_timeout(),
            ..Self::default()
        }
    }

    pub fn backoff_after(&self, attempt: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[index]
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

// ============ Submission task ============

/// Terminal states mirror the failure taxonomy: a retryable failure that
/// exhausts the attempt budget ends as `FailedTerminal` with the last error
/// recorded in the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

/// Follow-up work owed after an identity-creating submission succeeds.
#[derive(Debug, Clone)]
pub struct DocumentFollowUp {
    pub provider: ProviderId,
    pub identity_reference: String,
}

/// Everything a finished task hands back to the orchestrator.
#[derive(Debug)]
pub struct TaskResult {
    pub provider: ProviderId,
    pub state: TaskState,
    pub outcome: Outcome,
    pub hosted_url: Option<String>,
    pub follow_up: Option<DocumentFollowUp>,
}

impl TaskResult {
    fn terminal(provider: ProviderId, outcome: Outcome) -> Self {
        Self {
            provider,
            state: TaskState::FailedTerminal,
            outcome,
            hosted_url: None,
            follow_up: None,
        }
    }
}

/// A unit of retryable work bound to exactly one (profile, provider) pair.
///
/// `Pending -> Running -> {Succeeded | FailedRetryable | FailedTerminal}`.
/// Exhausting retries resolves to a failed Outcome; nothing propagates past
/// the task, so the orchestrator can always aggregate.
pub struct SubmissionTask {
    provider: ProviderId,
    adapter: Arc<dyn ProviderAdapter>,
    policy: RetryPolicy,
    breaker: Arc<ProviderBreaker>,
    cancelled: Arc<AtomicBool>,
}

impl SubmissionTask {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        policy: RetryPolicy,
        breaker: Arc<ProviderBreaker>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            provider: adapter.id(),
            adapter,
            policy,
            breaker,
            cancelled,
        }
    }

    pub async fn run(
        self,
        profile: &ProfileModel,
        canonical: &CanonicalProfile,
    ) -> TaskResult {
        let provider = self.provider;
        let mut state = TaskState::Pending;
        tracing::debug!(provider = %provider, state = ?state, "Submission task created");

        // Validation is a caller-input defect when it fails: terminal,
        // never retried, and no network call is attempted.
        if let Err(validation) = self.adapter.validate(profile) {
            tracing::warn!(provider = %provider, "Validation rejected submission: {}", validation);
            return TaskResult::terminal(provider, Outcome::failed(provider, validation.to_string()));
        }

        let payload = match self.adapter.build_payload(canonical) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(provider = %provider, "Payload build failed: {}", e);
                return TaskResult::terminal(provider, Outcome::failed(provider, e.to_string()));
            }
        };

        tracing::info!(
            provider = %provider,
            fingerprint = %payload.fingerprint(),
            "Submitting profile"
        );

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            // Cancellation points sit between attempts only; an in-flight
            // call runs to its per-attempt timeout.
            if self.cancelled.load(Ordering::SeqCst) {
                tracing::info!(provider = %provider, "Submission cancelled before transmission");
                return TaskResult::terminal(
                    provider,
                    Outcome::failed(provider, "submission cancelled before transmission"),
                );
            }

            state = TaskState::Running;
            tracing::debug!(provider = %provider, attempt, state = ?state, "Dispatching attempt");
            let attempt_result = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.breaker.call(self.adapter.submit(&payload)),
            )
            .await;

            let retryable = match attempt_result {
                Ok(Ok(ack)) => {
                    tracing::info!(
                        provider = %provider,
                        reference = %ack.reference,
                        attempt,
                        "Provider accepted submission"
                    );
                    let follow_up = ack.needs_documents.then(|| DocumentFollowUp {
                        provider,
                        identity_reference: ack.reference.clone(),
                    });
                    return TaskResult {
                        provider,
                        state: TaskState::Succeeded,
                        outcome: Outcome::success(provider, ack.reference, Some(ack.raw)),
                        hosted_url: ack.hosted_url,
                        follow_up,
                    };
                }
                Ok(Err(failsafe::Error::Rejected)) => {
                    last_error = format!("{} circuit breaker is open", provider);
                    true
                }
                Ok(Err(failsafe::Error::Inner(e))) => {
                    let retryable = e.is_retryable();
                    last_error = e.to_string();
                    retryable
                }
                Err(_elapsed) => {
                    last_error = format!(
                        "attempt {} abandoned after {}s",
                        attempt,
                        self.policy.attempt_timeout.as_secs()
                    );
                    true
                }
            };

            if !retryable {
                tracing::warn!(provider = %provider, attempt, "Terminal failure: {}", last_error);
                return TaskResult::terminal(provider, Outcome::failed(provider, last_error));
            }

            if attempt < self.policy.max_attempts {
                state = TaskState::FailedRetryable;
                let delay = self.policy.backoff_after(attempt);
                tracing::warn!(
                    provider = %provider,
                    attempt,
                    state = ?state,
                    retry_in_secs = delay.as_secs(),
                    "Retryable failure: {}",
                    last_error
                );
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(
            provider = %provider,
            attempts = self.policy.max_attempts,
            "Attempt budget exhausted: {}",
            last_error
        );
        TaskResult::terminal(
            provider,
            Outcome::failed(
                provider,
                format!(
                    "failed after {} attempts: {}",
                    self.policy.max_attempts, last_error
                ),
            ),
        )
    }
}

// ============ Orchestrator ============

/// Fans one profile out to the configured providers as independent tasks
/// and aggregates their outcomes.
///
/// One provider's failure never affects another; the report always carries
/// exactly one outcome per requested provider. Concurrent submissions for
/// the same (customer, provider) pair are gated by a short-lived lock so a
/// double-click cannot mint duplicate provider-side identities.
pub struct SubmissionOrchestrator {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn EndorsementStore>,
    source: Arc<dyn DocumentSource>,
    policy: RetryPolicy,
    /// In-flight lock keyed by "customer_id:provider". The TTL is a
    /// backstop in case a task is torn down without releasing its key.
    inflight: Cache<String, i64>,
    /// Recently seen reference_ids. Re-submission is allowed by contract;
    /// this only flags accidental double-POSTs in the logs.
    recent_references: Cache<String, i64>,
    breakers: BTreeMap<ProviderId, Arc<ProviderBreaker>>,
    cancelled: Arc<AtomicBool>,
}

impl SubmissionOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn EndorsementStore>,
        source: Arc<dyn DocumentSource>,
        policy: RetryPolicy,
    ) -> Self {
        let breakers = ProviderId::all()
            .into_iter()
            .map(|provider| (provider, Arc::new(create_provider_circuit_breaker())))
            .collect();

        Self {
            registry,
            store,
            source,
            policy,
            inflight: Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(10_000)
                .build(),
            recent_references: Cache::builder()
                .time_to_live(Duration::from_secs(300))
                .max_capacity(10_000)
                .build(),
            breakers,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag shutdown: tasks that have not started their network call resolve
    /// as cancelled failures; in-flight calls drain normally.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub async fn submit(
        &self,
        customer_id: Uuid,
        profile: Arc<ProfileModel>,
        providers: &[ProviderId],
    ) -> SubmissionReport {
        let requested: BTreeSet<ProviderId> = providers.iter().copied().collect();
        let canonical = Arc::new(canonicalize(&profile));

        if self.recent_references.get(&profile.reference_id).await.is_some() {
            tracing::info!(
                reference = %profile.reference_id,
                "reference_id was submitted recently; treating as a re-submission"
            );
        }
        self.recent_references
            .insert(profile.reference_id.clone(), Utc::now().timestamp())
            .await;

        let mut outcomes: BTreeMap<ProviderId, Outcome> = BTreeMap::new();
        let mut handles = Vec::new();
        let mut locked_keys = Vec::new();

        for provider in requested {
            let adapter = match self.registry.adapter(provider) {
                Some(adapter) => adapter,
                None => {
                    outcomes.insert(
                        provider,
                        Outcome::failed(provider, "no adapter configured for provider"),
                    );
                    continue;
                }
            };

            let gate_key = format!("{}:{}", customer_id, provider);
            if self.inflight.get(&gate_key).await.is_some() {
                tracing::warn!(
                    provider = %provider,
                    customer = %customer_id,
                    "Submission already in flight; refusing duplicate"
                );
                outcomes.insert(
                    provider,
                    Outcome::failed(
                        provider,
                        "a submission for this provider is already in flight",
                    ),
                );
                continue;
            }
            self.inflight
                .insert(gate_key.clone(), Utc::now().timestamp())
                .await;
            locked_keys.push(gate_key);

            let task = SubmissionTask::new(
                adapter,
                self.policy.clone(),
                self.breakers[&provider].clone(),
                self.cancelled.clone(),
            );
            let profile = profile.clone();
            let canonical = canonical.clone();
            handles.push((
                provider,
                tokio::spawn(async move { task.run(&profile, &canonical).await }),
            ));
        }

        // Join-all: each task's result is captured independently, so one
        // provider failing (or panicking) cannot suppress another's outcome.
        let mut follow_ups = Vec::new();
        let mut hosted_urls: BTreeMap<ProviderId, String> = BTreeMap::new();
        for (provider, handle) in handles {
            match handle.await {
                Ok(result) => {
                    if let Some(url) = result.hosted_url {
                        hosted_urls.insert(provider, url);
                    }
                    if let Some(follow_up) = result.follow_up {
                        follow_ups.push(follow_up);
                    }
                    outcomes.insert(provider, result.outcome);
                }
                Err(e) => {
                    tracing::error!(provider = %provider, "Submission task panicked: {}", e);
                    outcomes.insert(
                        provider,
                        Outcome::failed(provider, format!("submission task failed: {}", e)),
                    );
                }
            }
        }

        for key in locked_keys {
            self.inflight.invalidate(&key).await;
        }

        self.record_outcomes(customer_id, &outcomes, &hosted_urls).await;
        self.run_follow_ups(&profile, follow_ups).await;

        SubmissionReport {
            profile_id: profile.reference_id.clone(),
            outcomes,
            submitted_at: Utc::now(),
        }
    }

    /// Persist every outcome. The row is created as `not_started` on the
    /// first attempt and moves to `under_review` on successful transmission;
    /// decisioning states arrive later via the status webhook. Store errors
    /// are logged, never raised: the report is returned regardless.
    async fn record_outcomes(
        &self,
        customer_id: Uuid,
        outcomes: &BTreeMap<ProviderId, Outcome>,
        hosted_urls: &BTreeMap<ProviderId, String>,
    ) {
        for (provider, outcome) in outcomes {
            if let Err(e) = self.store.ensure(customer_id, *provider).await {
                tracing::error!(provider = %provider, "Failed to ensure endorsement row: {}", e);
                continue;
            }
            if outcome.is_success() {
                let hosted_url = hosted_urls.get(provider).map(String::as_str);
                if let Err(e) = self
                    .store
                    .upsert(
                        customer_id,
                        *provider,
                        EndorsementStatus::UnderReview,
                        hosted_url,
                    )
                    .await
                {
                    tracing::error!(provider = %provider, "Failed to record endorsement: {}", e);
                }
            }
        }
    }

    /// Run document uploads owed to identity-then-documents providers. A
    /// failed upload is logged and leaves the endorsement in review; the
    /// provider re-requests documents through its own channels.
    async fn run_follow_ups(&self, profile: &ProfileModel, follow_ups: Vec<DocumentFollowUp>) {
        for follow_up in follow_ups {
            if profile.documents.is_empty() {
                tracing::warn!(
                    provider = %follow_up.provider,
                    "Identity created but profile has no documents; skipping upload"
                );
                continue;
            }
            let uploader = match self.registry.uploader(follow_up.provider) {
                Some(uploader) => uploader,
                None => {
                    tracing::warn!(
                        provider = %follow_up.provider,
                        "No document uploader registered; skipping upload"
                    );
                    continue;
                }
            };
            let task = DocumentUploadTask {
                provider: follow_up.provider,
                identity_reference: follow_up.identity_reference,
                documents: profile.documents.clone(),
                source: self.source.clone(),
            };
            if let Err(e) = task.run(uploader.as_ref()).await {
                tracing::warn!(
                    provider = %follow_up.provider,
                    "Document upload failed: {}",
                    e
                );
            }
        }
    }
}
