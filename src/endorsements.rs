use crate::errors::{AppError, ResultExt};
use crate::models::{Endorsement, EndorsementStatus, ProviderId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence seam for per-(customer, provider) verification status.
///
/// The store is the serialization point for a (customer, provider) pair:
/// status writes are last-writer-wins, and the orchestrator's in-flight gate
/// prevents concurrent submissions from racing ahead of it.
#[async_trait]
pub trait EndorsementStore: Send + Sync {
    async fn get(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
    ) -> Result<Option<Endorsement>, AppError>;

    async fn list(&self, customer_id: Uuid) -> Result<Vec<Endorsement>, AppError>;

    /// Create or update the row for (customer, provider). `hosted_url` is
    /// sticky: passing `None` keeps a previously stored URL.
    async fn upsert(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
        status: EndorsementStatus,
        hosted_url: Option<&str>,
    ) -> Result<Endorsement, AppError>;

    /// Ensure a row exists, creating it as `not_started` if absent. The
    /// status of an existing row is left untouched.
    async fn ensure(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
    ) -> Result<Endorsement, AppError>;
}

// ============ Postgres ============

#[derive(Debug, FromRow)]
struct EndorsementRow {
    customer_id: Uuid,
    provider: String,
    status: String,
    hosted_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EndorsementRow {
    fn into_endorsement(self) -> Option<Endorsement> {
        let provider = match ProviderId::parse(&self.provider) {
            Some(provider) => provider,
            None => {
                tracing::warn!(
                    "Skipping endorsement row with unknown provider '{}' for customer {}",
                    self.provider,
                    self.customer_id
                );
                return None;
            }
        };
        Some(Endorsement {
            customer_id: self.customer_id,
            provider,
            // Stored values already went through normalize on the write
            // path; this covers rows written by older deployments.
            status: EndorsementStatus::normalize(&self.status),
            hosted_url: self.hosted_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Postgres-backed endorsement store.
pub struct PgEndorsementStore {
    pool: PgPool,
}

impl PgEndorsementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EndorsementStore for PgEndorsementStore {
    async fn get(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
    ) -> Result<Option<Endorsement>, AppError> {
        let row = sqlx::query_as::<_, EndorsementRow>(
            "SELECT customer_id, provider, status, hosted_url, created_at, updated_at
             FROM endorsements
             WHERE customer_id = $1 AND provider = $2",
        )
        .bind(customer_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("fetching endorsement")?;

        Ok(row.and_then(EndorsementRow::into_endorsement))
    }

    async fn list(&self, customer_id: Uuid) -> Result<Vec<Endorsement>, AppError> {
        let rows = sqlx::query_as::<_, EndorsementRow>(
            "SELECT customer_id, provider, status, hosted_url, created_at, updated_at
             FROM endorsements
             WHERE customer_id = $1
             ORDER BY provider",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .context("listing endorsements")?;

        Ok(rows
            .into_iter()
            .filter_map(EndorsementRow::into_endorsement)
            .collect())
    }

    async fn upsert(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
        status: EndorsementStatus,
        hosted_url: Option<&str>,
    ) -> Result<Endorsement, AppError> {
        let row = sqlx::query_as::<_, EndorsementRow>(
            "INSERT INTO endorsements (customer_id, provider, status, hosted_url, created_at, updated_at)
             VALUES ($1, $2, $3, $4, now(), now())
             ON CONFLICT (customer_id, provider)
             DO UPDATE SET
                 status = EXCLUDED.status,
                 hosted_url = COALESCE(EXCLUDED.hosted_url, endorsements.hosted_url),
                 updated_at = now()
             RETURNING customer_id, provider, status, hosted_url, created_at, updated_at",
        )
        .bind(customer_id)
        .bind(provider.as_str())
        .bind(status.as_str())
        .bind(hosted_url)
        .fetch_one(&self.pool)
        .await
        .context("upserting endorsement")?;

        row.into_endorsement()
            .ok_or_else(|| AppError::InternalError("upsert returned unknown provider".to_string()))
    }

    async fn ensure(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
    ) -> Result<Endorsement, AppError> {
        // DO UPDATE with a no-op assignment so RETURNING yields the existing
        // row on conflict.
        let row = sqlx::query_as::<_, EndorsementRow>(
            "INSERT INTO endorsements (customer_id, provider, status, hosted_url, created_at, updated_at)
             VALUES ($1, $2, $3, NULL, now(), now())
             ON CONFLICT (customer_id, provider)
             DO UPDATE SET updated_at = endorsements.updated_at
             RETURNING customer_id, provider, status, hosted_url, created_at, updated_at",
        )
        .bind(customer_id)
        .bind(provider.as_str())
        .bind(EndorsementStatus::NotStarted.as_str())
        .fetch_one(&self.pool)
        .await
        .context("ensuring endorsement row")?;

        row.into_endorsement()
            .ok_or_else(|| AppError::InternalError("ensure returned unknown provider".to_string()))
    }
}

// ============ In-memory ============

/// In-memory endorsement store used by tests and local tooling.
#[derive(Default)]
pub struct InMemoryEndorsementStore {
    rows: RwLock<HashMap<(Uuid, ProviderId), Endorsement>>,
}

impl InMemoryEndorsementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EndorsementStore for InMemoryEndorsementStore {
    async fn get(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
    ) -> Result<Option<Endorsement>, AppError> {
        Ok(self.rows.read().await.get(&(customer_id, provider)).cloned())
    }

    async fn list(&self, customer_id: Uuid) -> Result<Vec<Endorsement>, AppError> {
        let rows = self.rows.read().await;
        let mut endorsements: Vec<Endorsement> = rows
            .values()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect();
        endorsements.sort_by_key(|e| e.provider);
        Ok(endorsements)
    }

    async fn upsert(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
        status: EndorsementStatus,
        hosted_url: Option<&str>,
    ) -> Result<Endorsement, AppError> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();
        let entry = rows
            .entry((customer_id, provider))
            .or_insert_with(|| Endorsement {
                customer_id,
                provider,
                status,
                hosted_url: None,
                created_at: now,
                updated_at: now,
            });
        entry.status = status;
        if let Some(url) = hosted_url {
            entry.hosted_url = Some(url.to_string());
        }
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn ensure(
        &self,
        customer_id: Uuid,
        provider: ProviderId,
    ) -> Result<Endorsement, AppError> {
        let mut rows = self.rows.write().await;
        let now = Utc::now();
        let entry = rows
            .entry((customer_id, provider))
            .or_insert_with(|| Endorsement {
                customer_id,
                provider,
                status: EndorsementStatus::NotStarted,
                hosted_url: None,
                created_at: now,
                updated_at: now,
            });
        Ok(entry.clone())
    }
}
