use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Connection settings for a bearer-token or API-key provider.
///
/// Constructed once at startup and handed to the adapter; business logic
/// never reads the environment directly.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Bearer token or API key, depending on the provider. Never logged.
    pub credential: String,
}

/// Connection settings for Shareflow, which authenticates with HTTP Basic
/// auth using a merchant id + merchant key pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ShareflowConfig {
    pub base_url: String,
    pub merchant_id: String,
    pub merchant_key: String,
}

/// Retry policy knobs shared by every submission task.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Bounded attempt budget per (profile, provider) pair.
    pub max_attempts: u32,
    /// Per-attempt wall-clock timeout in seconds.
    pub attempt_timeout_secs: u64,
}

impl RetrySettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Shared secret for the provider-status webhook. Optional: when unset,
    /// webhook auth is skipped (a warning is logged at startup).
    pub webhook_secret: Option<String>,
    pub veridoc: ProviderConfig,
    pub identra: ProviderConfig,
    pub bizlayer: ProviderConfig,
    pub shareflow: ShareflowConfig,
    pub retry: RetrySettings,
}

fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn require_url(name: &str) -> anyhow::Result<String> {
    let raw = require_env(name)?;
    let parsed =
        Url::parse(&raw).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    // Providers expect paths appended with a leading slash
    Ok(raw.trim_end_matches('/').to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            veridoc: ProviderConfig {
                base_url: require_url("VERIDOC_BASE_URL")?,
                credential: require_env("VERIDOC_TOKEN")?,
            },
            identra: ProviderConfig {
                base_url: require_url("IDENTRA_BASE_URL")?,
                credential: require_env("IDENTRA_TOKEN")?,
            },
            bizlayer: ProviderConfig {
                base_url: require_url("BIZLAYER_BASE_URL")?,
                credential: require_env("BIZLAYER_API_KEY")?,
            },
            shareflow: ShareflowConfig {
                base_url: require_url("SHAREFLOW_BASE_URL")?,
                merchant_id: require_env("SHAREFLOW_MERCHANT_ID")?,
                merchant_key: require_env("SHAREFLOW_MERCHANT_KEY")?,
            },
            retry: RetrySettings {
                max_attempts: std::env::var("SUBMISSION_MAX_ATTEMPTS")
                    .ok()
                    .map(|v| v.parse())
                    .transpose()
                    .map_err(|_| anyhow::anyhow!("SUBMISSION_MAX_ATTEMPTS must be a number"))?
                    .unwrap_or(3),
                attempt_timeout_secs: std::env::var("SUBMISSION_ATTEMPT_TIMEOUT_SECS")
                    .ok()
                    .map(|v| v.parse())
                    .transpose()
                    .map_err(|_| {
                        anyhow::anyhow!("SUBMISSION_ATTEMPT_TIMEOUT_SECS must be a number")
                    })?
                    .unwrap_or(120),
            },
        };

        if config.retry.max_attempts == 0 {
            anyhow::bail!("SUBMISSION_MAX_ATTEMPTS must be at least 1");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Veridoc base URL: {}", config.veridoc.base_url);
        tracing::debug!("Identra base URL: {}", config.identra.base_url);
        tracing::debug!("Bizlayer base URL: {}", config.bizlayer.base_url);
        tracing::debug!("Shareflow base URL: {}", config.shareflow.base_url);
        tracing::debug!("Server Port: {}", config.port);
        if config.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not set; provider-status webhook auth is disabled");
        }

        Ok(config)
    }
}
