//! Environment-driven service configuration.
//!
//! Read once at startup; components receive plain config structs rather
//! than reading the environment themselves. Channel credentials
//! (`SMTP_*`, `WHATSAPP_*`) stay with their channels, which degrade to
//! mock sends when unset.

use std::str::FromStr;

use chrono::Duration;
use cron::Schedule;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::reminders::{DEFAULT_OVERDUE_HOURS, DispatcherConfig};
use crate::retrieval::RetrievalConfig;

/// Default digest schedule: every day at 18:00 (sec min hour dom month dow).
pub const DEFAULT_DIGEST_CRON: &str = "0 0 18 * * *";

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    /// Path of the local store database file.
    pub db_path: String,
    /// HTTP listen port.
    pub port: u16,
    /// How long a tracked meeting may wait for minutes before it counts
    /// as overdue.
    pub overdue_after: Duration,
    pub dispatcher: DispatcherConfig,
    /// Digest cron settings; `None` disables the scheduled digest.
    pub digest: Option<DigestCronConfig>,
}

/// Scheduled-digest settings.
#[derive(Debug, Clone)]
pub struct DigestCronConfig {
    pub recipient: String,
    pub schedule: Schedule,
    /// Original cron expression, kept for logging.
    pub expression: String,
}

impl SentinelConfig {
    /// Read the full configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm = llm_from_env()?;
        let retrieval = retrieval_from_env();

        let db_path = std::env::var("SENTINEL_DB_PATH")
            .unwrap_or_else(|_| "./data/mail-sentinel.db".to_string());
        let port: u16 = std::env::var("SENTINEL_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        let overdue_hours: i64 = std::env::var("OVERDUE_THRESHOLD_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_OVERDUE_HOURS);

        Ok(Self {
            llm,
            retrieval,
            db_path,
            port,
            overdue_after: Duration::hours(overdue_hours),
            dispatcher: DispatcherConfig::from_env(),
            digest: digest_from_env()?,
        })
    }
}

fn llm_from_env() -> Result<LlmConfig, ConfigError> {
    let backend = match std::env::var("LLM_BACKEND") {
        Ok(raw) => LlmBackend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "LLM_BACKEND".to_string(),
            message: format!("unknown backend `{raw}` (expected gemini or openai)"),
        })?,
        Err(_) => LlmBackend::Gemini,
    };

    let (key_var, hint) = match backend {
        LlmBackend::Gemini => ("GEMINI_API_KEY", "export GEMINI_API_KEY=..."),
        LlmBackend::OpenAi => ("OPENAI_API_KEY", "export OPENAI_API_KEY=sk-..."),
    };
    let api_key = std::env::var(key_var).map_err(|_| ConfigError::MissingRequired {
        key: key_var.to_string(),
        hint: hint.to_string(),
    })?;

    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| backend.default_model().to_string());
    let embedding_model = std::env::var("EMBEDDING_MODEL")
        .unwrap_or_else(|_| backend.default_embedding_model().to_string());

    Ok(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model,
        embedding_model,
    })
}

fn retrieval_from_env() -> RetrievalConfig {
    RetrievalConfig {
        url: std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6333".to_string()),
        collection: std::env::var("QDRANT_COLLECTION").unwrap_or_else(|_| "policies".to_string()),
    }
}

/// `DIGEST_RECIPIENT` enables the scheduled digest; `DIGEST_CRON`
/// overrides the default schedule.
fn digest_from_env() -> Result<Option<DigestCronConfig>, ConfigError> {
    let Ok(recipient) = std::env::var("DIGEST_RECIPIENT") else {
        return Ok(None);
    };

    let expression =
        std::env::var("DIGEST_CRON").unwrap_or_else(|_| DEFAULT_DIGEST_CRON.to_string());
    let schedule = Schedule::from_str(&expression).map_err(|e| ConfigError::InvalidValue {
        key: "DIGEST_CRON".to_string(),
        message: format!("invalid cron expression `{expression}`: {e}"),
    })?;

    Ok(Some(DigestCronConfig {
        recipient,
        schedule,
        expression,
    }))
}
