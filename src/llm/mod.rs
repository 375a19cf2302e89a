//! LLM integration for Mail Sentinel.
//!
//! Supports:
//! - **Gemini**: Direct API access via rig-core (default)
//! - **OpenAI**: Direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and the adapters in
//! `rig_adapter` to bridge rig's client traits to our `LlmProvider` and
//! `Embedder` traits.

pub mod provider;
pub mod retry;
mod rig_adapter;

pub use provider::*;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use rig_adapter::{RigAdapter, RigEmbedder};

use std::sync::Arc;

use rig::client::EmbeddingsClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
    OpenAi,
}

impl LlmBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Some(LlmBackend::Gemini),
            "openai" => Some(LlmBackend::OpenAi),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Gemini => "gemini-2.5-flash-lite",
            LlmBackend::OpenAi => "gpt-4o-mini",
        }
    }

    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            LlmBackend::Gemini => "text-embedding-004",
            LlmBackend::OpenAi => "text-embedding-3-small",
        }
    }
}

/// Configuration for creating LLM providers and embedders.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub embedding_model: String,
}

/// Create a completion provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => create_gemini_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

/// Create a text embedder from configuration.
pub fn create_embedder(config: &LlmConfig) -> Result<Arc<dyn Embedder>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => create_gemini_embedder(config),
        LlmBackend::OpenAi => create_openai_embedder(config),
    }
}

fn create_gemini_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::gemini;

    let client = gemini::Client::new(config.api_key.expose_secret()).map_err(|e| {
        LlmError::RequestFailed {
            provider: "gemini".to_string(),
            reason: format!("Failed to create Gemini client: {}", e),
        }
    })?;

    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(client, &config.model, "gemini")))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(client, &config.model, "openai")))
}

fn create_gemini_embedder(config: &LlmConfig) -> Result<Arc<dyn Embedder>, LlmError> {
    use rig::providers::gemini;

    let client = gemini::Client::new(config.api_key.expose_secret()).map_err(|e| {
        LlmError::RequestFailed {
            provider: "gemini".to_string(),
            reason: format!("Failed to create Gemini client: {}", e),
        }
    })?;

    let model = client.embedding_model(&config.embedding_model);
    tracing::info!("Using Gemini embeddings (model: {})", config.embedding_model);
    Ok(Arc::new(RigEmbedder::new(
        model,
        &config.embedding_model,
        "gemini",
    )))
}

fn create_openai_embedder(config: &LlmConfig) -> Result<Arc<dyn Embedder>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.embedding_model(&config.embedding_model);
    tracing::info!("Using OpenAI embeddings (model: {})", config.embedding_model);
    Ok(Arc::new(RigEmbedder::new(
        model,
        &config.embedding_model,
        "openai",
    )))
}
