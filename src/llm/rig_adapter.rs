//! Bridges rig-core clients to the `LlmProvider` and `Embedder` traits.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, Embedder, LlmProvider};

/// Adapter from a rig completion client to `LlmProvider`.
///
/// A fresh agent is built per request so sampling parameters follow the
/// request rather than the client.
pub struct RigAdapter<C> {
    client: C,
    model: String,
    provider: &'static str,
}

impl<C> RigAdapter<C> {
    pub fn new(client: C, model: &str, provider: &'static str) -> Self {
        Self {
            client,
            model: model.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<C> LlmProvider for RigAdapter<C>
where
    C: CompletionClient + Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let mut builder = self.client.agent(&self.model);
        if let Some(system) = request.system_text() {
            builder = builder.preamble(&system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        let agent = builder.build();

        let content = agent
            .prompt(request.user_text())
            .await
            .map_err(|e| classify_provider_error(self.provider, &e.to_string()))?;

        Ok(CompletionResponse { content })
    }
}

/// Adapter from a rig embedding model to `Embedder`.
pub struct RigEmbedder<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M> RigEmbedder<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

#[async_trait]
impl<M> Embedder for RigEmbedder<M>
where
    M: EmbeddingModel + Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>, LlmError> {
        let embedding = self
            .model
            .embed_text(text)
            .await
            .map_err(|e| classify_provider_error(self.provider, &e.to_string()))?;
        Ok(embedding.vec)
    }
}

/// Map a provider error message onto the retryable/fatal split.
///
/// Capacity problems surface as HTTP 429/503 with recognizable text;
/// anything unrecognized is a hard request failure.
fn classify_provider_error(provider: &str, message: &str) -> LlmError {
    let lower = message.to_lowercase();
    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("quota")
        || lower.contains("exhausted")
    {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else if lower.contains("503")
        || lower.contains("unavailable")
        || lower.contains("overloaded")
    {
        LlmError::Unavailable {
            provider: provider.to_string(),
            reason: message.to_string(),
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("api key")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: message.to_string(),
        }
    }
}
