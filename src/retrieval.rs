//! Policy document retrieval for classification context.
//!
//! Queries a Qdrant-compatible vector store over HTTP: the query text is
//! embedded, then the nearest policy snippets are fetched and handed to the
//! classification prompt as grounding context.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{LlmError, RetrievalError};
use crate::llm::Embedder;
use crate::llm::retry::{RetryPolicy, retry_with_backoff};

/// Default number of policy snippets fetched per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Source of policy context for classification.
#[async_trait]
pub trait PolicyRetriever: Send + Sync {
    /// Fetch up to `limit` policy snippets relevant to `text`, best first.
    /// An empty result is a valid answer; errors fail the classification
    /// that requested the context.
    async fn retrieve(&self, text: &str, limit: usize) -> Result<Vec<String>, RetrievalError>;
}

/// Connection settings for the vector store.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub url: String,
    pub collection: String,
}

/// HTTP client for a Qdrant-compatible points/search API.
///
/// Query embedding goes through the capacity-retry policy; the search call
/// itself is not retried.
pub struct QdrantRetriever {
    config: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl QdrantRetriever {
    pub fn new(config: RetrievalConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn search_url(&self) -> String {
        format!(
            "{}/collections/{}/points/search",
            self.config.url.trim_end_matches('/'),
            self.config.collection
        )
    }
}

#[async_trait]
impl PolicyRetriever for QdrantRetriever {
    async fn retrieve(&self, text: &str, limit: usize) -> Result<Vec<String>, RetrievalError> {
        let vector = retry_with_backoff(self.retry, LlmError::is_transient, || {
            self.embedder.embed(text)
        })
        .await?;

        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .client
            .post(self.search_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::SearchFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(RetrievalError::SearchFailed {
                reason: format!("{status}: {detail}"),
            });
        }

        let parsed: SearchResponse =
            response
                .json()
                .await
                .map_err(|e| RetrievalError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        let snippets = snippets_from(parsed);
        debug!(count = snippets.len(), "Retrieved policy snippets");
        Ok(snippets)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Deserialize)]
struct PointPayload {
    #[serde(default)]
    text: Option<String>,
}

/// Scored points map to their payload text in rank order; points without a
/// text payload are skipped.
fn snippets_from(response: SearchResponse) -> Vec<String> {
    response
        .result
        .into_iter()
        .filter_map(|p| p.payload.and_then(|pl| pl.text))
        .collect()
}
