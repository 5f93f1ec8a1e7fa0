//! # Embeddings
//!
//! [`EmbeddingBackend`] is one request to an embedding service. [`Embedder`] wraps a
//! backend with the batching and retry policy used everywhere in the crate:
//!
//! - Input is split into batches of at most `batch_size` texts (96 by default).
//! - Batches are sent one after the other and the vectors concatenated in input order.
//! - A failed batch is retried after a fixed wait, up to `attempts` tries in total,
//!   then the last error is returned.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::BoxError;
use crate::config::EmbeddingConfig;

/// One embedding request: texts in, one vector per text out, same order.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbeddings {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig, timeout_secs: Option<u64>) -> Result<Self, BoxError> {
        Ok(Self {
            http: crate::http_client(timeout_secs)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError> {
        let response = self
            .http
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Embedding request failed with {status}: {body}").into());
        }

        let mut response: EmbeddingResponse = response.json().await?;
        if response.data.len() != texts.len() {
            return Err(format!(
                "Embedding service returned {} vectors for {} inputs",
                response.data.len(),
                texts.len()
            )
            .into());
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Fixed-interval retry: `attempts` tries in total with `wait` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub wait: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: usize, wait: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            wait,
        }
    }
}

/// Batching, retrying front end over an [`EmbeddingBackend`].
#[derive(Clone)]
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl Embedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    /// Wrap `backend` with the batch size and retry policy from `config`.
    pub fn from_config(backend: Arc<dyn EmbeddingBackend>, config: &EmbeddingConfig) -> Self {
        Self::new(
            backend,
            config.batch_size,
            RetryPolicy::new(
                config.retry_attempts,
                Duration::from_secs(config.retry_wait_secs),
            ),
        )
    }

    /// Embed every text, batch by batch, preserving input order.
    ///
    /// # Errors
    /// Returns the last error of the first batch that exhausts its retries. Vectors of
    /// earlier batches are discarded.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Embedding batch {} ({} texts)", i, batch.len());
            let embedded = self.embed_with_retry(batch).await?;
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    /// Embed a single search query.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, BoxError> {
        let mut vectors = self.embed_with_retry(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| "Embedding service returned no vector for the query".into())
    }

    async fn embed_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, BoxError> {
        let mut attempt = 1;
        loop {
            match self.backend.embed_batch(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if attempt < self.retry.attempts => {
                    warn!(
                        "Embedding attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, self.retry.attempts, e, self.retry.wait
                    );
                    tokio::time::sleep(self.retry.wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
