//! # Vector search
//!
//! [`VectorSearch`] returns the nearest indexed chunks for a query vector, best first.
//! Two backends:
//!
//! - [`AzureSearch`]: the managed Azure AI Search REST API.
//! - [`InMemoryIndex`]: brute-force cosine similarity over the [`IndexRecord`] JSON the
//!   indexer writes, for offline use and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{cmp::Ordering, fs, path::Path};
use tracing::{debug, info};

use crate::BoxError;
use crate::config::SearchConfig;
use crate::embedding::Embedder;
use crate::indexer::IndexRecord;

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub content: String,
}

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Top `k` hits for `vector` in descending score order.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, BoxError>;
}

/// Embed `query` and search for its `k` nearest chunks.
pub async fn search_knowledgebase(
    embedder: &Embedder,
    search: &dyn VectorSearch,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>, BoxError> {
    let vector = embedder.embed_query(query).await?;
    let hits = search.search(&vector, k).await?;
    debug!("Query {:?} returned {} hits", query, hits.len());
    Ok(hits)
}

#[derive(Deserialize)]
struct AzureResponse {
    value: Vec<AzureDocument>,
}

#[derive(Deserialize)]
struct AzureDocument {
    #[serde(rename = "@search.score")]
    score: f32,
    id: String,
    #[serde(default)]
    content: String,
}

/// Client for an Azure AI Search index populated with [`IndexRecord`]s.
pub struct AzureSearch {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    index_name: String,
    api_version: String,
}

impl AzureSearch {
    pub fn new(config: &SearchConfig, timeout_secs: Option<u64>) -> Result<Self, BoxError> {
        if config.endpoint.is_empty() {
            return Err("search.endpoint is not configured".into());
        }
        Ok(Self {
            http: crate::http_client(timeout_secs)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            index_name: config.index_name.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait]
impl VectorSearch for AzureSearch {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, BoxError> {
        let body = json!({
            "vectorQueries": [{
                "kind": "vector",
                "vector": vector,
                "k": k,
                "fields": "vector",
            }],
            "select": "id,document,path,content",
            "top": k,
        });

        let response = self
            .http
            .post(format!(
                "{}/indexes/{}/docs/search",
                self.endpoint, self.index_name
            ))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Search request failed with {status}: {body}").into());
        }

        let response: AzureResponse = response.json().await?;
        let mut hits: Vec<SearchHit> = response
            .value
            .into_iter()
            .map(|doc| SearchHit {
                id: doc.id,
                score: doc.score,
                content: doc.content,
            })
            .collect();
        sort_by_score(&mut hits);

        Ok(hits)
    }
}

/// Exhaustive cosine-similarity index held in memory.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    records: Vec<IndexRecord>,
}

impl InMemoryIndex {
    pub fn new(records: Vec<IndexRecord>) -> Self {
        Self { records }
    }

    /// Load the JSON array of records written by `cosmere index`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BoxError> {
        let path = path.as_ref();
        let records: Vec<IndexRecord> = serde_json::from_str(&fs::read_to_string(path)?)?;
        info!("Loaded {} records from {}", records.len(), path.display());
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VectorSearch for InMemoryIndex {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, BoxError> {
        let mut hits: Vec<SearchHit> = self
            .records
            .iter()
            .map(|record| SearchHit {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.vector),
                content: record.content.clone(),
            })
            .collect();
        sort_by_score(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }
}

fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Cosine similarity of two vectors; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
