//! This module provides functionality for loading and handling the application's configuration.
//!
//! The configuration is a YAML document split into one section per collaborator
//! (`chat`, `embedding`, `image`, `search`) plus the tuning knobs of the core
//! algorithms (`chunking`, `conversation`, `filter`). Every field has a default, so
//! a file only needs the values that differ, typically endpoints and keys.
//!
//! API keys can stay out of the file: when set and non-empty, the environment
//! variables `COSMERE_CHAT_API_KEY`, `COSMERE_EMBEDDING_API_KEY`,
//! `COSMERE_IMAGE_API_KEY` and `COSMERE_SEARCH_API_KEY` win over the file.
//!
//! # Examples
//!
//! ```no_run
//! use cosmere_chat::config::load_config;
//!
//! let config = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config.chunking);
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::debug;

use crate::BoxError;

/// Stop sequences reserved by Llama 3 chat models.
pub const LLAMA3_STOP_WORDS: [&str; 4] = [
    "<|start_header_id|>",
    "<|end_header_id|>",
    "<|eot_id|>",
    "<|reserved_special_token",
];

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(default)]
pub struct CosmereConfig {
    pub chat: ChatConfig,
    pub embedding: EmbeddingConfig,
    pub image: ImageConfig,
    pub search: SearchConfig,
    pub chunking: ChunkingConfig,
    pub conversation: ConversationConfig,
    pub filter: FilterConfig,
    /// Per-request HTTP timeout for every service client. No timeout when absent.
    pub request_timeout_secs: Option<u64>,
}

/// OpenAI-compatible chat-completion endpoint.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5001/v1".to_string(),
            api_key: String::new(),
            model: "Meta-Llama-3-70B-Instruct".to_string(),
        }
    }
}

/// OpenAI-compatible embedding endpoint and the batching/retry policy around it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Maximum number of texts per embedding request.
    pub batch_size: usize,
    /// Attempts per batch before the failure is surfaced.
    pub retry_attempts: usize,
    /// Fixed wait between attempts.
    pub retry_wait_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5002/v1".to_string(),
            api_key: String::new(),
            model: "cohere-v3-multilingual-01".to_string(),
            batch_size: 96,
            retry_attempts: 3,
            retry_wait_secs: 60,
        }
    }
}

/// Image-generation endpoint (Stability-style multipart API).
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ImageConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub negative_prompt: String,
    /// Directory generated images are written to.
    pub output_dir: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.stability.ai/v2beta/stable-image/generate/sd3".to_string(),
            api_key: String::new(),
            model: "sd3-turbo".to_string(),
            negative_prompt: "Be careful with the errors in the generated images. Hands and faces should look right. And text should be properly written.".to_string(),
            output_dir: "images".to_string(),
        }
    }
}

/// Vector search backend.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
    pub api_version: String,
    /// Nearest neighbours requested per query.
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            index_name: "cosmere".to_string(),
            api_version: "2023-11-01".to_string(),
            top_k: 20,
        }
    }
}

/// Chunking parameters used when indexing the corpus.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// tiktoken encoding name.
    pub encoding: String,
    /// Extension of corpus files, without the dot.
    pub extension: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 100,
            encoding: crate::tokens::DEFAULT_ENCODING.to_string(),
            extension: "txt".to_string(),
        }
    }
}

/// Generation settings for the dialogue turns.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of trailing conversation messages forwarded per turn.
    pub context_window: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop_words: Vec<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            context_window: 20,
            temperature: 0.4,
            max_tokens: 300,
            stop_words: LLAMA3_STOP_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Relevance-filter settings for the `ask_data` tool.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct FilterConfig {
    /// Ranked hits considered per query.
    pub max_candidates: usize,
    /// Hits classified before checking for early termination.
    pub batch_size: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Reply that marks a passage as relevant; compared by exact match.
    pub affirmative: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_candidates: 20,
            batch_size: 5,
            temperature: 0.01,
            max_tokens: 2,
            affirmative: "yes".to_string(),
        }
    }
}

impl CosmereConfig {
    /// Replace API keys with values from `lookup` when they are present and non-empty.
    pub fn apply_key_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut String); 4] = [
            ("COSMERE_CHAT_API_KEY", &mut self.chat.api_key),
            ("COSMERE_EMBEDDING_API_KEY", &mut self.embedding.api_key),
            ("COSMERE_IMAGE_API_KEY", &mut self.image.api_key),
            ("COSMERE_SEARCH_API_KEY", &mut self.search.api_key),
        ];

        for (var, slot) in overrides {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                debug!("Using {} from the environment", var);
                *slot = value;
            }
        }
    }
}

/// Loads the application's configuration from a YAML file and applies
/// environment key overrides.
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid YAML for
/// [`CosmereConfig`].
pub fn load_config(file: impl AsRef<Path>) -> Result<CosmereConfig, BoxError> {
    let file = file.as_ref();
    debug!("Loading config from: {}", file.display());
    let content = fs::read_to_string(file)?;
    let mut config: CosmereConfig = serde_yaml::from_str(&content)?;
    config.apply_key_overrides(|var| std::env::var(var).ok());
    Ok(config)
}

/// Default location of the configuration file: `<config_dir>/config.yaml`.
pub fn default_config_path() -> Result<std::path::PathBuf, BoxError> {
    Ok(crate::config_dir()?.join("config.yaml"))
}
