//! # Cosmere chat (library root)
//!
//! Retrieval-augmented conversation over a fixed book corpus:
//! - Token counting and paragraph chunking with overlap (`tokens`, `chunker`).
//! - Offline corpus indexing into embeddable records (`corpus`, `indexer`).
//! - Black-box service clients behind traits (`embedding`, `llm`, `imagegen`, `search`).
//! - The tool-calling dialogue loop and its relevance filter (`chatbot`, `relevance`, `tools`).
//! - Configuration, prompt templates and the CLI surface (`config`, `template`, `commands`).
//!
//! ## Data flow
//! ```text
//! corpus/*.txt ──► Chunker ──► BookIndexer ──► embeddings ──► IndexRecord JSON
//!
//! user turn ──► ChatBot ──► model reply ──┬─► direct answer
//!                                         ├─► ask_data ──► search + RelevanceFilter ──► follow-up
//!                                         └─► create_image ──► status text
//! ```
//!
//! ## Modules
//! - [`chatbot`], [`chunker`], [`commands`], [`config`], [`corpus`], [`embedding`],
//!   [`imagegen`], [`indexer`], [`llm`], [`relevance`], [`search`], [`template`],
//!   [`tokens`], [`tools`]

use directories::ProjectDirs;

pub mod chatbot;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod imagegen;
pub mod indexer;
pub mod llm;
pub mod relevance;
pub mod search;
pub mod template;
pub mod tokens;
pub mod tools;

/// Error type shared by every fallible operation in the crate.
///
/// Boxed so that service, I/O, JSON and tokenizer errors all propagate with `?`,
/// and `Send + Sync` so it can cross `async_trait` boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Return the per-platform configuration directory.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "cosmere", "cosmere-chat")`, e.g. `~/.config/cosmere-chat` on Linux.
///
/// The directory is **not** created by this function; callers that need it should
/// create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<std::path::PathBuf, BoxError> {
    let proj_dirs = ProjectDirs::from("com", "cosmere", "cosmere-chat")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Build the HTTP client shared by every service client.
///
/// `timeout_secs` bounds each request end to end; `None` leaves requests unbounded.
pub fn http_client(timeout_secs: Option<u64>) -> Result<reqwest::Client, BoxError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(std::time::Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}
