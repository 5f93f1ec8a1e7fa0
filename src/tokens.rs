//! # Token counting
//!
//! Thin wrapper over a `tiktoken_rs` BPE so every component measures text with the
//! same encoding. The encoding is picked once by name; an unknown name or a BPE that
//! fails to load is fatal for the caller, since nothing downstream can size chunks
//! without it.
//!
//! ```rust
//! use cosmere_chat::tokens::TokenCounter;
//!
//! let counter = TokenCounter::new("cl100k_base").unwrap();
//! assert!(counter.count("Kaladin Stormblessed") > 0);
//! assert_eq!(counter.count(""), 0);
//! ```

use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base, p50k_base, p50k_edit, r50k_base};

use crate::BoxError;

/// Encoding used when the configuration does not name one.
pub const DEFAULT_ENCODING: &str = "cl100k_base";

/// Counts tokens under a single, fixed encoding.
pub struct TokenCounter {
    encoding_name: String,
    bpe: CoreBPE,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding_name", &self.encoding_name)
            .finish()
    }
}

impl TokenCounter {
    /// Load the BPE for `encoding_name`.
    ///
    /// # Errors
    /// Unknown encoding names and BPE initialization failures.
    pub fn new(encoding_name: &str) -> Result<Self, BoxError> {
        let bpe = match encoding_name {
            "cl100k_base" => cl100k_base()?,
            "o200k_base" => o200k_base()?,
            "p50k_base" => p50k_base()?,
            "p50k_edit" => p50k_edit()?,
            "r50k_base" => r50k_base()?,
            other => return Err(format!("Unknown tokenizer encoding: {other}").into()),
        };

        Ok(Self {
            encoding_name: encoding_name.to_string(),
            bpe,
        })
    }

    /// Name of the encoding this counter was built with.
    pub fn encoding_name(&self) -> &str {
        &self.encoding_name
    }

    /// Number of tokens `text` occupies. Special-token strings count as plain text.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}
