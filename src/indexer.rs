//! # Corpus indexing
//!
//! [`BookIndexer`] turns a directory of books into [`IndexRecord`]s ready for the
//! search index: load, parse, chunk, enrich with identity metadata, embed.
//!
//! Documents are processed one at a time. A document whose embedding fails is dropped
//! as a whole, logged, and reported in [`IndexOutcome::failed`]; indexing carries on
//! with the next one. Ids are derived from the file stem alone, so a later document
//! whose stem sanitizes to the same key as an indexed one (`a/book1.txt` and
//! `b/book1.txt`, or `The Way.txt` and `TheWay.txt`) is reported as failed instead of
//! overwriting the earlier records.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};
use tracing::{error, info};

use crate::BoxError;
use crate::chunker::{Chunk, Chunker};
use crate::corpus::{Book, SourceFile, load_sources};
use crate::embedding::Embedder;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("valid regex"));

/// One embedded chunk as stored in the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub document: String,
    pub content: String,
    pub path: String,
    pub vector: Vec<f32>,
}

/// Remove every run of non-word characters, e.g. `"The Way of Kings_3"` to
/// `"TheWayofKings_3"`.
pub fn sanitize_id(raw: &str) -> String {
    NON_WORD.replace_all(raw, "").into_owned()
}

/// A document that could not be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedDocument {
    pub document: String,
    pub error: String,
}

/// Result of indexing a whole corpus.
#[derive(Debug, Default)]
pub struct IndexOutcome {
    /// Number of source files visited.
    pub documents: usize,
    pub records: Vec<IndexRecord>,
    pub failed: Vec<FailedDocument>,
}

/// Progress reported by [`BookIndexer::index_corpus`].
#[derive(Debug)]
pub enum IndexProgress<'a> {
    /// The corpus walk found this many source files.
    Found(usize),
    /// A source file was indexed or failed.
    Done(&'a SourceFile),
}

pub struct BookIndexer {
    chunker: Chunker,
    embedder: Embedder,
    extension: String,
}

impl BookIndexer {
    pub fn new(chunker: Chunker, embedder: Embedder, extension: impl Into<String>) -> Self {
        Self {
            chunker,
            embedder,
            extension: extension.into(),
        }
    }

    /// Attach ids and provenance to the chunks of one document. `vectors` must be
    /// parallel to `chunks`.
    pub fn enrich(
        document: &str,
        path: &str,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Vec<IndexRecord> {
        chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, vector))| IndexRecord {
                id: sanitize_id(&format!("{document}_{i}")),
                document: document.to_string(),
                content: chunk.content,
                path: path.to_string(),
                vector,
            })
            .collect()
    }

    /// Chunk and embed a single source file.
    ///
    /// # Errors
    /// Fails if the file cannot be read, or embedding fails after its retries, or the
    /// embedding service returns the wrong number of vectors.
    pub async fn index_document(&self, source: &SourceFile) -> Result<Vec<IndexRecord>, BoxError> {
        let book = Book::open(&source.path)?;
        let chunks = self.chunker.split_paragraphs(&book.paragraphs);
        if chunks.is_empty() {
            info!("{} has no paragraphs, skipping", source.path.display());
            return Ok(Vec::new());
        }

        let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&contents).await?;
        if vectors.len() != chunks.len() {
            return Err(format!(
                "expected {} embeddings for {}, got {}",
                chunks.len(),
                source.file,
                vectors.len()
            )
            .into());
        }

        let records = Self::enrich(
            &source.document(),
            &source.path.to_string_lossy(),
            chunks,
            vectors,
        );
        info!("Indexed {} chunks from {}", records.len(), source.file);

        Ok(records)
    }

    /// Index `sources` in order, calling `on_done` after each document.
    ///
    /// A document whose id key was already taken by an earlier document fails without
    /// an embedding call.
    pub async fn index_sources<F>(&self, sources: &[SourceFile], mut on_done: F) -> IndexOutcome
    where
        F: FnMut(&SourceFile),
    {
        let mut outcome = IndexOutcome {
            documents: sources.len(),
            ..Default::default()
        };
        // sanitized document key -> file that claimed it
        let mut claimed: HashMap<String, String> = HashMap::new();

        for source in sources {
            let key = sanitize_id(&source.document());
            let result: Result<Vec<IndexRecord>, BoxError> = match claimed.get(&key) {
                Some(owner) => Err(format!(
                    "ids {key}_* already belong to {owner}, rename {} to index it",
                    source.file
                )
                .into()),
                None => self.index_document(source).await,
            };

            match result {
                Ok(records) => {
                    if !records.is_empty() {
                        claimed.insert(key, source.path.to_string_lossy().into_owned());
                    }
                    outcome.records.extend(records);
                }
                Err(e) => {
                    error!("Failed to index {}: {}", source.path.display(), e);
                    outcome.failed.push(FailedDocument {
                        document: source.document(),
                        error: e.to_string(),
                    });
                }
            }
            on_done(source);
        }

        outcome
    }

    /// Load every corpus file under `root` and index it, reporting progress.
    ///
    /// # Errors
    /// Only walking the directory can fail; per-document failures are reported in
    /// the returned [`IndexOutcome`].
    pub async fn index_corpus<F>(
        &self,
        root: impl AsRef<Path>,
        mut on_progress: F,
    ) -> Result<IndexOutcome, BoxError>
    where
        F: FnMut(IndexProgress<'_>),
    {
        let sources = load_sources(root, &self.extension)?;
        on_progress(IndexProgress::Found(sources.len()));
        let outcome = self
            .index_sources(&sources, |source| on_progress(IndexProgress::Done(source)))
            .await;
        Ok(outcome)
    }
}

/// Write records as a JSON array.
pub fn write_records(path: impl AsRef<Path>, records: &[IndexRecord]) -> Result<(), BoxError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string(records)?)?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingBackend, RetryPolicy};
    use crate::search::InMemoryIndex;
    use crate::tokens::TokenCounter;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Embeds each text as `[len]`; fails any batch containing "SHARDBLADE".
    #[derive(Default)]
    struct LengthEmbeddings {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl EmbeddingBackend for LengthEmbeddings {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BoxError> {
            *self.calls.lock().unwrap() += 1;
            if texts.iter().any(|t| t.contains("SHARDBLADE")) {
                return Err("embedding service rejected the batch".into());
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn indexer(backend: Arc<LengthEmbeddings>) -> BookIndexer {
        let chunker = Chunker::new(64, 8, TokenCounter::new("cl100k_base").unwrap()).unwrap();
        let embedder = Embedder::new(backend, 96, RetryPolicy::new(2, Duration::ZERO));
        BookIndexer::new(chunker, embedder, "txt")
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("The Way of Kings_3"), "TheWayofKings_3");
        assert_eq!(sanitize_id("Warbreaker (2009)_12"), "Warbreaker2009_12");
        assert_eq!(sanitize_id("elantris_0"), "elantris_0");
    }

    #[test]
    fn test_enrich_assigns_ordinals() {
        let chunks = vec![
            Chunk { content: "a".to_string(), tokens: 1 },
            Chunk { content: "b".to_string(), tokens: 1 },
        ];
        let records = BookIndexer::enrich(
            "The Hero of Ages",
            "books/The Hero of Ages.txt",
            chunks,
            vec![vec![0.1], vec![0.2]],
        );

        assert_eq!(records[0].id, "TheHeroofAges_0");
        assert_eq!(records[1].id, "TheHeroofAges_1");
        assert_eq!(records[1].document, "The Hero of Ages");
        assert_eq!(records[1].content, "b");
        assert_eq!(records[1].vector, vec![0.2]);
    }

    #[tokio::test]
    async fn test_index_corpus_produces_records() {
        let dir = tempdir().unwrap();
        let long: String = (0..40)
            .map(|i| format!("Bridge Four ran bridge number {i} across the chasm.\n"))
            .collect();
        fs::write(dir.path().join("way_of_kings.txt"), &long).unwrap();
        fs::write(dir.path().join("elantris.txt"), "Raoden woke.\n\nKae was quiet.\n").unwrap();
        fs::write(dir.path().join("notes.md"), "not a book").unwrap();

        let backend = Arc::new(LengthEmbeddings::default());
        let outcome = indexer(backend).index_corpus(dir.path(), |_| {}).await.unwrap();

        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.records[0].id, "elantris_0");
        assert_eq!(outcome.records[0].content, "Raoden woke.\nKae was quiet.");
        assert_eq!(outcome.records[0].vector, vec![27.0]);

        let kings: Vec<_> = outcome
            .records
            .iter()
            .filter(|r| r.document == "way_of_kings")
            .collect();
        assert!(kings.len() > 1);
        for (i, record) in kings.iter().enumerate() {
            assert_eq!(record.id, format!("way_of_kings_{i}"));
            assert!(record.path.ends_with("way_of_kings.txt"));
            assert_eq!(record.vector, vec![record.content.len() as f32]);
        }
    }

    #[tokio::test]
    async fn test_failed_document_is_reported_and_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a_mistborn.txt"), "Vin burned pewter.\n").unwrap();
        fs::write(dir.path().join("b_oathbringer.txt"), "A SHARDBLADE appeared.\n").unwrap();
        fs::write(dir.path().join("c_warbreaker.txt"), "Vivenna arrived.\n").unwrap();

        let backend = Arc::new(LengthEmbeddings::default());
        let outcome = indexer(backend.clone()).index_corpus(dir.path(), |_| {}).await.unwrap();

        let documents: Vec<_> = outcome.records.iter().map(|r| r.document.as_str()).collect();
        assert_eq!(documents, vec!["a_mistborn", "c_warbreaker"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].document, "b_oathbringer");
        assert!(outcome.failed[0].error.contains("rejected"));
        // One call each for the good books, two attempts for the bad one.
        assert_eq!(*backend.calls.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_colliding_ids_fail_the_later_document() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("mistborn")).unwrap();
        fs::create_dir_all(dir.path().join("stormlight")).unwrap();
        fs::write(dir.path().join("mistborn/book1.txt"), "Vin burned tin.\n").unwrap();
        fs::write(dir.path().join("stormlight/book1.txt"), "Kaladin fell.\n").unwrap();
        fs::write(dir.path().join("The Way.txt"), "Life before death.\n").unwrap();
        fs::write(dir.path().join("TheWay.txt"), "Strength before weakness.\n").unwrap();

        let backend = Arc::new(LengthEmbeddings::default());
        let mut events = Vec::new();
        let outcome = indexer(backend.clone())
            .index_corpus(dir.path(), |event| match event {
                IndexProgress::Found(total) => events.push(format!("found {total}")),
                IndexProgress::Done(source) => events.push(source.file.clone()),
            })
            .await
            .unwrap();

        let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["TheWay_0", "book1_0"]);
        assert_eq!(outcome.records[0].content, "Life before death.");
        assert_eq!(outcome.records[1].content, "Vin burned tin.");

        let failed: Vec<_> = outcome.failed.iter().map(|f| f.document.as_str()).collect();
        assert_eq!(failed, vec!["TheWay", "book1"]);
        assert!(outcome.failed[1].error.contains("mistborn"));
        assert_eq!(outcome.documents, 4);
        // Colliding documents never reach the embedding service.
        assert_eq!(*backend.calls.lock().unwrap(), 2);

        assert_eq!(events.len(), 5);
        assert_eq!(events[0], "found 4");
    }

    #[tokio::test]
    async fn test_empty_document_makes_no_embedding_call() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("blank.txt"), "\n\n   \n").unwrap();

        let backend = Arc::new(LengthEmbeddings::default());
        let outcome = indexer(backend.clone()).index_corpus(dir.path(), |_| {}).await.unwrap();

        assert!(outcome.records.is_empty());
        assert!(outcome.failed.is_empty());
        assert_eq!(*backend.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_written_records_load_as_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("generated/index.json");
        let records = BookIndexer::enrich(
            "elantris",
            "elantris.txt",
            vec![Chunk { content: "Aon Dor".to_string(), tokens: 3 }],
            vec![vec![1.0, 0.0]],
        );

        write_records(&path, &records).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let keys: Vec<_> = json[0].as_object().unwrap().keys().cloned().collect();
        for key in ["id", "document", "content", "path", "vector"] {
            assert!(keys.contains(&key.to_string()));
        }
        assert_eq!(InMemoryIndex::load(&path).unwrap().len(), 1);
    }
}
