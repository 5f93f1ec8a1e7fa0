//! # Paragraph chunker
//!
//! Turns an ordered list of paragraphs into token-bounded [`Chunk`]s whose
//! neighbours share a few trailing paragraphs, so a passage cut at a chunk boundary
//! is still retrievable with its context.
//!
//! ## Algorithm
//! A single pass keeps a buffer of paragraphs and its running token total:
//!
//! 1. If adding the next paragraph would make the total reach or exceed
//!    `chunk_size`, the buffer is closed as a chunk and the next buffer starts with
//!    the closed buffer's trailing paragraphs, taken backward until they add up to
//!    at least `chunk_overlap` tokens.
//! 2. A paragraph that alone reaches `chunk_size` is cut by [`Chunker::split_oversized`]
//!    into sentence-aligned pieces, each emitted as its own chunk. No overlap is
//!    carried across it.
//! 3. Anything left in the buffer at the end becomes the last chunk.
//!
//! The running total charges one token for each `\n` joining buffered paragraphs.
//! The overlap window is never trimmed: when the window plus the incoming paragraph
//! already reaches `chunk_size`, that pair is emitted as one over-size chunk and the
//! buffer closes on the next paragraph. Every other chunk stays strictly under
//! `chunk_size`.
//!
//! ```rust
//! use cosmere_chat::chunker::Chunker;
//! use cosmere_chat::tokens::TokenCounter;
//!
//! let chunker = Chunker::new(64, 16, TokenCounter::new("cl100k_base").unwrap()).unwrap();
//! let chunks = chunker.split_paragraphs(&["The Stormlight Archive.", "Words of Radiance."]);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].content, "The Stormlight Archive.\nWords of Radiance.");
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxError;
use crate::config::ChunkingConfig;
use crate::tokens::TokenCounter;

/// Tokens charged for the newline that joins two buffered paragraphs.
const SEPARATOR_TOKENS: usize = 1;

/// A retrievable span of corpus text and its token length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Newline-joined paragraphs, or one piece of an oversized paragraph.
    pub content: String,
    /// Token length of `content` under the chunker's encoding.
    pub tokens: usize,
}

/// Splits paragraphs into overlapping chunks bounded by `chunk_size` tokens.
#[derive(Debug)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    counter: TokenCounter,
}

impl Chunker {
    /// Build a chunker.
    ///
    /// # Errors
    /// `chunk_size` below 2, or an overlap that is not smaller than the chunk size.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        counter: TokenCounter,
    ) -> Result<Self, BoxError> {
        if chunk_size < 2 {
            return Err(format!("chunk_size must be at least 2, got {chunk_size}").into());
        }
        if chunk_overlap >= chunk_size {
            return Err(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )
            .into());
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            counter,
        })
    }

    /// Build a chunker from the `chunking` configuration section.
    pub fn from_config(config: &ChunkingConfig) -> Result<Self, BoxError> {
        let counter = TokenCounter::new(&config.encoding)?;
        Self::new(config.chunk_size, config.chunk_overlap, counter)
    }

    pub fn token_counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Split an ordered list of paragraphs into chunks, preserving order.
    pub fn split_paragraphs<S: AsRef<str>>(&self, paragraphs: &[S]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut buffer: Vec<(&str, usize)> = Vec::new();
        let mut running = 0usize;

        for paragraph in paragraphs {
            let paragraph = paragraph.as_ref();
            let tokens = self.counter.count(paragraph);
            let cost = if buffer.is_empty() {
                tokens
            } else {
                tokens + SEPARATOR_TOKENS
            };

            if !buffer.is_empty() && running + cost >= self.chunk_size {
                chunks.push(self.close(&buffer));
                buffer = self.overlap_window(&buffer);
                running = buffered_tokens(&buffer);
            }

            if tokens >= self.chunk_size {
                debug!(tokens, "Splitting oversized paragraph");
                chunks.extend(self.split_oversized(paragraph));
                buffer.clear();
                running = 0;
                continue;
            }

            if !buffer.is_empty() {
                running += SEPARATOR_TOKENS;
            }
            running += tokens;
            buffer.push((paragraph, tokens));
        }

        if !buffer.is_empty() {
            chunks.push(self.close(&buffer));
        }

        chunks
    }

    /// Cut one oversized paragraph into pieces under `chunk_size` tokens.
    ///
    /// Sentences are merged greedily. A sentence that is itself too long falls back
    /// to words; a single word longer than the limit is kept whole. Pieces are
    /// contiguous slices of the paragraph, so concatenating them gives it back byte
    /// for byte.
    pub fn split_oversized(&self, paragraph: &str) -> Vec<Chunk> {
        let mut units: Vec<&str> = Vec::new();
        for sentence in split_sentences(paragraph) {
            if self.counter.count(sentence) >= self.chunk_size {
                units.extend(sentence.split_inclusive(char::is_whitespace));
            } else {
                units.push(sentence);
            }
        }

        let mut pieces = Vec::new();
        let (mut start, mut end) = (0usize, 0usize);

        for unit in units {
            let next = end + unit.len();
            if end > start && self.counter.count(&paragraph[start..next]) >= self.chunk_size {
                pieces.push(self.make_chunk(paragraph[start..end].to_string()));
                start = end;
            }
            end = next;
        }

        if end > start {
            pieces.push(self.make_chunk(paragraph[start..end].to_string()));
        }

        pieces
    }

    fn close(&self, buffer: &[(&str, usize)]) -> Chunk {
        let content = buffer
            .iter()
            .map(|(paragraph, _)| *paragraph)
            .collect::<Vec<_>>()
            .join("\n");
        self.make_chunk(content)
    }

    /// Trailing paragraphs of a closed buffer, walked backward until they reach the overlap.
    fn overlap_window<'p>(&self, buffer: &[(&'p str, usize)]) -> Vec<(&'p str, usize)> {
        let mut window = Vec::new();
        let mut carried = 0usize;

        for &(paragraph, tokens) in buffer.iter().rev() {
            if carried >= self.chunk_overlap {
                break;
            }
            window.push((paragraph, tokens));
            carried += tokens;
        }

        window.reverse();
        window
    }

    fn make_chunk(&self, content: String) -> Chunk {
        let tokens = self.counter.count(&content);
        Chunk { content, tokens }
    }
}

fn buffered_tokens(buffer: &[(&str, usize)]) -> usize {
    let paragraphs: usize = buffer.iter().map(|(_, tokens)| tokens).sum();
    paragraphs + buffer.len().saturating_sub(1) * SEPARATOR_TOKENS
}

/// Sentence boundaries: terminal punctuation, optional closing quotes/brackets, then whitespace.
///
/// Each sentence keeps the whitespace that follows it, so the slices tile `text`.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?' | '…') {
            continue;
        }

        while let Some(&(_, next)) = chars.peek() {
            if matches!(
                next,
                '.' | '!' | '?' | '…' | '"' | '\'' | '”' | '’' | '»' | ')' | ']'
            ) {
                chars.next();
            } else {
                break;
            }
        }

        if !matches!(chars.peek(), Some(&(_, next)) if next.is_whitespace()) {
            continue;
        }
        while let Some(&(_, next)) = chars.peek() {
            if next.is_whitespace() {
                chars.next();
            } else {
                break;
            }
        }

        let end = chars.peek().map_or(text.len(), |&(idx, _)| idx);
        sentences.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, chunk_overlap: usize) -> Chunker {
        Chunker::new(
            chunk_size,
            chunk_overlap,
            TokenCounter::new("cl100k_base").unwrap(),
        )
        .unwrap()
    }

    fn paragraphs(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("Paragraph {i} tells of the highstorm crossing the Shattered Plains."))
            .collect()
    }

    /// Rebuild the paragraph sequence by dropping the prefix each chunk shares with its predecessor.
    /// Returns the rebuilt sequence and the shared paragraphs for each boundary.
    fn reconstruct(chunks: &[Chunk]) -> (Vec<String>, Vec<Vec<String>>) {
        let mut rebuilt: Vec<String> = Vec::new();
        let mut shared = Vec::new();
        let mut previous: Vec<String> = Vec::new();

        for chunk in chunks {
            let current: Vec<String> = chunk.content.split('\n').map(str::to_string).collect();
            let max = previous.len().min(current.len());
            let overlap = (0..=max)
                .rev()
                .find(|&k| previous[previous.len() - k..] == current[..k])
                .unwrap_or(0);
            shared.push(current[..overlap].to_vec());
            rebuilt.extend(current[overlap..].iter().cloned());
            previous = current;
        }

        (rebuilt, shared)
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let counter = TokenCounter::new("cl100k_base").unwrap();
        assert!(Chunker::new(100, 100, counter).is_err());
        let counter = TokenCounter::new("cl100k_base").unwrap();
        assert!(Chunker::new(1, 0, counter).is_err());
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunker = chunker(64, 16);
        let chunks = chunker.split_paragraphs::<&str>(&[]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunks_stay_under_chunk_size() {
        let chunker = chunker(60, 20);
        let chunks = chunker.split_paragraphs(&paragraphs(40));

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.tokens < 60, "chunk has {} tokens", chunk.tokens);
            assert_eq!(chunk.tokens, chunker.token_counter().count(&chunk.content));
        }
    }

    #[test]
    fn test_chunks_cover_every_paragraph_in_order() {
        let chunker = chunker(60, 20);
        let input = paragraphs(40);
        let chunks = chunker.split_paragraphs(&input);

        let (rebuilt, _) = reconstruct(&chunks);
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let chunker = chunker(60, 20);
        let chunks = chunker.split_paragraphs(&paragraphs(40));
        let (_, shared) = reconstruct(&chunks);

        for carried in shared.iter().skip(1) {
            let carried_tokens: usize = carried
                .iter()
                .map(|p| chunker.token_counter().count(p))
                .sum();
            assert!(
                carried_tokens >= 20,
                "only {carried_tokens} tokens carried over"
            );
        }
    }

    #[test]
    fn test_overlap_survives_uneven_paragraphs() {
        const WORDS: [&str; 6] = ["spren", "glyph", "storm", "oath", "shard", "light"];
        let chunker = chunker(60, 20);
        let count = |p: &str| chunker.token_counter().count(p);
        let input: Vec<String> = (0..80)
            .map(|i| {
                let words = 3 + (i * 7) % 31;
                let filler: Vec<&str> = (0..words).map(|w| WORDS[(i + w) % WORDS.len()]).collect();
                format!("Paragraph {i} {}", filler.join(" "))
            })
            .collect();
        assert!(input.iter().all(|p| count(p.as_str()) < 60));

        let chunks = chunker.split_paragraphs(&input);
        let (rebuilt, shared) = reconstruct(&chunks);
        assert_eq!(rebuilt, input);

        for (i, chunk) in chunks.iter().enumerate().skip(1) {
            let previous: Vec<&str> = chunks[i - 1].content.split('\n').collect();
            let previous_tokens: usize = previous.iter().map(|p| count(*p)).sum();
            let carried_tokens: usize = shared[i].iter().map(|p| count(p.as_str())).sum();
            assert!(
                carried_tokens >= 20 || shared[i].len() == previous.len(),
                "chunk {i} carries {carried_tokens} of {previous_tokens} tokens"
            );

            if chunk.tokens >= 60 {
                let fresh = chunk.content.split('\n').count() - shared[i].len();
                assert_eq!(fresh, 1, "chunk {i} grew past the overlap plus one paragraph");
            }
        }
    }

    #[test]
    fn test_zero_overlap_shares_nothing() {
        let chunker = chunker(60, 0);
        let input = paragraphs(12);
        let chunks = chunker.split_paragraphs(&input);

        let total: usize = chunks.iter().map(|c| c.content.split('\n').count()).sum();
        assert_eq!(total, input.len());
    }

    #[test]
    fn test_reaching_the_limit_closes_the_chunk() {
        let counter = TokenCounter::new("cl100k_base").unwrap();
        let a = "Szeth wept as he killed.";
        let b = "Dalinar read the Way of Kings.";
        let joined = counter.count(a) + SEPARATOR_TOKENS + counter.count(b);

        let exact = Chunker::new(joined, 0, counter).unwrap();
        assert_eq!(exact.split_paragraphs(&[a, b]).len(), 2);

        let roomy = chunker(joined + 1, 0);
        let chunks = roomy.split_paragraphs(&[a, b]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, format!("{a}\n{b}"));
    }

    #[test]
    fn test_oversized_paragraph_splits_on_sentences() {
        let chunker = chunker(30, 5);
        let sentences: Vec<String> = (0..12)
            .map(|i| format!("Sentence number {i} describes a spren."))
            .collect();
        let paragraph = sentences.join(" ");

        let chunks = chunker.split_paragraphs(&[paragraph.as_str()]);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.tokens < 30);
            assert!(chunk.content.trim_end().ends_with('.'));
        }
        let rejoined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rejoined, paragraph);
    }

    #[test]
    fn test_oversized_sentence_keeps_its_whitespace() {
        let chunker = chunker(12, 2);
        let separators = ["\t", "  ", " "];
        let mut paragraph = String::from("Kaladin");
        for i in 0..40 {
            paragraph.push_str(separators[i % separators.len()]);
            paragraph.push_str(["ran", "the", "chasm", "bridge"][i % 4]);
        }

        let chunks = chunker.split_paragraphs(&[paragraph.as_str()]);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.tokens < 12, "piece has {} tokens", chunk.tokens);
            assert!(paragraph.contains(&chunk.content));
        }
        let rejoined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rejoined, paragraph);
        assert!(chunks.iter().any(|c| c.content.trim().contains('\t')));
        assert!(chunks.iter().any(|c| c.content.trim().contains("  ")));
    }

    #[test]
    fn test_unsplittable_word_is_kept_whole() {
        let chunker = chunker(10, 2);
        let word = "x".repeat(400);

        let chunks = chunker.split_paragraphs(&[word.as_str()]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, word);
        assert!(chunks[0].tokens >= 10);
    }

    #[test]
    fn test_no_overlap_carried_across_oversized_paragraph() {
        let chunker = chunker(30, 10);
        let before = "Before the storm.";
        let huge = (0..10)
            .map(|i| format!("Sentence {i} of a very long paragraph."))
            .collect::<Vec<_>>()
            .join(" ");
        let after = "After the storm.";

        let chunks = chunker.split_paragraphs(&[before, huge.as_str(), after]);

        assert_eq!(chunks.first().unwrap().content, before);
        assert_eq!(chunks.last().unwrap().content, after);
    }

    #[test]
    fn test_split_sentences_keeps_closing_quotes() {
        let sentences = split_sentences("He said \"Stop!\" Then he left.  Done");
        assert_eq!(sentences, vec!["He said \"Stop!\" ", "Then he left.  ", "Done"]);
    }
}
