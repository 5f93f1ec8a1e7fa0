//! # Relevance filtering
//!
//! Raw vector-search hits are noisy, so `ask_data` asks the chat model about each
//! candidate passage individually: relevant to the question or not. Candidates are
//! visited best first, in batches; as soon as a batch has produced at least one relevant
//! passage the remaining candidates are skipped.

use std::sync::Arc;
use tracing::{debug, info};

use crate::BoxError;
use crate::config::FilterConfig;
use crate::embedding::Embedder;
use crate::llm::{ChatModel, GenerationOptions, Message};
use crate::search::{SearchHit, VectorSearch, search_knowledgebase};
use crate::template::PromptTemplate;

pub struct RelevanceFilter {
    model: Arc<dyn ChatModel>,
    embedder: Embedder,
    search: Arc<dyn VectorSearch>,
    config: FilterConfig,
    options: GenerationOptions,
    template: PromptTemplate,
    top_k: usize,
}

impl RelevanceFilter {
    /// `stop` is the stop-sequence list sent with every classification call; `top_k`
    /// is the number of neighbours requested per query.
    pub fn new(
        model: Arc<dyn ChatModel>,
        embedder: Embedder,
        search: Arc<dyn VectorSearch>,
        config: FilterConfig,
        stop: Vec<String>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Self {
        let options = GenerationOptions {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop,
        };
        Self {
            model,
            embedder,
            search,
            config,
            options,
            template,
            top_k,
        }
    }

    /// Keep the passages among `hits` that the model judges relevant to `question`.
    ///
    /// Looks at no more than `max_candidates` hits, `batch_size` at a time, and stops
    /// after the first batch that yields anything. Relevant passages are joined with
    /// `\n`. Only a reply exactly equal to the affirmative token counts as relevant.
    pub async fn filter(&self, question: &str, hits: &[SearchHit]) -> Result<String, BoxError> {
        let candidates = &hits[..hits.len().min(self.config.max_candidates)];
        let mut relevant: Vec<&str> = Vec::new();
        let mut calls = 0;

        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            for hit in batch {
                let prompt = self.template.render_filter(question, &hit.content);
                let verdict = self
                    .model
                    .complete(&[Message::user(prompt)], &self.options)
                    .await?;
                calls += 1;

                if verdict == self.config.affirmative {
                    debug!("Hit {} judged relevant", hit.id);
                    relevant.push(&hit.content);
                }
            }

            if !relevant.is_empty() {
                break;
            }
        }

        info!(
            "Filtered {:?}: {} relevant passages after {} of {} candidates",
            question,
            relevant.len(),
            calls,
            candidates.len()
        );

        Ok(relevant.join("\n"))
    }

    /// The `ask_data` tool: search and filter each query in order.
    ///
    /// Results are joined with a blank line; a query with no relevant passage
    /// contributes an empty string.
    pub async fn ask_data(&self, search_queries: &[String]) -> Result<String, BoxError> {
        let mut answers = Vec::with_capacity(search_queries.len());

        for query in search_queries {
            let hits =
                search_knowledgebase(&self.embedder, self.search.as_ref(), query, self.top_k)
                    .await?;
            answers.push(self.filter(query, &hits).await?);
        }

        Ok(answers.join("\n\n"))
    }
}
