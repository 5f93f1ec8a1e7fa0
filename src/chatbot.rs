//! # Dialogue orchestration
//!
//! [`ChatBot`] runs one conversation turn:
//!
//! 1. Send the assistant prompt (with the tool declarations) and the recent history.
//! 2. If the reply is a call to a known tool, decode and run it:
//!    - `create_image`: the tool's status text is the answer.
//!    - `ask_data`: the result goes back to the model as a `tool` message and the
//!      follow-up completion is the answer.
//! 3. Otherwise the reply itself is the answer.
//!
//! A turn never fails. Any error is turned into the assistant's reply so the
//! conversation loop keeps going.

use std::{path::PathBuf, sync::Arc};
use tracing::{debug, error, info};

use crate::BoxError;
use crate::config::{ConversationConfig, CosmereConfig};
use crate::embedding::{Embedder, OpenAiEmbeddings};
use crate::imagegen::{ImageGenerator, StabilityImages, save_image};
use crate::llm::{ChatModel, GenerationOptions, Message, OpenAiChat};
use crate::relevance::RelevanceFilter;
use crate::search::VectorSearch;
use crate::template::PromptTemplate;
use crate::tools::{ASK_DATA, CreateImageArgs, ToolCall, detect_tool_call, tools_json};

/// Status returned by the `create_image` tool.
pub const IMAGE_GENERATED: &str = "Image generated";

/// What the first completion of a turn asked for.
#[derive(Debug)]
enum Decision {
    Answer(String),
    Tool(ToolCall),
}

pub struct ChatBot {
    model: Arc<dyn ChatModel>,
    relevance: RelevanceFilter,
    images: Arc<dyn ImageGenerator>,
    image_dir: PathBuf,
    template: PromptTemplate,
    context_window: usize,
    options: GenerationOptions,
    tools: String,
}

impl ChatBot {
    pub fn new(
        model: Arc<dyn ChatModel>,
        relevance: RelevanceFilter,
        images: Arc<dyn ImageGenerator>,
        image_dir: impl Into<PathBuf>,
        conversation: &ConversationConfig,
        template: PromptTemplate,
    ) -> Result<Self, BoxError> {
        Ok(Self {
            model,
            relevance,
            images,
            image_dir: image_dir.into(),
            template,
            context_window: conversation.context_window,
            options: GenerationOptions {
                temperature: conversation.temperature,
                max_tokens: conversation.max_tokens,
                stop: conversation.stop_words.clone(),
            },
            tools: tools_json()?,
        })
    }

    /// Wire the HTTP service clients described by `config` around `search`.
    pub fn from_config(
        config: &CosmereConfig,
        template: PromptTemplate,
        search: Arc<dyn VectorSearch>,
    ) -> Result<Self, BoxError> {
        let timeout = config.request_timeout_secs;
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(&config.chat, timeout)?);
        let embedder = Embedder::from_config(
            Arc::new(OpenAiEmbeddings::new(&config.embedding, timeout)?),
            &config.embedding,
        );
        let relevance = RelevanceFilter::new(
            model.clone(),
            embedder,
            search,
            config.filter.clone(),
            config.conversation.stop_words.clone(),
            template.clone(),
            config.search.top_k,
        );
        let images = Arc::new(StabilityImages::new(&config.image, timeout)?);

        Self::new(
            model,
            relevance,
            images,
            &config.image.output_dir,
            &config.conversation,
            template,
        )
    }

    /// Run one turn over `messages` and return the messages it generated.
    ///
    /// The caller appends the result to its history. On failure the only generated
    /// message is an assistant message carrying the error text.
    pub async fn chat(&self, messages: &[Message]) -> Vec<Message> {
        match self.try_chat(messages).await {
            Ok(generated) => generated,
            Err(e) => {
                error!("Turn failed: {}", e);
                vec![Message::assistant(e.to_string())]
            }
        }
    }

    async fn try_chat(&self, messages: &[Message]) -> Result<Vec<Message>, BoxError> {
        let history = &messages[messages.len().saturating_sub(self.context_window)..];
        let mut generated = Vec::new();

        let mut request = vec![Message::system(self.template.render_assistant(&self.tools))];
        request.extend_from_slice(history);
        let reply = self.model.complete(&request, &self.options).await?;

        let answer = match Self::decide(reply)? {
            Decision::Answer(text) => text,
            Decision::Tool(ToolCall::CreateImage(args)) => self.create_image(&args).await?,
            Decision::Tool(ToolCall::AskData(args)) => {
                let result = self.relevance.ask_data(&args.search_queries).await?;
                generated.push(Message::tool(ASK_DATA, result));

                let mut followup = vec![Message::system(self.template.finisher.clone())];
                followup.extend_from_slice(history);
                followup.extend_from_slice(&generated);
                self.model.complete(&followup, &self.options).await?
            }
        };

        generated.push(Message::assistant(answer));
        Ok(generated)
    }

    fn decide(reply: String) -> Result<Decision, BoxError> {
        match detect_tool_call(&reply) {
            None => Ok(Decision::Answer(reply)),
            Some(request) => {
                let call = ToolCall::decode(request)?;
                debug!("Dispatching {}", call.name());
                Ok(Decision::Tool(call))
            }
        }
    }

    /// The `create_image` tool: generate, save under the image directory, report.
    pub async fn create_image(&self, args: &CreateImageArgs) -> Result<String, BoxError> {
        let bytes = self
            .images
            .generate(&args.prompt_description, args.style_preset.as_deref())
            .await?;
        let path = save_image(&self.image_dir, &args.prompt_description, &bytes)?;
        info!("Generated image {}", path.display());
        Ok(IMAGE_GENERATED.to_string())
    }
}
