//! # Prompt templates
//!
//! The three prompts that drive a conversation turn:
//!
//! - `assistant`: system prompt of the first model call. Declares the tools through the
//!   `{tools}` placeholder and describes the tool-call JSON format.
//! - `finisher`: system prompt of the follow-up call after a tool result.
//! - `filter`: user prompt of each relevance classification, with `{question}` and
//!   `{passage}` placeholders. The model is asked to reply with the affirmative token
//!   configured in `filter.affirmative`.
//!
//! Templates are YAML documents stored under the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! Missing fields fall back to the built-in prompts, so a template may override only
//! one of them.
//!
//! ```yaml
//! finisher: "You are a Cosmere scholar. Answer using the tool results above."
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::BoxError;

const DEFAULT_ASSISTANT: &str = r#"You are an assistant with access to the following functions.

{tools}

When a function is needed you should generate only a valid JSON with the format:
{
    "function_name": "name of the function",
    "parameters": {
        "parameter1": "value of the parameter",
        "parameter2": "value of the parameter"
    }
}

Follow the next steps:
- Decide whether a function is needed or not.
- If not needed answer the user directly.
- If a function is needed provide the JSON only."#;

const DEFAULT_FINISHER: &str = "You are an assistant. You have the last messages of the user and the tool calls. Provide the best answer to the user.";

const DEFAULT_FILTER: &str = r#"You need to answer a question. To do so you will receive additional information.
Your task is to filter that information, keeping only what could be relevant to answer the question and discarding the rest.
Reply only "yes" or "no" depending on whether the information is useful or not.

Question: {question}

Information to filter:
{passage}

Is it useful or relevant?:"#;

/// The prompts of a conversation turn.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PromptTemplate {
    pub assistant: String,
    pub finisher: String,
    pub filter: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            assistant: DEFAULT_ASSISTANT.to_string(),
            finisher: DEFAULT_FINISHER.to_string(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl PromptTemplate {
    /// The assistant system prompt with the tool declarations filled in.
    pub fn render_assistant(&self, tools: &str) -> String {
        fill(&self.assistant, &[("{tools}", tools)])
    }

    /// One relevance-classification prompt.
    pub fn render_filter(&self, question: &str, passage: &str) -> String {
        fill(&self.filter, &[("{question}", question), ("{passage}", passage)])
    }
}

/// Substitute placeholders in a single pass; substituted text is never rescanned.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for &(key, value) in values {
            if let Some(after) = tail.strip_prefix(key) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Load a prompt template by name from `<config_dir>/templates/<name>.yaml`.
///
/// # Errors
/// Returns an error if the config directory cannot be determined, the file cannot be
/// read, or its YAML is not a [`PromptTemplate`].
pub async fn load_template(name: &str) -> Result<PromptTemplate, BoxError> {
    let path = crate::config_dir()?.join(format!("templates/{}.yaml", name));
    load_template_from(path)
}

/// Load a prompt template from an explicit file path.
pub fn load_template_from(path: impl AsRef<Path>) -> Result<PromptTemplate, BoxError> {
    let path = path.as_ref();
    tracing::info!("Loading template: {}", path.display());

    let content = fs::read_to_string(path)?;
    let template: PromptTemplate = serde_yaml::from_str(&content)?;
    Ok(template)
}
