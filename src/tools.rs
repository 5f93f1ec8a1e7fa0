//! # Tool protocol
//!
//! The two tools the assistant may call, their JSON-schema declarations, and the
//! detection of a tool call in a model reply.
//!
//! A reply is a tool call only when it is a JSON object with a `function_name` naming a
//! declared tool and a `parameters` member. Anything else is a direct answer. Detection
//! never fails; decoding the parameters of a detected call can.
//!
//! ```rust
//! use cosmere_chat::tools::{detect_tool_call, ToolCall};
//!
//! let reply = r#"{"function_name": "ask_data", "parameters": {"search_queries": ["Who is Hoid?"]}}"#;
//! let request = detect_tool_call(reply).unwrap();
//! assert!(matches!(ToolCall::decode(request).unwrap(), ToolCall::AskData(_)));
//!
//! assert!(detect_tool_call("Hoid is a worldhopper.").is_none());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::BoxError;
use crate::imagegen::STYLE_PRESETS;

pub const ASK_DATA: &str = "ask_data";
pub const CREATE_IMAGE: &str = "create_image";

/// Most queries a single `ask_data` call may carry.
pub const MAX_SEARCH_QUERIES: usize = 5;

/// A tool declaration as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Declarations of every tool, in the order they are presented to the model.
pub fn assistant_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: ASK_DATA,
            description: "Auxiliary function to search for specific excerpts from Brandon Sanderson's books. It has all the excerpts separately accessible for searching.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "search_queries": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "maxItems": MAX_SEARCH_QUERIES,
                        "description": "List of questions. Each element of the list should be a question in the appropriate format. For example: ['Who are Kaladin's companions on bridge 4?']"
                    }
                },
                "required": ["search_queries"]
            }),
        },
        ToolSpec {
            name: CREATE_IMAGE,
            description: "Auxiliary function to generate images from a description using an image generation model. This model only works in English.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "prompt_description": {
                        "type": "string",
                        "description": "Description of the image that should be generated with the AI model. As detailed as possible. This parameter should be always in English."
                    },
                    "style_preset": {
                        "type": "string",
                        "enum": STYLE_PRESETS,
                        "description": format!(
                            "A style preset to guide the image model towards a particular style. It must be one of: {}.",
                            STYLE_PRESETS.join(", ")
                        )
                    }
                },
                "required": ["prompt_description"]
            }),
        },
    ]
}

/// The tool declarations serialized for the system prompt.
pub fn tools_json() -> Result<String, BoxError> {
    Ok(serde_json::to_string_pretty(&assistant_tools())?)
}

/// A reply that names a known tool, with its parameters not yet decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCallRequest {
    pub function_name: String,
    pub parameters: Value,
}

/// Return the tool call in `reply`, if it is one.
///
/// `None` for anything that is not a JSON object carrying both `function_name` and
/// `parameters`, and for calls to tools that are not declared.
pub fn detect_tool_call(reply: &str) -> Option<ToolCallRequest> {
    let request: ToolCallRequest = serde_json::from_str(reply.trim()).ok()?;
    if assistant_tools().iter().any(|t| t.name == request.function_name) {
        debug!("Detected tool call: {:?}", request);
        Some(request)
    } else {
        debug!("Ignoring call to unknown tool {:?}", request.function_name);
        None
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AskDataArgs {
    pub search_queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateImageArgs {
    pub prompt_description: String,
    #[serde(default)]
    pub style_preset: Option<String>,
}

/// A tool call with typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    AskData(AskDataArgs),
    CreateImage(CreateImageArgs),
}

impl ToolCall {
    /// Decode and validate the parameters of a detected call.
    ///
    /// # Errors
    /// Returns an error when the parameters do not match the tool's declaration.
    pub fn decode(request: ToolCallRequest) -> Result<Self, BoxError> {
        match request.function_name.as_str() {
            ASK_DATA => {
                let args: AskDataArgs = serde_json::from_value(request.parameters)
                    .map_err(|e| format!("Invalid parameters for {ASK_DATA}: {e}"))?;
                let n = args.search_queries.len();
                if !(1..=MAX_SEARCH_QUERIES).contains(&n) {
                    return Err(format!(
                        "{ASK_DATA} expects between 1 and {MAX_SEARCH_QUERIES} search queries, got {n}"
                    )
                    .into());
                }
                Ok(ToolCall::AskData(args))
            }
            CREATE_IMAGE => {
                let args: CreateImageArgs = serde_json::from_value(request.parameters)
                    .map_err(|e| format!("Invalid parameters for {CREATE_IMAGE}: {e}"))?;
                if let Some(preset) = &args.style_preset {
                    if !STYLE_PRESETS.contains(&preset.as_str()) {
                        return Err(format!("Unknown style preset {preset:?}").into());
                    }
                }
                Ok(ToolCall::CreateImage(args))
            }
            other => Err(format!("Unknown tool {other:?}").into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::AskData(_) => ASK_DATA,
            ToolCall::CreateImage(_) => CREATE_IMAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_two_tools_are_declared() {
        let tools = assistant_tools();
        let names: Vec<_> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names, vec![ASK_DATA, CREATE_IMAGE]);
        for tool in &tools {
            assert!(!tool.description.is_empty());
            assert_eq!(tool.parameters["type"], "object");
        }
    }

    #[test]
    fn test_tools_json_lists_parameters() {
        let rendered = tools_json().unwrap();
        assert!(rendered.contains("search_queries"));
        assert!(rendered.contains("prompt_description"));
        assert!(rendered.contains("pixel-art"));
    }

    #[test]
    fn test_plain_text_is_not_a_call() {
        assert!(detect_tool_call("Kaladin is a Windrunner.").is_none());
        assert!(detect_tool_call("[1, 2, 3]").is_none());
        assert!(detect_tool_call(r#"{"function_name": "ask_data"}"#).is_none());
    }

    #[test]
    fn test_unknown_tool_is_not_a_call() {
        let reply = r#"{"function_name":"delete_everything","parameters":{}}"#;
        assert!(detect_tool_call(reply).is_none());
    }

    #[test]
    fn test_detects_call_with_surrounding_whitespace() {
        let reply = "\n  {\"function_name\": \"create_image\", \"parameters\": {\"prompt_description\": \"A spren\"}}  \n";
        let request = detect_tool_call(reply).unwrap();
        assert_eq!(request.function_name, CREATE_IMAGE);

        let call = ToolCall::decode(request).unwrap();
        assert_eq!(
            call,
            ToolCall::CreateImage(CreateImageArgs {
                prompt_description: "A spren".to_string(),
                style_preset: None,
            })
        );
        assert_eq!(call.name(), CREATE_IMAGE);
    }

    #[test]
    fn test_bad_parameters_are_an_error() {
        let request = detect_tool_call(
            r#"{"function_name": "ask_data", "parameters": {"queries": ["x"]}}"#,
        )
        .unwrap();
        assert!(ToolCall::decode(request).is_err());

        let request = detect_tool_call(
            r#"{"function_name": "ask_data", "parameters": {"search_queries": []}}"#,
        )
        .unwrap();
        assert!(ToolCall::decode(request).is_err());

        let request = detect_tool_call(
            r#"{"function_name": "create_image", "parameters": {"prompt_description": "x", "style_preset": "oil-paint"}}"#,
        )
        .unwrap();
        let err = ToolCall::decode(request).unwrap_err();
        assert!(err.to_string().contains("oil-paint"));
    }

    #[test]
    fn test_ask_data_decodes_queries() {
        let request = detect_tool_call(
            r#"{"function_name": "ask_data", "parameters": {"search_queries": ["Who is Teft?", "What is Bridge Four?"]}}"#,
        )
        .unwrap();

        match ToolCall::decode(request).unwrap() {
            ToolCall::AskData(args) => assert_eq!(args.search_queries.len(), 2),
            other => panic!("unexpected call {other:?}"),
        }
    }
}
