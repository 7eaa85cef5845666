use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChatMessage, Metadata};

/// Which vendor API surface serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndpointSurface {
    /// Chat Completions style endpoint.
    #[default]
    Chat,
    /// Responses style endpoint with server-side state and built-in tools.
    Responses,
}

/// A vendor-neutral chat request.
///
/// # Examples
///
/// ```
/// # use polyvox_llm::types::{ChatMessage, ChatOptions, ChatRequest};
/// let request = ChatRequest::new(vec![
///     ChatMessage::system("You are concise."),
///     ChatMessage::user("Summarize Rust traits."),
/// ])
/// .with_options(ChatOptions { temperature: Some(0.3), ..Default::default() });
/// assert_eq!(request.messages.len(), 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Explicit endpoint override; wins over catalog metadata.
    #[serde(default)]
    pub surface: Option<EndpointSurface>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_surface(mut self, surface: EndpointSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    /// True when the request uses a parameter only the Responses surface understands.
    pub fn uses_advanced_parameters(&self) -> bool {
        self.options.previous_response_id.is_some()
            || self.options.background.is_some()
            || self
                .tools
                .iter()
                .any(|tool| !matches!(tool.kind, ToolKind::Function))
    }
}

/// Sampling and generation knobs.
///
/// Every field is optional. Values are layered with [`ChatOptions::layered`]: the
/// request wins, then the conversation defaults, then the library defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub seed: Option<i64>,
    pub parallel_tool_calls: Option<bool>,
    pub reasoning: Option<ReasoningOptions>,
    /// Continue server-side state of an earlier Responses call.
    pub previous_response_id: Option<String>,
    /// Run a Responses call in background mode.
    pub background: Option<bool>,
    /// Vendor-specific top-level fields forwarded untouched.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl ChatOptions {
    /// Fills every unset field from `fallback`. `extra` entries merge key by key.
    pub fn or(self, fallback: &ChatOptions) -> ChatOptions {
        let mut extra = fallback.extra.clone();
        extra.extend(self.extra);
        ChatOptions {
            model: self.model.or_else(|| fallback.model.clone()),
            temperature: self.temperature.or(fallback.temperature),
            top_p: self.top_p.or(fallback.top_p),
            max_output_tokens: self.max_output_tokens.or(fallback.max_output_tokens),
            presence_penalty: self.presence_penalty.or(fallback.presence_penalty),
            frequency_penalty: self.frequency_penalty.or(fallback.frequency_penalty),
            stop: self.stop.or_else(|| fallback.stop.clone()),
            seed: self.seed.or(fallback.seed),
            parallel_tool_calls: self.parallel_tool_calls.or(fallback.parallel_tool_calls),
            reasoning: self.reasoning.or_else(|| fallback.reasoning.clone()),
            previous_response_id: self
                .previous_response_id
                .or_else(|| fallback.previous_response_id.clone()),
            background: self.background.or(fallback.background),
            extra,
        }
    }

    /// Merges three layers: `request` over `conversation` over `library`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use polyvox_llm::types::ChatOptions;
    /// let request = ChatOptions { temperature: Some(0.1), ..Default::default() };
    /// let conversation = ChatOptions { temperature: Some(0.9), max_output_tokens: Some(512), ..Default::default() };
    /// let library = ChatOptions { max_output_tokens: Some(4096), top_p: Some(1.0), ..Default::default() };
    ///
    /// let merged = ChatOptions::layered(&request, &conversation, &library);
    /// assert_eq!(merged.temperature, Some(0.1));
    /// assert_eq!(merged.max_output_tokens, Some(512));
    /// assert_eq!(merged.top_p, Some(1.0));
    /// ```
    pub fn layered(
        request: &ChatOptions,
        conversation: &ChatOptions,
        library: &ChatOptions,
    ) -> ChatOptions {
        request.clone().or(&conversation.clone().or(library))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReasoningOptions {
    pub effort: Option<ReasoningEffort>,
    /// Token budget for vendors that take one (Anthropic, Gemini).
    pub budget_tokens: Option<u32>,
    /// Ask for summarized reasoning where the vendor supports it.
    #[serde(default)]
    pub include_summary: bool,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
    Custom(String),
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &str {
        match self {
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::Custom(value) => value,
        }
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema of the arguments object.
    pub input_schema: Option<Value>,
    pub kind: ToolKind,
    /// Vendor-specific fields merged into the serialized tool.
    pub metadata: Option<Metadata>,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: Some(input_schema),
            kind: ToolKind::Function,
            metadata: None,
        }
    }
}

/// Tool categories. Everything other than `Function` is a vendor built-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolKind {
    Function,
    FileSearch,
    WebSearch,
    ComputerUse,
    CodeInterpreter,
    /// Vendor built-in described entirely by `config`.
    Custom { name: String, config: Option<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    /// The model must call at least one tool.
    Any,
    None,
    Tool { name: String },
    Custom(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { name: Option<String>, schema: Value },
    Custom(Value),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn layering_prefers_request_then_conversation_then_library() {
        let request = ChatOptions {
            model: Some("request-model".into()),
            extra: HashMap::from([("service_tier".into(), json!("flex"))]),
            ..Default::default()
        };
        let conversation = ChatOptions {
            model: Some("conversation-model".into()),
            temperature: Some(0.5),
            extra: HashMap::from([
                ("service_tier".into(), json!("default")),
                ("user".into(), json!("u-1")),
            ]),
            ..Default::default()
        };
        let library = ChatOptions {
            temperature: Some(1.0),
            max_output_tokens: Some(1024),
            ..Default::default()
        };

        let merged = ChatOptions::layered(&request, &conversation, &library);
        assert_eq!(merged.model.as_deref(), Some("request-model"));
        assert_eq!(merged.temperature, Some(0.5));
        assert_eq!(merged.max_output_tokens, Some(1024));
        assert_eq!(merged.extra["service_tier"], json!("flex"));
        assert_eq!(merged.extra["user"], json!("u-1"));
    }

    #[test]
    fn layering_never_mutates_inputs() {
        let library = ChatOptions {
            top_p: Some(0.9),
            ..Default::default()
        };
        let snapshot = library.clone();
        let _ = ChatOptions::layered(&ChatOptions::default(), &ChatOptions::default(), &library);
        assert_eq!(library, snapshot);
    }

    #[test]
    fn built_in_tools_count_as_advanced_parameters() {
        let mut request = ChatRequest::new(vec![ChatMessage::user("hi")]);
        assert!(!request.uses_advanced_parameters());
        request.tools.push(ToolDefinition {
            name: "web".into(),
            description: None,
            input_schema: None,
            kind: ToolKind::WebSearch,
            metadata: None,
        });
        assert!(request.uses_advanced_parameters());
    }
}
