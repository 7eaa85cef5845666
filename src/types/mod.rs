//! Shared data model for messages, tool calls and normalized results.
//!
//! Every provider maps its vendor payloads into these types, both for buffered
//! responses and for the streamed deltas produced by the normalizers.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LLMError;

mod citation;
mod estimate;
mod request;

pub use citation::*;
pub use estimate::*;
pub use request::*;

/// Vendor families the client knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
    Cohere,
    Mistral,
    #[serde(rename = "xai")]
    XAi,
    Perplexity,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Groq,
    #[serde(rename = "openrouter")]
    OpenRouter,
    Custom,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Anthropic => "anthropic",
            Vendor::Google => "google",
            Vendor::Cohere => "cohere",
            Vendor::Mistral => "mistral",
            Vendor::XAi => "xai",
            Vendor::Perplexity => "perplexity",
            Vendor::DeepSeek => "deepseek",
            Vendor::Groq => "groq",
            Vendor::OpenRouter => "openrouter",
            Vendor::Custom => "custom",
        }
    }

    /// Whether the vendor speaks the OpenAI Chat Completions wire format.
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(self, Vendor::Anthropic | Vendor::Google)
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    #[default]
    User,
    Assistant,
    Tool,
    #[serde(other)]
    Unknown,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
            ChatRole::Unknown => "unknown",
        }
    }

    /// Maps vendor role strings, including aliases such as `model` and `developer`.
    pub fn from_vendor(role: &str) -> Self {
        match role {
            "system" | "developer" => ChatRole::System,
            "user" => ChatRole::User,
            "assistant" | "model" => ChatRole::Assistant,
            "tool" | "function" => ChatRole::Tool,
            _ => ChatRole::Unknown,
        }
    }
}

/// A message in a conversation or a response.
///
/// When `parts` is populated the first text part seeds `content`; the reverse
/// never happens. Tool results carry `tool_call_id` and `tool_invocation_succeeded`.
///
/// # Examples
///
/// ```
/// # use polyvox_llm::types::{ChatMessage, ChatMessagePart, ChatRole, TextPart};
/// let msg = ChatMessage::from_parts(
///     ChatRole::Assistant,
///     vec![ChatMessagePart::Text(TextPart::new("Hello")), ChatMessagePart::Text(TextPart::new("!"))],
/// );
/// assert_eq!(msg.content.as_deref(), Some("Hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatMessage {
    /// Opaque correlation token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: ChatRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<ChatMessagePart>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_invocation_succeeded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Token count reported by the vendor; `None` until usage arrives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// Tool-role message answering the call identified by `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        succeeded: bool,
    ) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_invocation_succeeded: Some(succeeded),
            ..Self::default()
        }
    }

    pub fn from_parts(role: ChatRole, parts: Vec<ChatMessagePart>) -> Self {
        let mut message = Self {
            role,
            ..Self::default()
        };
        message.set_parts(parts);
        message
    }

    /// Replaces the parts and reseeds `content` from the first text part.
    pub fn set_parts(&mut self, parts: Vec<ChatMessagePart>) {
        if let Some(text) = parts.iter().find_map(ChatMessagePart::as_text) {
            self.content = Some(text.to_string());
        }
        self.parts = if parts.is_empty() { None } else { Some(parts) };
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = if calls.is_empty() { None } else { Some(calls) };
        self
    }

    /// Plain text of the message: `content`, or all text parts concatenated.
    pub fn text(&self) -> Option<String> {
        if let Some(content) = &self.content {
            return Some(content.clone());
        }
        let parts = self.parts.as_ref()?;
        let joined: String = parts.iter().filter_map(ChatMessagePart::as_text).collect();
        (!joined.is_empty()).then_some(joined)
    }

    pub fn reasoning(&self) -> impl Iterator<Item = &ChatMessageReasoningData> {
        self.parts.iter().flatten().filter_map(|part| match part {
            ChatMessagePart::Reasoning(data) => Some(data),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Number of characters a summarizer or estimator would see for this message.
    pub(crate) fn char_len(&self) -> usize {
        let text = self.text().map(|t| t.chars().count()).unwrap_or_default();
        let calls = self
            .tool_calls
            .iter()
            .flatten()
            .map(|call| call.name().len() + call.arguments().len())
            .sum::<usize>();
        text + calls
    }
}

/// Typed content block inside a [`ChatMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessagePart {
    Text(TextPart),
    Image(ImagePart),
    Audio(AudioPart),
    FileLink(FileLinkPart),
    Reasoning(ChatMessageReasoningData),
    Document(DocumentPart),
    SearchResult(SearchResultPart),
    Video(VideoPart),
}

impl ChatMessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        ChatMessagePart::Text(TextPart::new(text))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChatMessagePart::Text(part) => Some(part.text.as_str()),
            _ => None,
        }
    }

    pub fn citations(&self) -> &[Citation] {
        match self {
            ChatMessagePart::Text(part) => &part.citations,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TextPart {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Vendor-specific fields that have no shared representation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Value>,
}

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Where the bytes of a media part come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    Url {
        url: String,
    },
    Base64 {
        data: String,
        mime_type: Option<String>,
    },
    FileId {
        file_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageDetail {
    Low,
    High,
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePart {
    pub source: MediaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<ImageDetail>,
}

/// Base64 audio clip, e.g. `wav` or `mp3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioPart {
    pub data: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Reference to content previously uploaded to the vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLinkPart {
    pub file_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Reasoning ("thinking") emitted by the model.
///
/// `signature` is the vendor's verification token over the block and must be sent back
/// unchanged on the next turn. Redacted blocks carry the opaque payload in `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatMessageReasoningData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub redacted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPart {
    pub source: MediaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub citations_enabled: bool,
}

/// Search result supplied to the model so its answer can cite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultPart {
    pub source: String,
    pub title: String,
    pub content: Vec<String>,
    #[serde(default)]
    pub citations_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPart {
    pub source: MediaSource,
}

/// Discriminator of a [`ToolCall`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallKind {
    Function,
    Custom,
}

/// A model-requested tool invocation.
///
/// `index` is the position inside a parallel batch. Exactly one payload is present,
/// selected by the `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub call: ToolInvocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolInvocation {
    Function { function: FunctionCall },
    Custom { custom: CustomCall },
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            index: None,
            id: Some(id.into()),
            call: ToolInvocation::Function {
                function: FunctionCall::new(name, arguments),
            },
        }
    }

    pub fn custom(id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            index: None,
            id: Some(id.into()),
            call: ToolInvocation::Custom {
                custom: CustomCall {
                    name: name.into(),
                    input: input.into(),
                    result: None,
                },
            },
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn kind(&self) -> ToolCallKind {
        match self.call {
            ToolInvocation::Function { .. } => ToolCallKind::Function,
            ToolInvocation::Custom { .. } => ToolCallKind::Custom,
        }
    }

    pub fn name(&self) -> &str {
        match &self.call {
            ToolInvocation::Function { function } => &function.name,
            ToolInvocation::Custom { custom } => &custom.name,
        }
    }

    /// Raw argument text: JSON for function calls, free-form input for custom calls.
    pub fn arguments(&self) -> &str {
        match &self.call {
            ToolInvocation::Function { function } => &function.arguments,
            ToolInvocation::Custom { custom } => &custom.input,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionCall> {
        match &self.call {
            ToolInvocation::Function { function } => Some(function),
            ToolInvocation::Custom { .. } => None,
        }
    }

    pub fn result(&self) -> Option<&FunctionResult> {
        match &self.call {
            ToolInvocation::Function { function } => function.result.as_ref(),
            ToolInvocation::Custom { custom } => custom.result.as_ref(),
        }
    }

    pub fn set_result(&mut self, result: FunctionResult) {
        match &mut self.call {
            ToolInvocation::Function { function } => function.result = Some(result),
            ToolInvocation::Custom { custom } => custom.result = Some(result),
        }
    }

    /// Parses the arguments into a JSON object.
    ///
    /// Custom calls whose input is not JSON are exposed as `{"input": <text>}`.
    pub fn arguments_map(&self) -> Result<Map<String, Value>, LLMError> {
        match &self.call {
            ToolInvocation::Function { function } => function.arguments_map(),
            ToolInvocation::Custom { custom } => match parse_arguments(&custom.input) {
                Ok(map) => Ok(map),
                Err(_) => Ok(Map::from_iter([(
                    "input".to_string(),
                    Value::String(custom.input.clone()),
                )])),
            },
        }
    }

    /// Arguments for vendors that replay calls as JSON objects.
    ///
    /// Text that is not a JSON object (a call cut off by the token limit, say) is kept
    /// verbatim under `_raw`, so the history can still be sent.
    pub(crate) fn replay_arguments(&self) -> Map<String, Value> {
        self.arguments_map().unwrap_or_else(|err| {
            tracing::debug!(tool = self.name(), error = %err, "replaying unparseable tool arguments");
            Map::from_iter([("_raw".to_string(), Value::String(self.arguments().to_string()))])
        })
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON argument string exactly as the model produced it.
    #[serde(default)]
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FunctionResult>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
            result: None,
        }
    }

    /// Parses the argument string on demand.
    ///
    /// Empty or whitespace-only arguments mean "no arguments" and produce an empty map.
    ///
    /// # Examples
    ///
    /// ```
    /// # use polyvox_llm::types::FunctionCall;
    /// let call = FunctionCall::new("get_weather", "  ");
    /// assert!(call.arguments_map().unwrap().is_empty());
    ///
    /// let call = FunctionCall::new("get_weather", r#"{"city":"Oslo"}"#);
    /// assert_eq!(call.arguments_map().unwrap()["city"], "Oslo");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Validation`] when the text is not a JSON object.
    pub fn arguments_map(&self) -> Result<Map<String, Value>, LLMError> {
        parse_arguments(&self.arguments)
    }

    /// Deserializes a single argument.
    pub fn argument<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, LLMError> {
        let mut map = self.arguments_map()?;
        map.remove(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| LLMError::Validation {
                message: format!("argument `{key}` of `{}`: {err}", self.name),
            })
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, LLMError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LLMError::Validation {
            message: format!("tool arguments must be a JSON object, got {other}"),
        }),
        Err(err) => Err(LLMError::Validation {
            message: format!("tool arguments are not valid JSON: {err}"),
        }),
    }
}

/// A vendor-defined tool call whose input is free-form text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CustomCall {
    pub name: String,
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<FunctionResult>,
}

/// Outcome of resolving a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub content: String,
    pub invocation_succeeded: bool,
}

impl FunctionResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            invocation_succeeded: true,
        }
    }

    /// Successful result whose content is the JSON encoding of `value`.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, LLMError> {
        let content = serde_json::to_string(value).map_err(|err| LLMError::Validation {
            message: format!("failed to encode tool result: {err}"),
        })?;
        Ok(Self::success(content))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            invocation_succeeded: false,
        }
    }
}

/// Internal discriminator that tells the conversation driver how to treat a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StreamTag {
    /// Incremental fragment for live display.
    #[default]
    Delta,
    /// A finished block (such as reasoning) surfaced before the message ends.
    TransientBlock,
    /// The consolidated message to append to the conversation.
    AppendToConversation,
    /// Final usage and finish reason.
    FinishMetadata,
}

/// Normalized response unit: one buffered response, or one streamed event.
///
/// During streaming each choice carries a `delta` fragment; the finished message
/// arrives in `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
    #[serde(default)]
    pub provider: ProviderMetadata,
    #[serde(skip)]
    pub(crate) tag: StreamTag,
}

impl ChatResult {
    /// The first choice's finished message.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::NoChoices`] when the vendor returned no message at all.
    pub fn first_message(&self) -> Result<&ChatMessage, LLMError> {
        self.choices
            .iter()
            .find_map(|choice| choice.message.as_ref())
            .ok_or(LLMError::NoChoices)
    }

    /// Text of the first finished message, or of the first delta while streaming.
    pub fn text(&self) -> Option<String> {
        let choice = self.choices.first()?;
        choice
            .message
            .as_ref()
            .or(choice.delta.as_ref())
            .and_then(ChatMessage::text)
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.choices
            .iter()
            .find_map(|choice| choice.finish_reason.as_ref())
    }

    pub(crate) fn tagged(mut self, tag: StreamTag) -> Self {
        self.tag = tag;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatChoice {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Token accounting for one request/response pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
}

impl ChatUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            ..Self::default()
        }
    }

    /// Folds a later snapshot into this one.
    ///
    /// Vendors report cumulative counters, so each field keeps the larger value and
    /// the total never drops below prompt plus completion.
    pub fn absorb(&mut self, later: &ChatUsage) {
        self.prompt_tokens = self.prompt_tokens.max(later.prompt_tokens);
        self.completion_tokens = self.completion_tokens.max(later.completion_tokens);
        self.total_tokens = self
            .total_tokens
            .max(later.total_tokens)
            .max(self.prompt_tokens + self.completion_tokens);
        self.reasoning_tokens = max_opt(self.reasoning_tokens, later.reasoning_tokens);
        self.cache_creation_tokens =
            max_opt(self.cache_creation_tokens, later.cache_creation_tokens);
        self.cache_read_tokens = max_opt(self.cache_read_tokens, later.cache_read_tokens);
    }
}

fn max_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other(String),
}

/// Where a result came from, for logs and incident triage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Provider identifier such as `openai_chat`.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Raw vendor payload, kept for buffered responses only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// What a provider can do, so applications can pick a compatible handle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CapabilityDescriptor {
    pub supports_stream: bool,
    pub supports_image_input: bool,
    pub supports_audio_input: bool,
    pub supports_video_input: bool,
    pub supports_tools: bool,
    pub supports_structured_output: bool,
    pub supports_parallel_tool_calls: bool,
    pub supports_reasoning: bool,
}

/// Free-form vendor metadata forwarded untouched.
pub type Metadata = HashMap<String, Value>;
