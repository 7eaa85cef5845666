use serde::Deserialize;
use serde_json::Value;

use crate::types::ChatUsage;

/// GenerateContentResponse; buffered responses and stream chunks share this shape.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiGenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub(crate) prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    pub(crate) usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    pub(crate) model_version: Option<String>,
    #[serde(default)]
    pub(crate) response_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default)]
    pub(crate) finish_reason: Option<String>,
    #[serde(default)]
    pub(crate) index: Option<usize>,
    #[serde(default)]
    pub(crate) grounding_metadata: Option<GeminiGroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
    #[serde(default)]
    pub(crate) role: Option<String>,
}

/// One `Content.parts` entry. Exactly one payload field is normally set.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPart {
    #[serde(default)]
    pub(crate) text: Option<String>,
    /// Marks `text` as a thought summary rather than answer text.
    #[serde(default)]
    pub(crate) thought: Option<bool>,
    #[serde(default)]
    pub(crate) thought_signature: Option<String>,
    #[serde(default, alias = "function_call")]
    pub(crate) function_call: Option<GeminiFunctionCall>,
    #[serde(default, alias = "executable_code")]
    pub(crate) executable_code: Option<GeminiExecutableCode>,
    #[serde(default, alias = "code_execution_result")]
    pub(crate) code_execution_result: Option<GeminiCodeExecutionResult>,
}

impl GeminiPart {
    pub(crate) fn is_thought(&self) -> bool {
        self.thought.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiFunctionCall {
    #[serde(default)]
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: Option<Value>,
}

impl GeminiFunctionCall {
    /// Arguments re-encoded as the JSON object text the shared model carries.
    pub(crate) fn arguments(&self) -> String {
        match &self.args {
            Some(Value::Null) | None => "{}".to_string(),
            Some(args) => args.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiExecutableCode {
    #[serde(default)]
    pub(crate) language: Option<String>,
    pub(crate) code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiCodeExecutionResult {
    #[serde(default)]
    pub(crate) outcome: Option<String>,
    #[serde(default)]
    pub(crate) output: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiGroundingMetadata {
    #[serde(default)]
    pub(crate) grounding_chunks: Vec<GeminiGroundingChunk>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct GeminiGroundingChunk {
    #[serde(default)]
    pub(crate) web: Option<GeminiWebSource>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiWebSource {
    pub(crate) uri: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPromptFeedback {
    #[serde(default)]
    pub(crate) block_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiUsageMetadata {
    #[serde(default)]
    pub(crate) prompt_token_count: Option<u64>,
    #[serde(default)]
    pub(crate) cached_content_token_count: Option<u64>,
    #[serde(default)]
    pub(crate) candidates_token_count: Option<u64>,
    #[serde(default)]
    pub(crate) total_token_count: Option<u64>,
    #[serde(default)]
    pub(crate) thoughts_token_count: Option<u64>,
}

impl GeminiUsageMetadata {
    /// Thought tokens are billed as output, so they count toward completion.
    pub(crate) fn to_usage(self) -> ChatUsage {
        let thoughts = self.thoughts_token_count.unwrap_or(0);
        let mut usage = ChatUsage::new(
            self.prompt_token_count.unwrap_or(0),
            self.candidates_token_count.unwrap_or(0) + thoughts,
        );
        usage.total_tokens = usage.total_tokens.max(self.total_token_count.unwrap_or(0));
        usage.reasoning_tokens = self.thoughts_token_count;
        usage.cache_read_tokens = self.cached_content_token_count;
        usage
    }
}
