use serde_json::json;

use crate::error::LLMError;
use crate::provider::normalize::assemble_message;
use crate::types::{
    ChatChoice, ChatMessage, ChatMessagePart, ChatMessageReasoningData, ChatResult, Citation,
    FinishReason, ProviderMetadata, StreamTag, TextPart, ToolCall,
};

use super::types::{GeminiCandidate, GeminiGenerateContentResponse, GeminiPart};

/// What one part contributed, so the stream can forward it as a delta.
pub(crate) enum PartDelta {
    Text(String),
    Reasoning(String),
    Other,
}

/// Folds candidate parts into one assistant message.
///
/// Buffered responses feed every part at once; the stream feeds them chunk by chunk.
/// Gemini sends function calls whole, so each one becomes a finished call immediately.
#[derive(Debug, Default)]
pub(crate) struct CandidateAccumulator {
    text: String,
    reasoning: String,
    signature: Option<String>,
    code: Vec<ChatMessagePart>,
    calls: Vec<ToolCall>,
    citations: Vec<Citation>,
}

impl CandidateAccumulator {
    pub(crate) fn absorb_part(&mut self, part: GeminiPart) -> PartDelta {
        let thought = part.is_thought();
        if let Some(signature) = part.thought_signature.clone() {
            // later signatures cover everything before them
            self.signature = Some(signature);
        }
        if let Some(call) = part.function_call {
            let index = self.calls.len();
            let id = call
                .id
                .clone()
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            self.calls
                .push(ToolCall::function(id, call.name.clone(), call.arguments()).with_index(index));
            return PartDelta::Other;
        }
        if let Some(code) = part.executable_code {
            self.code.push(ChatMessagePart::Text(TextPart {
                text: code.code,
                citations: Vec::new(),
                extension: Some(json!({"gemini": "executable_code", "language": code.language})),
            }));
            return PartDelta::Other;
        }
        if let Some(result) = part.code_execution_result {
            self.code.push(ChatMessagePart::Text(TextPart {
                text: result.output.unwrap_or_default(),
                citations: Vec::new(),
                extension: Some(
                    json!({"gemini": "code_execution_result", "outcome": result.outcome}),
                ),
            }));
            return PartDelta::Other;
        }
        match part.text.filter(|text| !text.is_empty()) {
            Some(text) if thought => {
                self.reasoning.push_str(&text);
                PartDelta::Reasoning(text)
            }
            Some(text) => {
                self.text.push_str(&text);
                PartDelta::Text(text)
            }
            None => PartDelta::Other,
        }
    }

    pub(crate) fn absorb_candidate_metadata(&mut self, candidate: &GeminiCandidate) {
        let Some(grounding) = &candidate.grounding_metadata else {
            return;
        };
        let citations: Vec<Citation> = grounding
            .grounding_chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .map(|web| Citation::web(web.uri.clone(), web.title.clone()))
            .collect();
        if !citations.is_empty() {
            self.citations = citations;
        }
    }

    pub(crate) fn has_tool_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    /// The finished reasoning block, if the candidate produced one.
    pub(crate) fn reasoning_part(&self) -> Option<ChatMessagePart> {
        if self.reasoning.is_empty() && self.signature.is_none() {
            return None;
        }
        Some(ChatMessagePart::Reasoning(ChatMessageReasoningData {
            content: (!self.reasoning.is_empty()).then(|| self.reasoning.clone()),
            signature: self.signature.clone(),
            redacted: false,
        }))
    }

    pub(crate) fn into_message(self, id: Option<String>) -> ChatMessage {
        let mut parts = Vec::new();
        if let Some(reasoning) = self.reasoning_part() {
            parts.push(reasoning);
        }
        if !self.text.is_empty() {
            parts.push(ChatMessagePart::Text(TextPart {
                text: self.text,
                citations: self.citations,
                extension: None,
            }));
        }
        parts.extend(self.code);
        assemble_message(id, parts, self.calls)
    }
}

pub(crate) fn map_response(
    resp: GeminiGenerateContentResponse,
    raw: serde_json::Value,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResult, LLMError> {
    if resp.candidates.is_empty() {
        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LLMError::provider(
                provider,
                format!("prompt blocked: {reason}"),
            ));
        }
        return Err(LLMError::NoChoices);
    }

    let choices = resp
        .candidates
        .into_iter()
        .enumerate()
        .map(|(position, candidate)| {
            let mut accumulator = CandidateAccumulator::default();
            accumulator.absorb_candidate_metadata(&candidate);
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                accumulator.absorb_part(part);
            }
            let finish_reason = finish_reason_for(
                candidate.finish_reason.as_deref(),
                accumulator.has_tool_calls(),
            );
            ChatChoice {
                index: candidate.index.unwrap_or(position),
                message: Some(accumulator.into_message(resp.response_id.clone())),
                delta: None,
                finish_reason,
            }
        })
        .collect();

    Ok(ChatResult {
        id: resp.response_id.clone(),
        model: resp.model_version,
        choices,
        usage: resp.usage_metadata.map(|usage| usage.to_usage()),
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: resp.response_id,
            endpoint: Some(endpoint),
            raw: Some(raw),
        },
        ..ChatResult::default()
    }
    .tagged(StreamTag::AppendToConversation))
}

/// Gemini reports `STOP` even when the turn ends in function calls.
pub(crate) fn finish_reason_for(reason: Option<&str>, has_tool_calls: bool) -> Option<FinishReason> {
    match reason.map(convert_finish_reason) {
        Some(FinishReason::Stop) | None if has_tool_calls => Some(FinishReason::ToolCalls),
        other => other,
    }
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        other => FinishReason::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::types::ChatRole;

    fn map(value: Value) -> Result<ChatResult, LLMError> {
        let resp = serde_json::from_value(value.clone()).unwrap();
        map_response(resp, value, "google_gemini", "mem://gemini".into())
    }

    #[test]
    fn text_thoughts_and_usage_map() {
        let result = map(json!({
            "responseId": "r-1",
            "modelVersion": "gemini-2.5-flash",
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Considering", "thought": true},
                    {"text": "Hello ", "thoughtSignature": "c2ln"},
                    {"text": "world"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3, "thoughtsTokenCount": 5, "totalTokenCount": 15}
        }))
        .unwrap();

        let message = result.first_message().unwrap();
        assert_eq!(message.role, ChatRole::Assistant);
        assert_eq!(message.content.as_deref(), Some("Hello world"));
        let reasoning = message.reasoning().next().unwrap();
        assert_eq!(reasoning.content.as_deref(), Some("Considering"));
        assert_eq!(reasoning.signature.as_deref(), Some("c2ln"));
        assert_eq!(result.finish_reason(), Some(&FinishReason::Stop));
        let usage = result.usage.unwrap();
        assert_eq!(usage.completion_tokens, 8);
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(usage.reasoning_tokens, Some(5));
    }

    #[test]
    fn function_calls_get_sequential_indices() {
        let result = map(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "weather", "args": {"city": "Oslo"}}},
                    {"functionCall": {"id": "fc-2", "name": "time", "args": {}}}
                ]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        let calls = result.first_message().unwrap().tool_calls.clone().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].index, Some(0));
        assert!(calls[0].id.as_deref().unwrap().starts_with("call_"));
        assert_eq!(calls[0].arguments_map().unwrap()["city"], json!("Oslo"));
        assert_eq!(calls[1].id.as_deref(), Some("fc-2"));
        assert_eq!(calls[1].index, Some(1));
        assert_eq!(result.finish_reason(), Some(&FinishReason::ToolCalls));
    }

    #[test]
    fn grounding_chunks_become_web_citations() {
        let result = map(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Grounded."}]},
                "groundingMetadata": {"groundingChunks": [{"web": {"uri": "https://a.example", "title": "A"}}]}
            }]
        }))
        .unwrap();
        let parts = result.first_message().unwrap().parts.clone().unwrap();
        assert_eq!(
            parts[0].citations(),
            &[Citation::web("https://a.example", Some("A".into()))]
        );
    }

    #[test]
    fn empty_and_blocked_responses_fail() {
        assert!(matches!(map(json!({"candidates": []})), Err(LLMError::NoChoices)));
        assert!(matches!(
            map(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
            Err(LLMError::Provider { .. })
        ));
        assert_eq!(convert_finish_reason("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(convert_finish_reason("MAX_TOKENS"), FinishReason::Length);
    }
}
