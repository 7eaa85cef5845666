use serde_json::Value;

use crate::error::LLMError;
use crate::provider::normalize::assemble_message;
use crate::types::{
    ChatChoice, ChatMessagePart, ChatMessageReasoningData, ChatResult, Citation, FinishReason,
    ProviderMetadata, StreamTag, TextPart, ToolCall,
};

use super::types::{OpenAiChatResponse, OpenAiResponseMessage, OpenAiToolCall, SearchResult};

pub(crate) fn map_response(
    resp: OpenAiChatResponse,
    raw: Value,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResult, LLMError> {
    if resp.choices.is_empty() {
        return Err(LLMError::NoChoices);
    }
    let citations = web_citations(resp.citations.as_deref(), resp.search_results.as_deref());

    let choices = resp
        .choices
        .into_iter()
        .map(|choice| ChatChoice {
            index: choice.index,
            message: choice
                .message
                .map(|message| convert_message(message, resp.id.clone(), &citations)),
            delta: None,
            finish_reason: choice.finish_reason.as_deref().map(convert_finish_reason),
        })
        .collect();

    Ok(ChatResult {
        id: resp.id.clone(),
        model: resp.model,
        choices,
        usage: resp.usage.map(|usage| usage.to_usage()),
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: resp.id,
            endpoint: Some(endpoint),
            raw: Some(raw),
        },
        ..ChatResult::default()
    }
    .tagged(StreamTag::AppendToConversation))
}

fn convert_message(
    message: OpenAiResponseMessage,
    id: Option<String>,
    citations: &[Citation],
) -> crate::types::ChatMessage {
    let mut parts = Vec::new();
    if let Some(reasoning) = message.reasoning_text() {
        parts.push(ChatMessagePart::Reasoning(ChatMessageReasoningData {
            content: Some(reasoning.to_string()),
            ..Default::default()
        }));
    }
    let text = message
        .content
        .as_ref()
        .map(|content| content.text())
        .or_else(|| message.refusal.clone())
        .unwrap_or_default();
    if !text.is_empty() {
        parts.push(ChatMessagePart::Text(TextPart {
            text,
            citations: citations.to_vec(),
            extension: None,
        }));
    }

    let calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| convert_tool_call(call).with_index(index))
        .collect();
    assemble_message(id, parts, calls)
}

fn convert_tool_call(call: OpenAiToolCall) -> ToolCall {
    let id = call.id.unwrap_or_default();
    match (call.custom, call.function) {
        (Some(custom), _) => ToolCall::custom(id, custom.name, custom.input),
        (None, Some(function)) => ToolCall::function(
            id,
            function.name.unwrap_or_default(),
            function.arguments.unwrap_or_default(),
        ),
        (None, None) => ToolCall::function(id, call.kind.unwrap_or_default(), ""),
    }
}

/// Perplexity attaches sources at the top level; richer `search_results` win over bare URLs.
pub(crate) fn web_citations(
    urls: Option<&[String]>,
    search_results: Option<&[SearchResult]>,
) -> Vec<Citation> {
    if let Some(results) = search_results.filter(|r| !r.is_empty()) {
        return results
            .iter()
            .map(|result| Citation::WebSearchResultLocation {
                cited_text: result.snippet.clone().unwrap_or_default(),
                url: result.url.clone(),
                title: result.title.clone(),
                encrypted_index: None,
            })
            .collect();
    }
    urls.unwrap_or_default()
        .iter()
        .map(|url| Citation::web(url.clone(), None))
        .collect()
}

pub(crate) fn convert_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" | "end_turn" | "eos" => FinishReason::Stop,
        "length" | "max_tokens" | "model_length" => FinishReason::Length,
        "tool_calls" | "function_call" | "tool_use" => FinishReason::ToolCalls,
        "content_filter" | "safety" => FinishReason::ContentFilter,
        "error" => FinishReason::Error,
        other => FinishReason::Other(other.to_string()),
    }
}
