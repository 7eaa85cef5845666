use serde_json::{Value, json};

use crate::error::LLMError;
use crate::provider::normalize::assemble_message;
use crate::types::{
    ChatChoice, ChatMessage, ChatMessagePart, ChatMessageReasoningData, ChatResult, Citation,
    FinishReason, ProviderMetadata, StreamTag, TextPart, ToolCall,
};

use super::types::{Annotation, OutputContent, OutputItem, ResponsesResponse};

pub(crate) fn map_response(
    resp: ResponsesResponse,
    raw: Value,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResult, LLMError> {
    if let Some(error) = failure(&resp) {
        return Err(LLMError::provider(provider, error));
    }
    if resp.output.is_empty() && resp.status.as_deref() == Some("completed") {
        return Err(LLMError::NoChoices);
    }

    let finish_reason = finish_reason_for(&resp, has_tool_calls(&resp.output));
    let message = message_from_output(resp.id.clone(), resp.output);
    Ok(ChatResult {
        id: resp.id.clone(),
        model: resp.model,
        choices: vec![ChatChoice {
            index: 0,
            message: Some(message),
            delta: None,
            finish_reason,
        }],
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

/// Error text of a `failed` response.
pub(crate) fn failure(resp: &ResponsesResponse) -> Option<String> {
    if resp.status.as_deref() != Some("failed") {
        return None;
    }
    let error = resp.error.clone().unwrap_or_default();
    let message = error.message.unwrap_or_else(|| "response failed".to_string());
    Some(match error.code {
        Some(code) => format!("{message} ({code})"),
        None => message,
    })
}

pub(crate) fn has_tool_calls(output: &[OutputItem]) -> bool {
    output.iter().any(|item| {
        matches!(
            item,
            OutputItem::FunctionCall { .. } | OutputItem::CustomToolCall { .. }
        )
    })
}

/// Folds output items into one assistant message: reasoning first, then text, with tool
/// calls numbered in output order.
pub(crate) fn message_from_output(id: Option<String>, output: Vec<OutputItem>) -> ChatMessage {
    let mut reasoning = Vec::new();
    let mut text = Vec::new();
    let mut calls = Vec::new();
    for item in output {
        match item {
            OutputItem::Message { content, .. } => text.extend(content.into_iter().filter_map(convert_content)),
            OutputItem::FunctionCall {
                id,
                call_id,
                name,
                arguments,
            } => {
                let index = calls.len();
                let call_id = call_id.or(id).unwrap_or_default();
                calls.push(ToolCall::function(call_id, name, arguments).with_index(index));
            }
            OutputItem::CustomToolCall {
                call_id,
                name,
                input,
            } => {
                let index = calls.len();
                calls.push(ToolCall::custom(call_id.unwrap_or_default(), name, input).with_index(index));
            }
            OutputItem::Reasoning {
                summary,
                content,
                encrypted_content,
                ..
            } => {
                let body = summary
                    .iter()
                    .chain(content.iter())
                    .map(|entry| entry.text.as_str())
                    .filter(|entry| !entry.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                if body.is_empty() && encrypted_content.is_none() {
                    continue;
                }
                reasoning.push(ChatMessagePart::Reasoning(ChatMessageReasoningData {
                    content: (!body.is_empty()).then_some(body),
                    signature: encrypted_content,
                    redacted: false,
                }));
            }
            OutputItem::Other => {
                tracing::debug!(provider = super::PROVIDER, "skipping unmodeled output item");
            }
        }
    }
    reasoning.extend(text);
    assemble_message(id, reasoning, calls)
}

fn convert_content(content: OutputContent) -> Option<ChatMessagePart> {
    match content {
        OutputContent::OutputText { text, annotations } => Some(ChatMessagePart::Text(TextPart {
            text,
            citations: annotations.into_iter().filter_map(convert_annotation).collect(),
            extension: None,
        })),
        OutputContent::Refusal { refusal } => Some(ChatMessagePart::Text(TextPart {
            text: refusal,
            citations: Vec::new(),
            extension: Some(json!({"openai": "refusal"})),
        })),
        OutputContent::Other => None,
    }
}

pub(crate) fn convert_annotation(annotation: Annotation) -> Option<Citation> {
    match annotation {
        Annotation::UrlCitation { url, title } => Some(Citation::web(url, title)),
        Annotation::Other => None,
    }
}

pub(crate) fn finish_reason_for(
    resp: &ResponsesResponse,
    has_tool_calls: bool,
) -> Option<FinishReason> {
    let reason = match resp.status.as_deref()? {
        "completed" if has_tool_calls => FinishReason::ToolCalls,
        "completed" => FinishReason::Stop,
        "incomplete" => match resp
            .incomplete_details
            .as_ref()
            .and_then(|d| d.reason.as_deref())
        {
            Some("max_output_tokens") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Other(other.to_string()),
            None => FinishReason::Other("incomplete".to_string()),
        },
        "failed" => FinishReason::Error,
        other => FinishReason::Other(other.to_string()),
    };
    Some(reason)
}
