use crate::error::LLMError;
use crate::provider::normalize::assemble_message;
use crate::types::{
    ChatChoice, ChatMessagePart, ChatMessageReasoningData, ChatResult, FinishReason,
    ProviderMetadata, StreamTag, TextPart, ToolCall,
};

use super::types::{AnthropicContentBlock, AnthropicMessageResponse};

/// A completed content block, in the shared model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FinishedBlock {
    Part(ChatMessagePart),
    Tool(ToolCall),
}

/// Splits index-ordered finished blocks into message parts and a numbered tool-call batch.
pub(crate) fn split_blocks(
    blocks: impl IntoIterator<Item = FinishedBlock>,
) -> (Vec<ChatMessagePart>, Vec<ToolCall>) {
    let mut parts = Vec::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block {
            FinishedBlock::Part(part) => parts.push(part),
            FinishedBlock::Tool(call) => {
                let index = calls.len();
                calls.push(call.with_index(index));
            }
        }
    }
    (parts, calls)
}

pub(crate) fn map_response(
    resp: AnthropicMessageResponse,
    provider: &'static str,
    endpoint: String,
) -> Result<ChatResult, LLMError> {
    let raw = serde_json::to_value(&resp).ok();
    let blocks = resp
        .content
        .iter()
        .map(convert_block)
        .collect::<Result<Vec<_>, _>>()?;
    let (parts, calls) = split_blocks(blocks.into_iter().flatten());
    let message = assemble_message(resp.id.clone(), parts, calls);

    Ok(ChatResult {
        id: resp.id.clone(),
        model: resp.model,
        choices: vec![ChatChoice {
            index: 0,
            message: Some(message),
            delta: None,
            finish_reason: resp.stop_reason.as_deref().map(convert_stop_reason),
        }],
        usage: resp.usage.map(|usage| usage.to_usage()),
        provider: ProviderMetadata {
            provider: provider.to_string(),
            request_id: resp.id,
            endpoint: Some(endpoint),
            raw,
        },
        ..ChatResult::default()
    }
    .tagged(StreamTag::AppendToConversation))
}

fn convert_block(block: &AnthropicContentBlock) -> Result<Option<FinishedBlock>, LLMError> {
    let finished = match block.kind.as_str() {
        "text" => FinishedBlock::Part(ChatMessagePart::Text(TextPart {
            text: block.text.clone().unwrap_or_default(),
            citations: block.citations.clone().unwrap_or_default(),
            extension: None,
        })),
        "thinking" => FinishedBlock::Part(ChatMessagePart::Reasoning(ChatMessageReasoningData {
            content: block.thinking.clone(),
            signature: block.signature.clone(),
            redacted: false,
        })),
        "redacted_thinking" => {
            FinishedBlock::Part(ChatMessagePart::Reasoning(ChatMessageReasoningData {
                content: block.data.clone(),
                signature: None,
                redacted: true,
            }))
        }
        "tool_use" => {
            let arguments = match &block.input {
                Some(input) => serde_json::to_string(input).map_err(|err| LLMError::Decode {
                    provider: super::PROVIDER,
                    message: format!("tool_use input is not serializable: {err}"),
                })?,
                None => String::new(),
            };
            FinishedBlock::Tool(ToolCall::function(
                block.id.clone().unwrap_or_default(),
                block.name.clone().unwrap_or_default(),
                arguments,
            ))
        }
        other => {
            tracing::debug!(provider = super::PROVIDER, kind = other, "ignoring content block");
            return Ok(None);
        }
    };
    Ok(Some(finished))
}

pub(crate) fn convert_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" | "model_context_window_exceeded" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}
