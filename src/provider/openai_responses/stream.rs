//! Normalizer for typed `response.*` stream events.
//!
//! Output items are keyed by `output_index`. Text and reasoning stream as deltas; tool
//! calls accumulate argument fragments until `function_call_arguments.done`. The
//! terminal `response.completed` carries the full output, which wins over what was
//! accumulated when present.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::LLMError;
use crate::provider::normalize::{
    ResultFactory, StreamNormalizer, ToolCallBuilder, assemble_message, parse_payload,
};
use crate::sse::SseEvent;
use crate::types::{
    ChatMessage, ChatMessagePart, ChatMessageReasoningData, ChatResult, Citation, FinishReason,
    TextPart, ToolCall,
};

use super::response::{
    convert_annotation, failure, finish_reason_for, has_tool_calls, message_from_output,
};
use super::types::{Annotation, OutputItem, ResponsesResponse, ResponsesStreamEvent};

pub(crate) struct OpenAiResponsesNormalizer {
    provider: &'static str,
    factory: ResultFactory,
    text: String,
    reasoning: String,
    signature: Option<String>,
    citations: Vec<Citation>,
    calls: BTreeMap<usize, ToolCallBuilder>,
    custom_calls: BTreeSet<usize>,
    response: Option<ResponsesResponse>,
    terminated: bool,
}

impl OpenAiResponsesNormalizer {
    pub(crate) fn new(provider: &'static str, endpoint: String) -> Self {
        Self {
            provider,
            factory: ResultFactory::new(provider, endpoint),
            text: String::new(),
            reasoning: String::new(),
            signature: None,
            citations: Vec::new(),
            calls: BTreeMap::new(),
            custom_calls: BTreeSet::new(),
            response: None,
            terminated: false,
        }
    }

    fn capture_identity(&mut self, response: &ResponsesResponse) {
        if self.factory.id.is_none() {
            self.factory.id = response.id.clone();
        }
        if self.factory.model.is_none() {
            self.factory.model = response.model.clone();
        }
    }

    fn item_added(&mut self, index: usize, item: Value) {
        let Ok(item) = serde_json::from_value::<OutputItem>(item) else {
            return;
        };
        match item {
            OutputItem::FunctionCall {
                id, call_id, name, ..
            } => {
                let call_id = call_id.or(id);
                self.calls
                    .entry(index)
                    .or_default()
                    .absorb(call_id.as_deref(), Some(&name), None);
            }
            OutputItem::CustomToolCall { call_id, name, .. } => {
                self.custom_calls.insert(index);
                self.calls
                    .entry(index)
                    .or_default()
                    .absorb(call_id.as_deref(), Some(&name), None);
            }
            _ => {}
        }
    }

    fn item_done(&mut self, item: Value) {
        if let Ok(OutputItem::Reasoning {
            encrypted_content: Some(signature),
            ..
        }) = serde_json::from_value::<OutputItem>(item)
        {
            self.signature = Some(signature);
        }
    }

    fn accumulated_message(&mut self) -> ChatMessage {
        let mut parts = Vec::new();
        if let Some(part) = self.reasoning_part() {
            parts.push(part);
        }
        if !self.text.is_empty() {
            parts.push(ChatMessagePart::Text(TextPart {
                text: std::mem::take(&mut self.text),
                citations: std::mem::take(&mut self.citations),
                extension: None,
            }));
        }
        let custom = std::mem::take(&mut self.custom_calls);
        let calls: Vec<ToolCall> = std::mem::take(&mut self.calls)
            .into_iter()
            .enumerate()
            .map(|(index, (output_index, builder))| {
                if custom.contains(&output_index) {
                    ToolCall::custom(
                        builder.id.unwrap_or_default(),
                        builder.name.unwrap_or_default(),
                        builder.arguments,
                    )
                    .with_index(index)
                } else {
                    builder.finish(index)
                }
            })
            .collect();
        assemble_message(self.factory.id.clone(), parts, calls)
    }

    fn reasoning_part(&self) -> Option<ChatMessagePart> {
        if self.reasoning.is_empty() && self.signature.is_none() {
            return None;
        }
        Some(ChatMessagePart::Reasoning(ChatMessageReasoningData {
            content: (!self.reasoning.is_empty()).then(|| self.reasoning.clone()),
            signature: self.signature.clone(),
            redacted: false,
        }))
    }
}

impl StreamNormalizer for OpenAiResponsesNormalizer {
    fn on_event(&mut self, event: SseEvent) -> Result<Vec<ChatResult>, LLMError> {
        let Some(event) = parse_payload::<ResponsesStreamEvent>(self.provider, &event) else {
            return Ok(Vec::new());
        };
        let index = event.output_index.unwrap_or(0);
        let mut results = Vec::new();
        match event.kind.as_str() {
            "response.created" | "response.in_progress" | "response.queued" => {
                if let Some(response) = &event.response {
                    self.capture_identity(response);
                }
            }
            "response.output_item.added" => {
                if let Some(item) = event.item {
                    self.item_added(index, item);
                }
            }
            "response.output_item.done" => {
                if let Some(item) = event.item {
                    self.item_done(item);
                }
            }
            "response.output_text.delta" | "response.refusal.delta" => {
                if let Some(delta) = event.delta.filter(|d| !d.is_empty()) {
                    self.text.push_str(&delta);
                    results.push(self.factory.text_delta(0, delta));
                }
            }
            "response.output_text.annotation.added" => {
                if let Some(citation) = event
                    .annotation
                    .and_then(|a| serde_json::from_value::<Annotation>(a).ok())
                    .and_then(convert_annotation)
                {
                    self.citations.push(citation);
                }
            }
            "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
                if let Some(delta) = event.delta.filter(|d| !d.is_empty()) {
                    self.reasoning.push_str(&delta);
                    results.push(self.factory.reasoning_delta(0, delta));
                }
            }
            "response.reasoning_summary_part.added" => {
                // separates summary parts
                if !self.reasoning.is_empty() {
                    self.reasoning.push('\n');
                }
            }
            "response.function_call_arguments.delta"
            | "response.custom_tool_call_input.delta" => {
                self.calls
                    .entry(index)
                    .or_default()
                    .absorb(None, None, event.delta.as_deref());
            }
            "response.function_call_arguments.done" => {
                if let Some(arguments) = event.arguments {
                    self.calls.entry(index).or_default().arguments = arguments;
                }
            }
            "response.completed" | "response.incomplete" | "response.failed" => {
                let response = event.response.unwrap_or_default();
                self.capture_identity(&response);
                if let Some(message) = failure(&response) {
                    return Err(LLMError::provider(self.provider, message));
                }
                self.response = Some(response);
            }
            "error" => {
                let message = event.message.unwrap_or_else(|| "stream error".to_string());
                let message = match event.code {
                    Some(code) => format!("{message} ({code})"),
                    None => message,
                };
                return Err(LLMError::provider(self.provider, message));
            }
            other => {
                tracing::trace!(provider = self.provider, event = other, "ignoring event");
            }
        }
        Ok(results)
    }

    fn finish(&mut self) -> Vec<ChatResult> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;

        let mut results = Vec::new();
        if let Some(part) = self.reasoning_part() {
            results.push(self.factory.transient_block(0, part));
        }

        let response = self.response.take();
        let (message, finish_reason, usage) = match response {
            Some(mut response) if !response.output.is_empty() => {
                let output = std::mem::take(&mut response.output);
                let reason = finish_reason_for(&response, has_tool_calls(&output));
                let message = message_from_output(self.factory.id.clone(), output);
                (message, reason, response.usage.map(|u| u.to_usage()))
            }
            Some(response) => {
                let message = self.accumulated_message();
                let reason = finish_reason_for(&response, message.has_tool_calls());
                (message, reason, response.usage.map(|u| u.to_usage()))
            }
            None => {
                // the stream ended before a terminal event
                let message = self.accumulated_message();
                let reason = message.has_tool_calls().then_some(FinishReason::ToolCalls);
                (message, reason, None)
            }
        };
        results.push(self.factory.append_message(message, finish_reason.clone()));
        results.push(self.factory.finish_metadata(usage, finish_reason));
        results
    }
}
