//! Normalizer for data-only Chat Completions streams.
//!
//! There are no block events here: text and reasoning arrive as plain deltas, and tool
//! calls arrive as fragments keyed by `tool_calls[].index`. Everything is finalized
//! when the stream ends.

use std::collections::BTreeMap;

use crate::error::LLMError;
use crate::provider::normalize::{
    ResultFactory, StreamNormalizer, ToolCallBuilder, assemble_message, parse_payload,
};
use crate::sse::SseEvent;
use crate::types::{
    ChatMessagePart, ChatMessageReasoningData, ChatResult, ChatUsage, Citation, FinishReason,
    TextPart,
};

use super::response::{convert_finish_reason, web_citations};
use super::types::{OpenAiStreamChunk, OpenAiToolCallDelta};

pub(crate) struct OpenAiChatNormalizer {
    provider: &'static str,
    factory: ResultFactory,
    text: String,
    reasoning: String,
    tools: BTreeMap<usize, ToolCallBuilder>,
    citations: Vec<Citation>,
    finish_reason: Option<FinishReason>,
    usage: Option<ChatUsage>,
    terminated: bool,
}

impl OpenAiChatNormalizer {
    pub(crate) fn new(provider: &'static str, endpoint: String) -> Self {
        Self {
            provider,
            factory: ResultFactory::new(provider, endpoint),
            text: String::new(),
            reasoning: String::new(),
            tools: BTreeMap::new(),
            citations: Vec::new(),
            finish_reason: None,
            usage: None,
            terminated: false,
        }
    }

    fn absorb_tool_delta(&mut self, delta: OpenAiToolCallDelta) {
        let index = delta.index.unwrap_or_else(|| {
            // some gateways omit the index; a new id starts a new call
            let known = delta.id.as_ref().is_some_and(|id| {
                self.tools
                    .values()
                    .any(|builder| builder.id.as_ref() == Some(id))
            });
            match (&delta.id, known) {
                (Some(_), false) => self.tools.len(),
                _ => self.tools.len().saturating_sub(1),
            }
        });
        let function = delta.function.as_ref();
        self.tools.entry(index).or_default().absorb(
            delta.id.as_deref(),
            function.and_then(|f| f.name.as_deref()),
            function.and_then(|f| f.arguments.as_deref()),
        );
    }
}

impl StreamNormalizer for OpenAiChatNormalizer {
    fn on_event(&mut self, event: SseEvent) -> Result<Vec<ChatResult>, LLMError> {
        let Some(chunk) = parse_payload::<OpenAiStreamChunk>(self.provider, &event) else {
            return Ok(Vec::new());
        };
        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(LLMError::provider(self.provider, message));
        }

        if self.factory.id.is_none() {
            self.factory.id = chunk.id;
        }
        if self.factory.model.is_none() {
            self.factory.model = chunk.model;
        }
        if let Some(usage) = chunk.usage {
            let usage = usage.to_usage();
            match &mut self.usage {
                Some(current) => current.absorb(&usage),
                None => self.usage = Some(usage),
            }
        }
        let citations = web_citations(chunk.citations.as_deref(), chunk.search_results.as_deref());
        if !citations.is_empty() {
            // later chunks repeat the full list
            self.citations = citations;
        }

        let mut results = Vec::new();
        for choice in chunk.choices {
            if choice.index != 0 {
                tracing::debug!(provider = self.provider, index = choice.index, "ignoring extra choice");
                continue;
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.finish_reason = Some(convert_finish_reason(reason));
            }
            let Some(delta) = choice.delta else {
                continue;
            };

            if let Some(reasoning) = delta
                .reasoning_content
                .or(delta.reasoning)
                .filter(|r| !r.is_empty())
            {
                self.reasoning.push_str(&reasoning);
                results.push(self.factory.reasoning_delta(0, reasoning));
            }
            if let Some(text) = delta.content.map(|c| c.text()).filter(|t| !t.is_empty()) {
                self.text.push_str(&text);
                results.push(self.factory.text_delta(0, text));
            }
            for call in delta.tool_calls.into_iter().flatten() {
                self.absorb_tool_delta(call);
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
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            let part = ChatMessagePart::Reasoning(ChatMessageReasoningData {
                content: Some(std::mem::take(&mut self.reasoning)),
                ..Default::default()
            });
            results.push(self.factory.transient_block(0, part.clone()));
            parts.push(part);
        }
        if !self.text.is_empty() {
            parts.push(ChatMessagePart::Text(TextPart {
                text: std::mem::take(&mut self.text),
                citations: std::mem::take(&mut self.citations),
                extension: None,
            }));
        }
        let calls: Vec<_> = std::mem::take(&mut self.tools)
            .into_values()
            .enumerate()
            .map(|(index, builder)| builder.finish(index))
            .collect();
        if !calls.is_empty() && self.finish_reason.is_none() {
            self.finish_reason = Some(FinishReason::ToolCalls);
        }

        let message = assemble_message(self.factory.id.clone(), parts, calls);
        results.push(
            self.factory
                .append_message(message, self.finish_reason.clone()),
        );
        results.push(
            self.factory
                .finish_metadata(self.usage, self.finish_reason.clone()),
        );
        results
    }
}
