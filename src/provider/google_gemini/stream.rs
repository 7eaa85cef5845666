//! Normalizer for `streamGenerateContent?alt=sse`.
//!
//! Every chunk is a full GenerateContentResponse carrying only the new parts. Text and
//! thought parts are incremental; function calls always arrive complete.

use crate::error::LLMError;
use crate::provider::normalize::{ResultFactory, StreamNormalizer, parse_payload};
use crate::sse::SseEvent;
use crate::types::{ChatResult, ChatUsage, FinishReason};

use super::response::{CandidateAccumulator, PartDelta, finish_reason_for};
use super::types::GeminiGenerateContentResponse;

pub(crate) struct GeminiNormalizer {
    provider: &'static str,
    factory: ResultFactory,
    candidate: CandidateAccumulator,
    raw_finish: Option<String>,
    blocked: bool,
    usage: Option<ChatUsage>,
    terminated: bool,
}

impl GeminiNormalizer {
    pub(crate) fn new(provider: &'static str, endpoint: String) -> Self {
        Self {
            provider,
            factory: ResultFactory::new(provider, endpoint),
            candidate: CandidateAccumulator::default(),
            raw_finish: None,
            blocked: false,
            usage: None,
            terminated: false,
        }
    }
}

impl StreamNormalizer for GeminiNormalizer {
    fn on_event(&mut self, event: SseEvent) -> Result<Vec<ChatResult>, LLMError> {
        let Some(chunk) = parse_payload::<GeminiGenerateContentResponse>(self.provider, &event)
        else {
            return Ok(Vec::new());
        };
        if self.factory.id.is_none() {
            self.factory.id = chunk.response_id;
        }
        if self.factory.model.is_none() {
            self.factory.model = chunk.model_version;
        }
        if let Some(usage) = chunk.usage_metadata {
            let usage = usage.to_usage();
            match &mut self.usage {
                Some(current) => current.absorb(&usage),
                None => self.usage = Some(usage),
            }
        }
        if chunk
            .prompt_feedback
            .as_ref()
            .is_some_and(|f| f.block_reason.is_some())
        {
            self.blocked = true;
        }

        let mut results = Vec::new();
        for candidate in chunk.candidates {
            if candidate.index.unwrap_or(0) != 0 {
                tracing::debug!(provider = self.provider, "ignoring extra candidate");
                continue;
            }
            self.candidate.absorb_candidate_metadata(&candidate);
            if candidate.finish_reason.is_some() {
                self.raw_finish = candidate.finish_reason.clone();
            }
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                match self.candidate.absorb_part(part) {
                    PartDelta::Text(text) => results.push(self.factory.text_delta(0, text)),
                    PartDelta::Reasoning(text) => {
                        results.push(self.factory.reasoning_delta(0, text))
                    }
                    PartDelta::Other => {}
                }
            }
        }
        Ok(results)
    }

    fn finish(&mut self) -> Vec<ChatResult> {
        if self.terminated {
            return Vec::new();
        }
        self.terminated = true;

        let mut finish_reason =
            finish_reason_for(self.raw_finish.as_deref(), self.candidate.has_tool_calls());
        if finish_reason.is_none() && self.blocked {
            finish_reason = Some(FinishReason::ContentFilter);
        }

        let mut results = Vec::new();
        let candidate = std::mem::take(&mut self.candidate);
        if let Some(reasoning) = candidate.reasoning_part() {
            results.push(self.factory.transient_block(0, reasoning));
        }
        let message = candidate.into_message(self.factory.id.clone());
        results.push(self.factory.append_message(message, finish_reason.clone()));
        results.push(self.factory.finish_metadata(self.usage, finish_reason));
        results
    }
}
