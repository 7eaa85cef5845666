use std::collections::HashMap;

use super::{
    AudioPart, ChatMessage, ChatMessagePart, ChatRequest, ChatRole, ImageDetail, ImagePart,
    ResponseFormat, Vendor,
};

/// Tokenizer families with similar characters-per-token behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerFamily {
    /// ~4 ASCII characters per token, closer to 2 for CJK-heavy text.
    OpenAi,
    Anthropic,
    /// Gemini tokenizes English a little more coarsely (~4.5 chars per token).
    Gemini,
}

impl From<Vendor> for TokenizerFamily {
    fn from(vendor: Vendor) -> Self {
        match vendor {
            Vendor::Anthropic => TokenizerFamily::Anthropic,
            Vendor::Google => TokenizerFamily::Gemini,
            _ => TokenizerFamily::OpenAi,
        }
    }
}

/// Deterministic, approximate token counts.
///
/// Good enough for budgeting and for deciding when to compress a conversation; it
/// does not try to match vendor tokenizers exactly.
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    family: TokenizerFamily,
}

const OVERHEAD_PER_MESSAGE: usize = 4;

impl TokenEstimator {
    pub fn new(family: TokenizerFamily) -> Self {
        Self { family }
    }

    pub fn for_vendor(vendor: Vendor) -> Self {
        Self::new(vendor.into())
    }

    pub fn family(&self) -> TokenizerFamily {
        self.family
    }

    pub fn estimate_text(&self, text: &str) -> usize {
        let (total_chars, ascii_chars) = text.chars().fold((0usize, 0usize), |(t, a), ch| {
            (t + 1, a + usize::from(ch.is_ascii()))
        });
        if total_chars == 0 {
            return 0;
        }

        let ascii_ratio = ascii_chars as f64 / total_chars as f64;
        let chars_per_token = match self.family {
            TokenizerFamily::OpenAi | TokenizerFamily::Anthropic => 2.0 + 2.0 * ascii_ratio,
            TokenizerFamily::Gemini => 4.5,
        };

        ((total_chars as f64) / chars_per_token).ceil() as usize
    }

    /// Estimates a message list, with a per-role breakdown.
    ///
    /// # Examples
    ///
    /// ```
    /// # use polyvox_llm::types::{ChatMessage, TokenEstimator, TokenizerFamily};
    /// let estimate = TokenEstimator::new(TokenizerFamily::OpenAi).estimate_messages(&[
    ///     ChatMessage::system("You are terse"),
    ///     ChatMessage::user("Explain enums"),
    /// ]);
    /// assert!(estimate.total > estimate.overhead);
    /// assert!(estimate.by_role.contains_key("system"));
    /// ```
    pub fn estimate_messages(&self, messages: &[ChatMessage]) -> TokenEstimate {
        let mut total = 0usize;
        let mut by_role: HashMap<String, usize> = HashMap::new();

        for message in messages {
            let tokens = OVERHEAD_PER_MESSAGE + self.estimate_message(message);
            *by_role.entry(message.role.as_str().to_string()).or_insert(0) += tokens;
            total += tokens;
        }

        TokenEstimate {
            total,
            by_role,
            overhead: OVERHEAD_PER_MESSAGE * messages.len(),
        }
    }

    pub fn estimate_request(&self, request: &ChatRequest) -> TokenEstimate {
        let mut estimate = self.estimate_messages(&request.messages);
        estimate.total += request.tools.len() * 50;
        if let Some(format) = &request.response_format {
            estimate.total += self.estimate_response_format(format);
        }
        estimate
    }

    fn estimate_message(&self, message: &ChatMessage) -> usize {
        let parts = message.parts.as_deref().unwrap_or_default();
        let mut tokens: usize = parts
            .iter()
            .map(|part| self.estimate_part(part, message.role))
            .sum();

        // content duplicates the first text part when parts are present
        let has_text_part = parts.iter().any(|part| part.as_text().is_some());
        if !has_text_part {
            if let Some(content) = &message.content {
                tokens += self.estimate_text(content);
            }
        }

        for call in message.tool_calls.iter().flatten() {
            tokens += self.estimate_text(call.name()) + self.estimate_text(call.arguments());
        }
        tokens
    }

    fn estimate_part(&self, part: &ChatMessagePart, role: ChatRole) -> usize {
        match part {
            ChatMessagePart::Text(text) => self.estimate_text(&text.text),
            ChatMessagePart::Image(image) => self.estimate_image_tokens(image),
            ChatMessagePart::Audio(audio) => self.estimate_audio_tokens(audio, role),
            ChatMessagePart::Video(_) => 200,
            ChatMessagePart::FileLink(link) => self.estimate_text(&link.file_uri),
            ChatMessagePart::Reasoning(reasoning) => reasoning
                .content
                .as_deref()
                .map(|text| self.estimate_text(text))
                .unwrap_or_default(),
            ChatMessagePart::Document(doc) => {
                doc.title
                    .as_deref()
                    .map(|t| self.estimate_text(t))
                    .unwrap_or_default()
                    + 500
            }
            ChatMessagePart::SearchResult(result) => result
                .content
                .iter()
                .map(|text| self.estimate_text(text))
                .sum(),
        }
    }

    fn estimate_image_tokens(&self, image: &ImagePart) -> usize {
        let base = match self.family {
            TokenizerFamily::Gemini => 600,
            _ => 760,
        };
        match image.detail {
            Some(ImageDetail::High) => base * 2,
            _ => base,
        }
    }

    fn estimate_audio_tokens(&self, audio: &AudioPart, role: ChatRole) -> usize {
        let Some(duration_ms) = audio.duration_ms.filter(|d| *d > 0) else {
            return 0;
        };
        let per_token_ms = if role == ChatRole::Assistant { 50 } else { 100 };
        duration_ms.div_ceil(per_token_ms) as usize
    }

    fn estimate_response_format(&self, format: &ResponseFormat) -> usize {
        match format {
            ResponseFormat::JsonObject => 20,
            ResponseFormat::JsonSchema { schema, .. } => self.estimate_text(&schema.to_string()),
            ResponseFormat::Custom(value) => self.estimate_text(&value.to_string()),
            ResponseFormat::Text => 0,
        }
    }
}

/// Token estimate with a per-role breakdown.
#[derive(Debug, Clone)]
pub struct TokenEstimate {
    pub total: usize,
    pub by_role: HashMap<String, usize>,
    /// Per-message framing overhead included in `total`.
    pub overhead: usize,
}
