use std::time::Duration;

use thiserror::Error;

/// Every failure mode a caller can observe from the client, a provider, or a conversation.
///
/// Streaming decode anomalies are reported through [`LLMError::Decode`] as recoverable
/// stream items; all other variants end the operation that produced them.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Connection or HTTP-level failure below the vendor protocol.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Missing, malformed or rejected credentials.
    #[error("auth failure: {message}")]
    Auth { message: String },
    /// The vendor throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        /// Wait suggested by the `Retry-After` header, when numeric.
        retry_after: Option<Duration>,
    },
    /// The prompt or requested completion does not fit the model window.
    #[error("token limit exceeded: {message}")]
    TokenLimitExceeded {
        message: String,
        estimated: Option<usize>,
        limit: Option<usize>,
    },
    /// The request could not be serialized for the selected vendor.
    #[error("invalid request: {message}")]
    Validation { message: String },
    #[error("feature unsupported: {feature}")]
    UnsupportedFeature { feature: &'static str },
    /// The vendor does not know the requested model, or no handle matched.
    #[error("model not found: {message}")]
    ModelNotFound {
        model: Option<String>,
        message: String,
    },
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
    /// The caller's cancellation token fired and error surfacing was requested.
    #[error("request aborted: {message}")]
    Aborted { message: String },
    /// The event stream ended before it produced a single event.
    #[error("stream closed unexpectedly: {message}")]
    StreamClosed { message: String },
    /// A single SSE frame could not be decoded. The stream keeps going after this.
    #[error("decode error from {provider}: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
    /// A completed response carried no choices at all.
    #[error("no choices returned")]
    NoChoices,
    /// Vendor-defined error that has no better mapping.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the provider, such as `openai_chat`.
        provider: &'static str,
        message: String,
    },
    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use polyvox_llm::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given provider name and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use polyvox_llm::error::LLMError;
    ///
    /// let err = LLMError::provider("anthropic_messages", "overloaded");
    /// assert!(matches!(err, LLMError::Provider { provider: "anthropic_messages", .. }));
    /// ```
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    pub(crate) fn aborted() -> Self {
        Self::Aborted {
            message: "cancellation requested by caller".to_string(),
        }
    }

    /// Returns `true` for errors a stream consumer may skip and keep reading past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Returns `true` when an error code or message suggests a context/window overflow.
pub(crate) fn looks_like_token_limit_error(code_hint: Option<&str>, message: &str) -> bool {
    if let Some(code) = code_hint {
        let lower = code.to_ascii_lowercase();
        if matches!(
            lower.as_str(),
            "context_length_exceeded"
                | "max_context_length_exceeded"
                | "prompt_tokens_exceeded"
                | "context_window_exceeded"
        ) || lower.contains("token")
        {
            return true;
        }
    }

    let lower_message = message.to_ascii_lowercase();
    const HINTS: [&str; 7] = [
        "context length",
        "context window",
        "token limit",
        "maximum output tokens",
        "max output tokens",
        "prompt is too long",
        "input is too long",
    ];
    HINTS.iter().any(|needle| lower_message.contains(needle))
}

/// Attempts to extract a quoted model identifier from an error message.
pub(crate) fn extract_model_identifier(message: &str) -> Option<String> {
    ['`', '"', '\'']
        .into_iter()
        .filter_map(|delimiter| between_delimiters(message, delimiter))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn between_delimiters(message: &str, delimiter: char) -> Option<&str> {
    let start = message.find(delimiter)? + delimiter.len_utf8();
    let rest = message.get(start..)?;
    let end = rest.find(delimiter)?;
    Some(&rest[..end])
}

/// Maps an HTTP error status plus the vendor's message onto the taxonomy.
///
/// Context overflow wins over the status code, because vendors report it as a plain
/// 400. `code` is the vendor's machine-readable error code when it sent one.
pub(crate) fn classify_status(
    provider: &'static str,
    status: u16,
    message: String,
    code: Option<&str>,
    retry_after: Option<Duration>,
) -> LLMError {
    if looks_like_token_limit_error(code, &message) {
        return LLMError::TokenLimitExceeded {
            message,
            estimated: None,
            limit: None,
        };
    }
    if status == 404 || matches!(code, Some("not_found" | "model_not_found")) {
        return LLMError::ModelNotFound {
            model: extract_model_identifier(&message),
            message,
        };
    }
    match status {
        401 | 403 => LLMError::Auth { message },
        429 => LLMError::RateLimit {
            message,
            retry_after,
        },
        400 | 422 => LLMError::Validation { message },
        _ => LLMError::Provider { provider, message },
    }
}
