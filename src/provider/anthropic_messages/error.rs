use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, classify_status};

use super::PROVIDER;

#[derive(Debug, Deserialize)]
pub(crate) struct AnthropicErrorBody {
    #[serde(default, rename = "type")]
    pub(crate) kind: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

impl AnthropicErrorBody {
    pub(crate) fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match &self.kind {
            Some(kind) => format!("{message} ({kind})"),
            None => message.to_string(),
        }
    }
}

/// Parses an error response from the Messages API.
pub(crate) fn parse_anthropic_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    #[derive(Deserialize)]
    struct Envelope {
        error: Option<AnthropicErrorBody>,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope { error: Some(error) }) => {
            let code = error.kind.as_deref().map(|kind| match kind {
                "not_found_error" => "not_found",
                other => other,
            });
            classify_status(PROVIDER, status, error.describe(), code, retry_after)
        }
        _ => LLMError::Provider {
            provider: PROVIDER,
            message: format!("status {status}: {body}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_rate_limit_errors() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        match parse_anthropic_error(401, body, None) {
            LLMError::Auth { message } => {
                assert!(message.contains("invalid x-api-key"));
                assert!(message.contains("authentication_error"));
            }
            other => panic!("expected Auth, got {other:?}"),
        }

        let body = r#"{"type":"error","error":{"type":"rate_limit_error","message":"Number of request tokens has exceeded your per-minute rate limit"}}"#;
        match parse_anthropic_error(429, body, Some(Duration::from_secs(20))) {
            LLMError::RateLimit { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(20)));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }

    #[test]
    fn model_not_found_and_overflow() {
        let body = r#"{"type":"error","error":{"type":"not_found_error","message":"model: claude-bogus"}}"#;
        assert!(matches!(
            parse_anthropic_error(404, body, None),
            LLMError::ModelNotFound { .. }
        ));

        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"prompt is too long: 212000 tokens > 200000 maximum"}}"#;
        assert!(matches!(
            parse_anthropic_error(400, body, None),
            LLMError::TokenLimitExceeded { .. }
        ));
    }

    #[test]
    fn unparseable_bodies_fall_back_to_provider_error() {
        match parse_anthropic_error(529, "<html>overloaded</html>", None) {
            LLMError::Provider { provider, message } => {
                assert_eq!(provider, "anthropic_messages");
                assert!(message.starts_with("status 529"));
            }
            other => panic!("expected Provider, got {other:?}"),
        }
    }
}
