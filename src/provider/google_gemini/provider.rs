use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::normalize::normalized_stream;
use crate::provider::{ChatStream, LLMProvider, post_for_json, post_for_stream, resolve_model};
use crate::request::serialize;
use crate::types::{CapabilityDescriptor, ChatRequest, ChatResult, EndpointSurface, Vendor};

use super::PROVIDER;
use super::error::parse_gemini_error;
use super::response::map_response;
use super::stream::GeminiNormalizer;
use super::types::GeminiGenerateContentResponse;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini GenerateContent provider.
pub struct GoogleGeminiProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: Option<String>,
}

impl GoogleGeminiProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: None,
        }
    }

    /// Overrides the base URL, e.g. for a proxy or a regional endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets a default model such as `gemini-2.5-flash` for requests that omit one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    fn versioned_base(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1beta") || base.ends_with("/v1") {
            base.to_string()
        } else {
            format!("{base}/v1beta")
        }
    }

    pub(crate) fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.versioned_base(), model_path(model))
    }

    pub(crate) fn stream_endpoint(&self, model: &str) -> String {
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.versioned_base(),
            model_path(model)
        )
    }

    fn build_headers(&self, stream: bool) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert("Accept".to_string(), accept.to_string());
        headers
    }

    fn build_request_body(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<(String, Value), LLMError> {
        let model = resolve_model(request, self.default_model.as_ref(), PROVIDER)?;
        let body = serialize(
            Vendor::Google,
            EndpointSurface::Chat,
            request,
            &model,
            stream,
        )?;
        Ok((model, body))
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl LLMProvider for GoogleGeminiProvider {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult, LLMError> {
        let (model, body) = self.build_request_body(&request, false)?;
        let endpoint = self.endpoint(&model);
        let (parsed, raw): (GeminiGenerateContentResponse, _) = post_for_json(
            self.transport.as_ref(),
            endpoint.clone(),
            self.build_headers(false),
            &body,
            cancel,
            PROVIDER,
            parse_gemini_error,
        )
        .await?;
        map_response(parsed, raw, PROVIDER, endpoint)
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        let (model, body) = self.build_request_body(&request, true)?;
        let endpoint = self.stream_endpoint(&model);
        let stream = post_for_stream(
            self.transport.as_ref(),
            endpoint.clone(),
            self.build_headers(true),
            &body,
            cancel,
            PROVIDER,
            parse_gemini_error,
        )
        .await?;
        Ok(normalized_stream(
            stream,
            PROVIDER,
            GeminiNormalizer::new(PROVIDER, endpoint),
            cancel,
        ))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_image_input: true,
            supports_audio_input: true,
            supports_video_input: true,
            supports_tools: true,
            supports_structured_output: true,
            supports_parallel_tool_calls: true,
            supports_reasoning: true,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn vendor(&self) -> Vendor {
        Vendor::Google
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::http::mock::{Scripted, ScriptedTransport};
    use crate::types::ChatMessage;

    fn provider(transport: DynHttpTransport) -> GoogleGeminiProvider {
        GoogleGeminiProvider::new(transport, "g-key").with_default_model("gemini-2.5-flash")
    }

    #[test]
    fn endpoints_put_the_model_in_the_path() {
        let provider = provider(ScriptedTransport::new(vec![]));
        assert_eq!(
            provider.endpoint("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        let proxied = GoogleGeminiProvider::new(ScriptedTransport::new(vec![]), "k")
            .with_base_url("https://proxy.local/v1beta/");
        assert_eq!(
            proxied.stream_endpoint("models/gemini-2.5-pro"),
            "https://proxy.local/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn chat_sends_api_key_header() {
        let transport = ScriptedTransport::new(vec![Scripted::Json(
            200,
            json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hi"}]}, "finishReason": "STOP"}]})
                .to_string(),
        )]);
        let result = provider(transport.clone())
            .chat(
                ChatRequest::new(vec![ChatMessage::user("hello")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.text().as_deref(), Some("Hi"));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].headers["x-goog-api-key"], "g-key");
        assert!(requests[0].url.ends_with("models/gemini-2.5-flash:generateContent"));
    }

    #[tokio::test]
    async fn stream_ends_with_terminal_pair() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        );
        let transport = ScriptedTransport::new(vec![Scripted::Stream(
            200,
            ScriptedTransport::chunked(body, 6),
        )]);
        let results: Vec<_> = provider(transport)
            .stream_chat(
                ChatRequest::new(vec![ChatMessage::user("hello")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(results.len(), 4);
        assert_eq!(results[2].as_ref().unwrap().text().as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn quota_errors_are_rate_limits() {
        let transport = ScriptedTransport::new(vec![Scripted::Json(
            429,
            r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#
                .to_string(),
        )]);
        let err = provider(transport)
            .chat(
                ChatRequest::new(vec![ChatMessage::user("hello")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::RateLimit { .. }));
    }
}
