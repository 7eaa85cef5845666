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
use super::error::parse_openai_error;
use super::response::map_response;
use super::stream::OpenAiChatNormalizer;
use super::types::OpenAiChatResponse;

/// Base URL of each vendor's Chat Completions API, version segment included.
pub(crate) fn default_base_url(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::Mistral => "https://api.mistral.ai/v1",
        Vendor::XAi => "https://api.x.ai/v1",
        Vendor::Perplexity => "https://api.perplexity.ai",
        Vendor::DeepSeek => "https://api.deepseek.com/v1",
        Vendor::Groq => "https://api.groq.com/openai/v1",
        Vendor::OpenRouter => "https://openrouter.ai/api/v1",
        Vendor::Cohere => "https://api.cohere.ai/compatibility/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Chat Completions provider for OpenAI and every vendor that speaks its wire format.
///
/// The vendor only changes the default base URL and which request serializer runs;
/// responses and streams are decoded the same way for all of them.
pub struct OpenAiChatProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) vendor: Vendor,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) organization: Option<String>,
    pub(crate) project: Option<String>,
    pub(crate) default_model: Option<String>,
}

impl OpenAiChatProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self::for_vendor(transport, Vendor::OpenAi, api_key)
    }

    /// Provider for an OpenAI-compatible vendor, pointed at its public endpoint.
    pub fn for_vendor(
        transport: DynHttpTransport,
        vendor: Vendor,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            vendor,
            base_url: default_base_url(vendor).to_string(),
            api_key: api_key.into(),
            organization: None,
            project: None,
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sends `OpenAI-Organization`.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Sends `OpenAI-Project`.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_headers(&self, stream: bool) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert("Accept".to_string(), accept.to_string());
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }
        if let Some(project) = &self.project {
            headers.insert("OpenAI-Project".to_string(), project.clone());
        }
        headers
    }

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Result<Value, LLMError> {
        let model = resolve_model(request, self.default_model.as_ref(), PROVIDER)?;
        serialize(self.vendor, EndpointSurface::Chat, request, &model, stream)
    }
}

#[async_trait]
impl LLMProvider for OpenAiChatProvider {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult, LLMError> {
        let body = self.build_request_body(&request, false)?;
        let (parsed, raw): (OpenAiChatResponse, _) = post_for_json(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(false),
            &body,
            cancel,
            PROVIDER,
            parse_openai_error,
        )
        .await?;
        map_response(parsed, raw, PROVIDER, self.endpoint())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        let body = self.build_request_body(&request, true)?;
        let stream = post_for_stream(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(true),
            &body,
            cancel,
            PROVIDER,
            parse_openai_error,
        )
        .await?;
        Ok(normalized_stream(
            stream,
            PROVIDER,
            OpenAiChatNormalizer::new(PROVIDER, self.endpoint()),
            cancel,
        ))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        let openai = self.vendor == Vendor::OpenAi;
        CapabilityDescriptor {
            supports_stream: true,
            supports_image_input: true,
            supports_audio_input: openai,
            supports_video_input: false,
            supports_tools: self.vendor != Vendor::Perplexity,
            supports_structured_output: true,
            supports_parallel_tool_calls: self.vendor != Vendor::Perplexity,
            supports_reasoning: matches!(
                self.vendor,
                Vendor::OpenAi | Vendor::DeepSeek | Vendor::XAi | Vendor::Groq | Vendor::OpenRouter
            ),
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn vendor(&self) -> Vendor {
        self.vendor
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
    use crate::types::{ChatMessage, ChatOptions, FinishReason};

    fn request() -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user("hello")])
    }

    #[tokio::test]
    async fn chat_sends_bearer_auth_and_maps_reply() {
        let transport = ScriptedTransport::new(vec![Scripted::Json(
            200,
            json!({
                "id": "chatcmpl-1", "model": "gpt-4o-mini",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hi"}, "finish_reason": "stop"}]
            })
            .to_string(),
        )]);
        let provider = OpenAiChatProvider::new(transport.clone(), "sk-test")
            .with_organization("org-1")
            .with_default_model("gpt-4o-mini");
        let result = provider
            .chat(request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text().as_deref(), Some("Hi"));
        assert_eq!(result.finish_reason(), Some(&FinishReason::Stop));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(requests[0].headers["Authorization"], "Bearer sk-test");
        assert_eq!(requests[0].headers["OpenAI-Organization"], "org-1");
    }

    #[tokio::test]
    async fn compatible_vendors_use_their_own_endpoint() {
        let transport = ScriptedTransport::new(vec![Scripted::Json(
            200,
            json!({"id": "x", "model": "mistral-large-latest",
                   "choices": [{"index": 0, "message": {"role": "assistant", "content": "Bonjour"}}]})
            .to_string(),
        )]);
        let provider = OpenAiChatProvider::for_vendor(transport.clone(), Vendor::Mistral, "key");
        let request = request().with_options(ChatOptions {
            model: Some("mistral-large-latest".into()),
            ..Default::default()
        });
        provider.chat(request, &CancellationToken::new()).await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "https://api.mistral.ai/v1/chat/completions");
        assert_eq!(provider.vendor(), Vendor::Mistral);
    }

    #[tokio::test]
    async fn missing_model_is_a_validation_error() {
        let transport = ScriptedTransport::new(vec![]);
        let err = OpenAiChatProvider::new(transport, "sk")
            .chat(request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Validation { .. }));
    }

    #[tokio::test]
    async fn stream_requests_usage_and_yields_terminal_pair() {
        let body = concat!(
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"He\"}}]}\n\n",
            "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"llo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
            "data: [DONE]\n\n",
        );
        let transport = ScriptedTransport::new(vec![Scripted::Stream(
            200,
            ScriptedTransport::chunked(body, 9),
        )]);
        let provider =
            OpenAiChatProvider::new(transport.clone(), "sk").with_default_model("gpt-4o");
        let results: Vec<_> = provider
            .stream_chat(request(), &CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(results.len(), 4);
        let appended = results[2].as_ref().unwrap();
        assert_eq!(appended.text().as_deref(), Some("Hello"));
        assert_eq!(results[3].as_ref().unwrap().usage.unwrap().total_tokens, 7);

        let sent = transport.request_bodies();
        assert_eq!(sent[0]["stream"], json!(true));
        assert_eq!(sent[0]["stream_options"]["include_usage"], json!(true));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let transport = ScriptedTransport::new(vec![Scripted::Json(
            429,
            r#"{"error":{"message":"slow down","type":"requests","code":"rate_limit_exceeded"}}"#
                .to_string(),
        )]);
        let err = OpenAiChatProvider::new(transport, "sk")
            .with_default_model("gpt-4o")
            .chat(request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::RateLimit { .. }));
    }
}
