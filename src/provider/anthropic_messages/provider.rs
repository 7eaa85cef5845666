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
use super::error::parse_anthropic_error;
use super::response::map_response;
use super::stream::AnthropicNormalizer;
use super::types::AnthropicMessageResponse;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";

/// Claude models through the Messages API.
pub struct AnthropicMessagesProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) version: String,
    pub(crate) beta: Option<String>,
    pub(crate) default_model: Option<String>,
}

impl AnthropicMessagesProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            version: DEFAULT_VERSION.to_string(),
            beta: None,
            default_model: None,
        }
    }

    /// Points the provider at a proxy or compatible gateway.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the `anthropic-version` header.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets `anthropic-beta`; takes a comma-separated list.
    pub fn with_beta(mut self, beta: impl Into<String>) -> Self {
        self.beta = Some(beta.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn build_headers(&self, stream: bool) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), self.api_key.clone());
        headers.insert("anthropic-version".to_string(), self.version.clone());
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert("Accept".to_string(), accept.to_string());
        if let Some(beta) = &self.beta {
            headers.insert("anthropic-beta".to_string(), beta.clone());
        }
        headers
    }

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Result<Value, LLMError> {
        let model = resolve_model(request, self.default_model.as_ref(), PROVIDER)?;
        serialize(
            Vendor::Anthropic,
            EndpointSurface::Chat,
            request,
            &model,
            stream,
        )
    }
}

#[async_trait]
impl LLMProvider for AnthropicMessagesProvider {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult, LLMError> {
        let body = self.build_request_body(&request, false)?;
        let (parsed, _raw): (AnthropicMessageResponse, _) = post_for_json(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(false),
            &body,
            cancel,
            PROVIDER,
            parse_anthropic_error,
        )
        .await?;
        map_response(parsed, PROVIDER, self.endpoint())
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
            parse_anthropic_error,
        )
        .await?;
        Ok(normalized_stream(
            stream,
            PROVIDER,
            AnthropicNormalizer::new(self.endpoint()),
            cancel,
        ))
    }

    fn capabilities(&self) -> CapabilityDescriptor {
        CapabilityDescriptor {
            supports_stream: true,
            supports_image_input: true,
            supports_audio_input: false,
            supports_video_input: false,
            supports_tools: true,
            supports_structured_output: false,
            supports_parallel_tool_calls: true,
            supports_reasoning: true,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }
}
