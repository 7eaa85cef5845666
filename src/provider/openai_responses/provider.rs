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
use super::error::parse_openai_responses_error;
use super::response::map_response;
use super::stream::OpenAiResponsesNormalizer;
use super::types::ResponsesResponse;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI Responses provider.
///
/// Registered next to a Chat Completions provider for the same handle, it receives the
/// requests the surface resolver routes to the advanced surface.
///
/// # Examples
///
/// ```
/// # use polyvox_llm::provider::openai_responses::OpenAiResponsesProvider;
/// # use polyvox_llm::provider::LLMProvider;
/// # use polyvox_llm::http::reqwest::default_dyn_transport;
/// # use polyvox_llm::types::EndpointSurface;
/// let transport = default_dyn_transport().expect("transport");
/// let provider = OpenAiResponsesProvider::new(transport, "key").with_project("proj_alpha");
/// assert_eq!(provider.name(), "openai_responses");
/// assert_eq!(provider.surface(), EndpointSurface::Responses);
/// ```
pub struct OpenAiResponsesProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) organization: Option<String>,
    pub(crate) project: Option<String>,
    pub(crate) default_model: Option<String>,
}

impl OpenAiResponsesProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            organization: None,
            project: None,
            default_model: None,
        }
    }

    /// Overrides the base URL, useful for proxies or gateways. Include the version segment.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
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
        serialize(
            Vendor::OpenAi,
            EndpointSurface::Responses,
            request,
            &model,
            stream,
        )
    }
}

#[async_trait]
impl LLMProvider for OpenAiResponsesProvider {
    async fn chat(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult, LLMError> {
        let body = self.build_request_body(&request, false)?;
        let (parsed, raw): (ResponsesResponse, _) = post_for_json(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(false),
            &body,
            cancel,
            PROVIDER,
            parse_openai_responses_error,
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
            parse_openai_responses_error,
        )
        .await?;
        Ok(normalized_stream(
            stream,
            PROVIDER,
            OpenAiResponsesNormalizer::new(PROVIDER, self.endpoint()),
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
            supports_structured_output: true,
            supports_parallel_tool_calls: true,
            supports_reasoning: true,
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn vendor(&self) -> Vendor {
        Vendor::OpenAi
    }

    fn surface(&self) -> EndpointSurface {
        EndpointSurface::Responses
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
    use crate::types::{ChatMessage, ChatOptions};

    fn provider(transport: DynHttpTransport) -> OpenAiResponsesProvider {
        OpenAiResponsesProvider::new(transport, "sk-test")
            .with_organization("org_1")
            .with_default_model("gpt-4.1")
    }

    #[tokio::test]
    async fn chat_posts_to_responses_endpoint() {
        let transport = ScriptedTransport::new(vec![Scripted::Json(
            200,
            json!({
                "id": "resp_1", "object": "response", "model": "gpt-4.1", "status": "completed",
                "output": [{"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "Hi"}]}]
            })
            .to_string(),
        )]);
        let request = ChatRequest::new(vec![ChatMessage::user("hello")]).with_options(ChatOptions {
            previous_response_id: Some("resp_0".into()),
            ..Default::default()
        });
        let result = provider(transport.clone())
            .chat(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text().as_deref(), Some("Hi"));
        assert_eq!(result.id.as_deref(), Some("resp_1"));

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "https://api.openai.com/v1/responses");
        assert_eq!(requests[0].headers["Authorization"], "Bearer sk-test");
        assert_eq!(requests[0].headers["OpenAI-Organization"], "org_1");
        drop(requests);
        let body = &transport.request_bodies()[0];
        assert_eq!(body["previous_response_id"], json!("resp_0"));
        assert_eq!(body["model"], json!("gpt-4.1"));
    }

    #[tokio::test]
    async fn stream_emits_deltas_then_terminal_pair() {
        let body = concat!(
            "event: response.created\n",
            "data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_9\",\"status\":\"in_progress\"}}\n\n",
            "event: response.output_text.delta\n",
            "data: {\"type\":\"response.output_text.delta\",\"output_index\":0,\"delta\":\"Hey\"}\n\n",
            "event: response.completed\n",
            "data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_9\",\"status\":\"completed\"}}\n\n",
        );
        let transport = ScriptedTransport::new(vec![Scripted::Stream(
            200,
            ScriptedTransport::chunked(body, 11),
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
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().text().as_deref(), Some("Hey"));
        assert_eq!(results[1].as_ref().unwrap().id.as_deref(), Some("resp_9"));
    }

    #[tokio::test]
    async fn missing_model_is_a_validation_error() {
        let provider = OpenAiResponsesProvider::new(ScriptedTransport::new(vec![]), "sk-test");
        let err = provider
            .chat(
                ChatRequest::new(vec![ChatMessage::user("hello")]),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Validation { .. }));
    }
}
