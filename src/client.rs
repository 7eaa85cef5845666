use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::catalog::{DynModelCatalog, StaticModelCatalog};
use crate::conversation::Conversation;
use crate::error::LLMError;
use crate::provider::{ChatStream, DynProvider};
use crate::request::{layer_request, resolve_surface};
use crate::types::{CapabilityDescriptor, ChatOptions, ChatRequest, ChatResult, EndpointSurface};

/// Result of a "safe" entry point: exactly one of `data` and `error` is set.
///
/// # Examples
///
/// ```
/// # use polyvox_llm::client::SafeOutcome;
/// # use polyvox_llm::error::LLMError;
/// let outcome: SafeOutcome<u32> = Err(LLMError::NoChoices).into();
/// assert!(!outcome.is_ok());
/// assert!(matches!(outcome.into_result(), Err(LLMError::NoChoices)));
/// ```
#[derive(Debug)]
pub struct SafeOutcome<T> {
    pub data: Option<T>,
    pub error: Option<LLMError>,
}

impl<T> SafeOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<T, LLMError> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Err(LLMError::NoChoices),
        }
    }
}

impl<T> From<Result<T, LLMError>> for SafeOutcome<T> {
    fn from(result: Result<T, LLMError>) -> Self {
        match result {
            Ok(data) => Self {
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                data: None,
                error: Some(error),
            },
        }
    }
}

/// Providers registered under one handle. `responses` is optional; without it every
/// request for the handle goes to the chat surface.
#[derive(Clone)]
struct HandleEntry {
    chat: DynProvider,
    responses: Option<DynProvider>,
}

struct ClientInner {
    providers: HashMap<String, HandleEntry>,
    catalog: DynModelCatalog,
    defaults: ChatOptions,
}

/// Entry point of the library: a registry of providers keyed by handle.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct LLMClient {
    inner: Arc<ClientInner>,
}

impl LLMClient {
    pub fn builder() -> LLMClientBuilder {
        LLMClientBuilder {
            providers: HashMap::new(),
            catalog: None,
            defaults: ChatOptions::default(),
        }
    }

    /// Sends a buffered request.
    ///
    /// Options are layered over the library defaults and the surface resolver picks
    /// the provider. The call resolves to [`LLMError::Aborted`] once `cancel` fires.
    pub async fn create_chat_completion(
        &self,
        handle: &str,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatResult, LLMError> {
        self.chat_with(handle, request, &ChatOptions::default(), cancel)
            .await
    }

    /// Opens a normalized stream. Cancelling `cancel` ends the stream without an error item.
    pub async fn stream_chat_completion(
        &self,
        handle: &str,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        self.stream_with(handle, request, &ChatOptions::default(), cancel)
            .await
    }

    pub async fn create_chat_completion_safe(
        &self,
        handle: &str,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> SafeOutcome<ChatResult> {
        self.create_chat_completion(handle, request, cancel)
            .await
            .into()
    }

    pub async fn stream_chat_completion_safe(
        &self,
        handle: &str,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> SafeOutcome<ChatStream> {
        self.stream_chat_completion(handle, request, cancel)
            .await
            .into()
    }

    /// Starts an empty conversation against `handle`.
    pub fn conversation(&self, handle: impl Into<String>) -> Conversation {
        Conversation::new(self.clone(), handle.into())
    }

    pub fn defaults(&self) -> &ChatOptions {
        &self.inner.defaults
    }

    pub fn handles(&self) -> Vec<String> {
        self.inner.providers.keys().cloned().collect()
    }

    /// Capability descriptor of the chat provider behind `handle`.
    pub fn capabilities(&self, handle: &str) -> Result<CapabilityDescriptor, LLMError> {
        Ok(self.entry(handle)?.chat.capabilities())
    }

    pub fn handles_supporting_tools(&self) -> Vec<String> {
        self.handles_where(|caps| caps.supports_tools)
    }

    pub fn handles_supporting_stream(&self) -> Vec<String> {
        self.handles_where(|caps| caps.supports_stream)
    }

    fn handles_where(&self, keep: impl Fn(&CapabilityDescriptor) -> bool) -> Vec<String> {
        self.inner
            .providers
            .iter()
            .filter(|(_, entry)| keep(&entry.chat.capabilities()))
            .map(|(handle, _)| handle.clone())
            .collect()
    }

    fn entry(&self, handle: &str) -> Result<&HandleEntry, LLMError> {
        self.inner
            .providers
            .get(handle)
            .ok_or_else(|| LLMError::ModelNotFound {
                model: Some(handle.to_string()),
                message: format!("unknown model handle: {handle}"),
            })
    }

    /// Layers options and picks the provider for one request.
    pub(crate) fn prepare(
        &self,
        handle: &str,
        request: ChatRequest,
        conversation: &ChatOptions,
    ) -> Result<(DynProvider, ChatRequest), LLMError> {
        let entry = self.entry(handle)?;
        let request = layer_request(request, conversation, &self.inner.defaults);
        let model = request
            .options
            .model
            .clone()
            .or_else(|| entry.chat.default_model().map(str::to_string));
        let info = model.as_deref().and_then(|m| self.inner.catalog.resolve(m));

        let provider = match (resolve_surface(&request, info.as_ref()), &entry.responses) {
            (EndpointSurface::Responses, Some(responses)) => responses.clone(),
            (EndpointSurface::Responses, None) => {
                tracing::debug!(handle, "no responses provider registered, using chat surface");
                entry.chat.clone()
            }
            (EndpointSurface::Chat, _) => entry.chat.clone(),
        };
        Ok((provider, request))
    }

    pub(crate) async fn chat_with(
        &self,
        handle: &str,
        request: ChatRequest,
        conversation: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatResult, LLMError> {
        let (provider, request) = self.prepare(handle, request, conversation)?;
        tracing::debug!(handle, provider = provider.name(), "sending chat request");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LLMError::aborted()),
            result = provider.chat(request, cancel) => result,
        }
    }

    pub(crate) async fn stream_with(
        &self,
        handle: &str,
        request: ChatRequest,
        conversation: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatStream, LLMError> {
        let (provider, request) = self.prepare(handle, request, conversation)?;
        tracing::debug!(handle, provider = provider.name(), "opening chat stream");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LLMError::aborted()),
            result = provider.stream_chat(request, cancel) => result,
        }
    }
}

/// Builder that registers providers and shared settings.
pub struct LLMClientBuilder {
    providers: HashMap<String, HandleEntry>,
    catalog: Option<DynModelCatalog>,
    defaults: ChatOptions,
}

impl LLMClientBuilder {
    /// Registers a chat-surface provider for `handle`.
    pub fn register_handle<S: Into<String>>(mut self, handle: S, provider: DynProvider) -> Self {
        self.providers.insert(
            handle.into(),
            HandleEntry {
                chat: provider,
                responses: None,
            },
        );
        self
    }

    /// Registers both surfaces for `handle`; the resolver chooses per request.
    pub fn register_surfaces<S: Into<String>>(
        mut self,
        handle: S,
        chat: DynProvider,
        responses: DynProvider,
    ) -> Self {
        self.providers.insert(
            handle.into(),
            HandleEntry {
                chat,
                responses: Some(responses),
            },
        );
        self
    }

    /// Replaces the built-in model catalog used for surface routing.
    pub fn with_catalog(mut self, catalog: DynModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Library-level defaults, the lowest option layer.
    pub fn with_defaults(mut self, defaults: ChatOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn build(self) -> LLMClient {
        LLMClient {
            inner: Arc::new(ClientInner {
                providers: self.providers,
                catalog: self
                    .catalog
                    .unwrap_or_else(|| Arc::new(StaticModelCatalog::builtin())),
                defaults: self.defaults,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures_util::StreamExt;

    use super::*;
    use crate::provider::LLMProvider;
    use crate::types::{ChatMessage, Vendor};

    /// Records the requests it receives and answers with a fixed text.
    struct EchoProvider {
        name: &'static str,
        surface: EndpointSurface,
        caps: CapabilityDescriptor,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl EchoProvider {
        fn new(name: &'static str, surface: EndpointSurface) -> Arc<Self> {
            Arc::new(Self {
                name,
                surface,
                caps: CapabilityDescriptor {
                    supports_stream: true,
                    supports_tools: true,
                    ..CapabilityDescriptor::default()
                },
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn chat(
            &self,
            request: ChatRequest,
            _cancel: &CancellationToken,
        ) -> Result<ChatResult, LLMError> {
            self.seen.lock().unwrap().push(request);
            Ok(ChatResult {
                choices: vec![crate::types::ChatChoice {
                    message: Some(ChatMessage::assistant(self.name)),
                    ..Default::default()
                }],
                ..Default::default()
            })
        }

        async fn stream_chat(
            &self,
            _request: ChatRequest,
            _cancel: &CancellationToken,
        ) -> Result<ChatStream, LLMError> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        fn capabilities(&self) -> CapabilityDescriptor {
            self.caps.clone()
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn vendor(&self) -> Vendor {
            Vendor::OpenAi
        }

        fn surface(&self) -> EndpointSurface {
            self.surface
        }

        fn default_model(&self) -> Option<&str> {
            Some("gpt-5")
        }
    }

    fn client(chat: Arc<EchoProvider>, responses: Arc<EchoProvider>) -> LLMClient {
        LLMClient::builder()
            .register_surfaces("openai", chat, responses)
            .with_defaults(ChatOptions {
                max_output_tokens: Some(512),
                ..Default::default()
            })
            .build()
    }

    #[tokio::test]
    async fn advanced_parameters_route_to_responses() {
        let chat = EchoProvider::new("chat", EndpointSurface::Chat);
        let responses = EchoProvider::new("responses", EndpointSurface::Responses);
        let client = client(chat.clone(), responses.clone());
        let cancel = CancellationToken::new();

        let plain = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let result = client
            .create_chat_completion("openai", plain.clone(), &cancel)
            .await
            .unwrap();
        assert_eq!(result.text().as_deref(), Some("chat"));

        let advanced = plain.with_options(ChatOptions {
            previous_response_id: Some("resp_1".into()),
            ..Default::default()
        });
        let result = client
            .create_chat_completion("openai", advanced, &cancel)
            .await
            .unwrap();
        assert_eq!(result.text().as_deref(), Some("responses"));

        let seen = chat.seen.lock().unwrap();
        assert_eq!(seen[0].options.max_output_tokens, Some(512));
    }

    #[tokio::test]
    async fn uncatalogued_models_stay_on_chat() {
        let chat = EchoProvider::new("chat", EndpointSurface::Chat);
        let responses = EchoProvider::new("responses", EndpointSurface::Responses);
        let client = LLMClient::builder()
            .register_surfaces("openai", chat, responses.clone())
            .with_catalog(Arc::new(StaticModelCatalog::empty()))
            .build();

        let request = ChatRequest::new(vec![ChatMessage::user("hi")]).with_options(ChatOptions {
            previous_response_id: Some("resp_1".into()),
            ..Default::default()
        });
        let result = client
            .create_chat_completion("openai", request.clone(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text().as_deref(), Some("chat"));

        let forced = request.with_surface(EndpointSurface::Responses);
        let result = client
            .create_chat_completion("openai", forced, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text().as_deref(), Some("responses"));
        assert_eq!(responses.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_handle_and_safe_variant() {
        let client = LLMClient::builder().build();
        let outcome = client
            .create_chat_completion_safe(
                "missing",
                ChatRequest::new(vec![ChatMessage::user("hi")]),
                &CancellationToken::new(),
            )
            .await;
        assert!(outcome.data.is_none());
        assert!(matches!(outcome.error, Some(LLMError::ModelNotFound { .. })));
        assert!(client.capabilities("missing").is_err());
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_sending() {
        let chat = EchoProvider::new("chat", EndpointSurface::Chat);
        let client = LLMClient::builder()
            .register_handle("openai", chat.clone())
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .create_chat_completion(
                "openai",
                ChatRequest::new(vec![ChatMessage::user("hi")]),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Aborted { .. }));
        assert!(chat.seen.lock().unwrap().is_empty());

        let stream = client
            .stream_chat_completion_safe(
                "openai",
                ChatRequest::new(vec![ChatMessage::user("hi")]),
                &CancellationToken::new(),
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(stream.count().await, 0);
    }

    #[test]
    fn handles_filter_by_capability() {
        let tools = EchoProvider::new("tools", EndpointSurface::Chat);
        let plain = Arc::new(EchoProvider {
            name: "plain",
            surface: EndpointSurface::Chat,
            caps: CapabilityDescriptor::default(),
            seen: Mutex::new(Vec::new()),
        });
        let client = LLMClient::builder()
            .register_handle("tools", tools)
            .register_handle("plain", plain)
            .build();
        let mut handles = client.handles();
        handles.sort();
        assert_eq!(handles, vec!["plain".to_string(), "tools".to_string()]);
        assert_eq!(client.handles_supporting_tools(), vec!["tools".to_string()]);
        assert_eq!(client.handles_supporting_stream(), vec!["tools".to_string()]);
        assert!(!client.capabilities("plain").unwrap().supports_tools);
    }
}
