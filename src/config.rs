//! Declarative client configuration.
//!
//! ```
//! # use polyvox_llm::config::ClientConfig;
//! let config = ClientConfig::from_json_str(r#"{
//!     "models": [
//!         {"handle": "fast", "provider": "open_ai_chat", "vendor": "groq",
//!          "credential": {"type": "api_key", "key": "gsk-test"}, "default_model": "llama-3.3-70b-versatile"}
//!     ],
//!     "defaults": {"temperature": 0.2}
//! }"#).unwrap();
//! assert_eq!(config.models[0].handle, "fast");
//! assert_eq!(config.defaults.temperature, Some(0.2));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{LLMClient, LLMClientBuilder};
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::anthropic_messages::AnthropicMessagesProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;
use crate::provider::openai_chat::OpenAiChatProvider;
use crate::provider::openai_responses::OpenAiResponsesProvider;
use crate::types::{ChatOptions, Vendor};

/// Every handle the client serves plus the library-level option defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub defaults: ChatOptions,
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LLMError> {
        serde_json::from_str(json).map_err(|err| LLMError::InvalidConfig {
            field: "config".to_string(),
            reason: err.to_string(),
        })
    }

    pub fn build(&self, transport: DynHttpTransport) -> Result<LLMClient, LLMError> {
        Ok(register_all(&self.models, transport)?
            .with_defaults(self.defaults.clone())
            .build())
    }
}

/// One callable backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Caller-chosen name, e.g. `default-openai`.
    pub handle: String,
    pub provider: ProviderKind,
    /// Vendor behind an `open_ai_chat` provider; OpenAI when omitted.
    #[serde(default)]
    pub vendor: Option<Vendor>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub credential: Credential,
    /// Also register the Responses surface for this handle.
    #[serde(default)]
    pub responses: bool,
    /// Provider settings such as `organization`, `project`, `version` or `beta`.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAiChat,
    OpenAiResponses,
    AnthropicMessages,
    GoogleGemini,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    ApiKey { key: String },
    Bearer { token: String },
    /// Local or proxy endpoints that need no credential.
    #[default]
    None,
}

/// Builds a client with one handle per configuration entry.
pub fn build_client_from_configs(
    configs: &[ModelConfig],
    transport: DynHttpTransport,
) -> Result<LLMClient, LLMError> {
    Ok(register_all(configs, transport)?.build())
}

fn register_all(
    configs: &[ModelConfig],
    transport: DynHttpTransport,
) -> Result<LLMClientBuilder, LLMError> {
    let mut builder = LLMClient::builder();
    let mut seen = HashSet::new();

    for config in configs {
        if config.handle.trim().is_empty() {
            return Err(invalid("handle", "handle must not be empty"));
        }
        if !seen.insert(config.handle.as_str()) {
            return Err(invalid(
                "handle",
                format!("duplicate handle {}", config.handle),
            ));
        }

        let provider = build_provider_from_config(config, transport.clone())?;
        builder = if config.responses {
            let responses = build_responses_provider(config, transport.clone())?;
            builder.register_surfaces(config.handle.clone(), provider, responses)
        } else {
            builder.register_handle(config.handle.clone(), provider)
        };
    }
    Ok(builder)
}

fn build_provider_from_config(
    config: &ModelConfig,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    let provider: DynProvider = match config.provider {
        ProviderKind::OpenAiChat => {
            let vendor = config.vendor.unwrap_or(Vendor::OpenAi);
            if !vendor.is_openai_compatible() {
                return Err(invalid(
                    "vendor",
                    format!("{} does not speak the chat completions format", vendor.as_str()),
                ));
            }
            let api_key = extract_api_key(&config.credential, "openai_chat", vendor)?;
            let mut provider = OpenAiChatProvider::for_vendor(transport, vendor, api_key);

            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(org) = extra_str(config, "organization") {
                provider = provider.with_organization(org);
            }
            if let Some(project) = extra_str(config, "project") {
                provider = provider.with_project(project);
            }

            Arc::new(provider)
        }
        ProviderKind::OpenAiResponses => build_responses_provider(config, transport)?,
        ProviderKind::AnthropicMessages => {
            let api_key =
                extract_api_key(&config.credential, "anthropic_messages", Vendor::Anthropic)?;
            let mut provider = AnthropicMessagesProvider::new(transport, api_key);

            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }
            if let Some(version) = extra_str(config, "version") {
                provider = provider.with_version(version);
            }
            if let Some(beta) = extra_str(config, "beta") {
                provider = provider.with_beta(beta);
            }

            Arc::new(provider)
        }
        ProviderKind::GoogleGemini => {
            let api_key = extract_api_key(&config.credential, "google_gemini", Vendor::Google)?;
            let mut provider = GoogleGeminiProvider::new(transport, api_key);

            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &config.default_model {
                provider = provider.with_default_model(model.clone());
            }

            Arc::new(provider)
        }
    };

    Ok(provider)
}

fn build_responses_provider(
    config: &ModelConfig,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    if matches!(
        config.provider,
        ProviderKind::AnthropicMessages | ProviderKind::GoogleGemini
    ) {
        return Err(invalid(
            "responses",
            "the responses surface is only available for OpenAI providers",
        ));
    }
    let vendor = config.vendor.unwrap_or(Vendor::OpenAi);
    let api_key = extract_api_key(&config.credential, "openai_responses", vendor)?;
    let mut provider = OpenAiResponsesProvider::new(transport, api_key);

    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    if let Some(model) = &config.default_model {
        provider = provider.with_default_model(model.clone());
    }
    if let Some(org) = extra_str(config, "organization") {
        provider = provider.with_organization(org);
    }
    if let Some(project) = extra_str(config, "project") {
        provider = provider.with_project(project);
    }

    Ok(Arc::new(provider))
}

fn extract_api_key(
    credential: &Credential,
    provider: &'static str,
    vendor: Vendor,
) -> Result<String, LLMError> {
    match credential {
        Credential::ApiKey { key } => Ok(key.clone()),
        Credential::Bearer { token } => Ok(token.clone()),
        // self-hosted OpenAI-compatible servers usually run without auth
        Credential::None if vendor == Vendor::Custom => Ok(String::new()),
        Credential::None => Err(LLMError::Auth {
            message: format!("provider {provider} requires credential"),
        }),
    }
}

fn extra_str(config: &ModelConfig, key: &str) -> Option<String> {
    match config.extra.get(key) {
        Some(Value::String(value)) => Some(value.clone()),
        _ => None,
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LLMError {
    LLMError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::reqwest::default_dyn_transport;

    fn model(handle: &str, provider: ProviderKind, credential: Credential) -> ModelConfig {
        ModelConfig {
            handle: handle.to_string(),
            provider,
            vendor: None,
            base_url: None,
            default_model: None,
            credential,
            responses: false,
            extra: HashMap::new(),
        }
    }

    fn key(value: &str) -> Credential {
        Credential::ApiKey {
            key: value.to_string(),
        }
    }

    #[test]
    fn build_client_from_configs_supports_all_providers() {
        let transport = default_dyn_transport().expect("transport");

        let mut responses = model("openai", ProviderKind::OpenAiChat, key("sk-chat"));
        responses.responses = true;
        let configs = vec![
            responses,
            model("openai-responses", ProviderKind::OpenAiResponses, key("sk-resp")),
            model("anthropic", ProviderKind::AnthropicMessages, key("sk-ant")),
            model("gemini", ProviderKind::GoogleGemini, key("AIza-test")),
        ];

        let client = build_client_from_configs(&configs, transport).expect("client");
        let mut handles = client.handles();
        handles.sort();

        assert_eq!(
            handles,
            vec![
                "anthropic".to_string(),
                "gemini".to_string(),
                "openai".to_string(),
                "openai-responses".to_string(),
            ]
        );
    }

    #[test]
    fn json_config_builds_with_defaults() {
        let config = ClientConfig::from_json_str(
            r#"{
                "models": [
                    {"handle": "local", "provider": "open_ai_chat", "vendor": "custom",
                     "base_url": "http://localhost:11434/v1", "default_model": "llama3"},
                    {"handle": "claude", "provider": "anthropic_messages",
                     "credential": {"type": "bearer", "token": "sk-ant"},
                     "extra": {"beta": "prompt-caching-2024-07-31"}}
                ],
                "defaults": {"max_output_tokens": 1024}
            }"#,
        )
        .expect("config");

        assert!(matches!(config.models[0].credential, Credential::None));
        let client = config
            .build(default_dyn_transport().expect("transport"))
            .expect("client");
        assert_eq!(client.defaults().max_output_tokens, Some(1024));
        assert_eq!(client.handles().len(), 2);
    }

    #[test]
    fn missing_credential_is_an_auth_error() {
        let transport = default_dyn_transport().expect("transport");
        let configs = vec![model("openai", ProviderKind::OpenAiChat, Credential::None)];

        match build_client_from_configs(&configs, transport) {
            Err(LLMError::Auth { message }) => assert!(message.contains("openai_chat")),
            Err(other) => panic!("unexpected error type: {other:?}"),
            Ok(_) => panic!("expected auth error"),
        }
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let transport = default_dyn_transport().expect("transport");

        let duplicate = vec![
            model("same", ProviderKind::GoogleGemini, key("a")),
            model("same", ProviderKind::GoogleGemini, key("b")),
        ];
        assert!(matches!(
            build_client_from_configs(&duplicate, transport.clone()),
            Err(LLMError::InvalidConfig { .. })
        ));

        let mut wrong_vendor = model("claude", ProviderKind::OpenAiChat, key("a"));
        wrong_vendor.vendor = Some(Vendor::Anthropic);
        assert!(matches!(
            build_client_from_configs(&[wrong_vendor], transport.clone()),
            Err(LLMError::InvalidConfig { .. })
        ));

        let mut gemini_responses = model("gemini", ProviderKind::GoogleGemini, key("a"));
        gemini_responses.responses = true;
        assert!(matches!(
            build_client_from_configs(&[gemini_responses], transport),
            Err(LLMError::InvalidConfig { .. })
        ));

        assert!(matches!(
            ClientConfig::from_json_str("{\"models\": 3}"),
            Err(LLMError::InvalidConfig { .. })
        ));
    }
}
