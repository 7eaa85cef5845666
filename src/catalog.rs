//! Model metadata lookup: which vendor serves a model and which surfaces it supports.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::types::Vendor;

/// Endpoint surfaces a model is known to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSupport {
    pub chat: bool,
    pub responses: bool,
}

impl SurfaceSupport {
    pub const CHAT_ONLY: Self = Self {
        chat: true,
        responses: false,
    };
    pub const RESPONSES_ONLY: Self = Self {
        chat: false,
        responses: true,
    };
    pub const BOTH: Self = Self {
        chat: true,
        responses: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub vendor: Vendor,
    /// `None` means the catalog has no surface metadata for this model.
    pub surfaces: Option<SurfaceSupport>,
    /// Reasoning models reject some sampling parameters and rename token limits.
    pub reasoning: bool,
}

/// Resolves a model identifier or alias to its metadata.
pub trait ModelCatalog: Send + Sync {
    fn resolve(&self, model: &str) -> Option<ModelInfo>;
}

pub type DynModelCatalog = Arc<dyn ModelCatalog>;

#[derive(Debug, Clone)]
struct PrefixRule {
    prefix: String,
    vendor: Vendor,
    surfaces: Option<SurfaceSupport>,
    reasoning: bool,
}

/// In-memory catalog with exact entries, aliases, and prefix rules.
///
/// Lookups try exact ids, then aliases, then the longest matching prefix.
#[derive(Debug, Clone, Default)]
pub struct StaticModelCatalog {
    exact: HashMap<String, ModelInfo>,
    aliases: HashMap<String, String>,
    prefixes: Vec<PrefixRule>,
}

impl StaticModelCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog covering well-known model families.
    pub fn builtin() -> Self {
        use SurfaceSupport as S;
        use Vendor::*;

        Self::empty()
            .with_model("o1-pro", OpenAi, Some(S::RESPONSES_ONLY), true)
            .with_model("o3-pro", OpenAi, Some(S::RESPONSES_ONLY), true)
            .with_model("o3-deep-research", OpenAi, Some(S::RESPONSES_ONLY), true)
            .with_model("codex-mini-latest", OpenAi, Some(S::RESPONSES_ONLY), true)
            .with_model("computer-use-preview", OpenAi, Some(S::RESPONSES_ONLY), false)
            .with_model("deepseek-reasoner", DeepSeek, Some(S::CHAT_ONLY), true)
            .with_model("deepseek-chat", DeepSeek, Some(S::CHAT_ONLY), false)
            .with_alias("claude-sonnet", "claude-sonnet-4-5")
            .with_alias("claude-opus", "claude-opus-4-1")
            .with_prefix("gpt-5", OpenAi, Some(S::BOTH), true)
            .with_prefix("o1", OpenAi, Some(S::BOTH), true)
            .with_prefix("o3", OpenAi, Some(S::BOTH), true)
            .with_prefix("o4", OpenAi, Some(S::BOTH), true)
            .with_prefix("gpt-4", OpenAi, Some(S::BOTH), false)
            .with_prefix("gpt-3.5", OpenAi, Some(S::CHAT_ONLY), false)
            .with_prefix("chatgpt-", OpenAi, Some(S::CHAT_ONLY), false)
            .with_prefix("claude-", Anthropic, Some(S::CHAT_ONLY), false)
            .with_prefix("gemini-", Google, Some(S::CHAT_ONLY), false)
            .with_prefix("magistral", Mistral, Some(S::CHAT_ONLY), true)
            .with_prefix("mistral-", Mistral, Some(S::CHAT_ONLY), false)
            .with_prefix("codestral", Mistral, Some(S::CHAT_ONLY), false)
            .with_prefix("grok-3-mini", XAi, Some(S::CHAT_ONLY), true)
            .with_prefix("grok-4", XAi, Some(S::CHAT_ONLY), true)
            .with_prefix("grok-", XAi, Some(S::CHAT_ONLY), false)
            .with_prefix("sonar-reasoning", Perplexity, Some(S::CHAT_ONLY), true)
            .with_prefix("sonar", Perplexity, Some(S::CHAT_ONLY), false)
            .with_prefix("command-", Cohere, Some(S::CHAT_ONLY), false)
    }

    pub fn with_model(
        mut self,
        id: impl Into<String>,
        vendor: Vendor,
        surfaces: Option<SurfaceSupport>,
        reasoning: bool,
    ) -> Self {
        let id = id.into();
        self.exact.insert(
            id.clone(),
            ModelInfo {
                id,
                vendor,
                surfaces,
                reasoning,
            },
        );
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    pub fn with_prefix(
        mut self,
        prefix: impl Into<String>,
        vendor: Vendor,
        surfaces: Option<SurfaceSupport>,
        reasoning: bool,
    ) -> Self {
        self.prefixes.push(PrefixRule {
            prefix: prefix.into(),
            vendor,
            surfaces,
            reasoning,
        });
        self
    }

    fn lookup(&self, model: &str) -> Option<ModelInfo> {
        if let Some(info) = self.exact.get(model) {
            return Some(info.clone());
        }
        self.prefixes
            .iter()
            .filter(|rule| model.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len())
            .map(|rule| ModelInfo {
                id: model.to_string(),
                vendor: rule.vendor,
                surfaces: rule.surfaces,
                reasoning: rule.reasoning,
            })
    }
}

impl ModelCatalog for StaticModelCatalog {
    fn resolve(&self, model: &str) -> Option<ModelInfo> {
        // vendors accept both `models/x` and `x` for Gemini ids
        let model = model.strip_prefix("models/").unwrap_or(model);
        match self.aliases.get(model) {
            Some(target) => self.lookup(target),
            None => self.lookup(model),
        }
    }
}

fn builtin() -> &'static StaticModelCatalog {
    static BUILTIN: OnceLock<StaticModelCatalog> = OnceLock::new();
    BUILTIN.get_or_init(StaticModelCatalog::builtin)
}

/// Whether the built-in catalog marks `model` as a reasoning model.
pub(crate) fn is_reasoning_model(model: &str) -> bool {
    builtin().resolve(model).is_some_and(|info| info.reasoning)
}
