//! OpenAI Chat Completions and the vendors that mirror it (Mistral, xAI, Perplexity,
//! DeepSeek, Groq, OpenRouter, Cohere compatibility).

mod error;
mod provider;
pub(crate) mod request;
mod response;
mod stream;
mod types;

pub use provider::OpenAiChatProvider;

pub(crate) const PROVIDER: &str = "openai_chat";
