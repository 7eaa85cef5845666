//! Anthropic Messages API (`/v1/messages`).

mod error;
mod provider;
pub(crate) mod request;
mod response;
mod stream;
mod types;

pub use provider::AnthropicMessagesProvider;

pub(crate) const PROVIDER: &str = "anthropic_messages";
