//! OpenAI Responses API, the surface for stateful and built-in-tool requests.

mod error;
mod provider;
pub(crate) mod request;
mod response;
mod stream;
mod types;

pub use provider::OpenAiResponsesProvider;

pub(crate) const PROVIDER: &str = "openai_responses";
