//! Google Gemini GenerateContent API.

mod error;
mod provider;
pub(crate) mod request;
mod response;
mod stream;
mod types;

pub use provider::GoogleGeminiProvider;

pub(crate) const PROVIDER: &str = "google_gemini";
