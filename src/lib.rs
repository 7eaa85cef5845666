//! Vendor-neutral client for chat-style LLM APIs.
//!
//! Requests are written once against [`types`] and serialized per vendor. Streams from
//! every vendor are normalized into the same ordered sequence of [`ChatResult`]s, and a
//! [`Conversation`] folds that sequence into history while resolving tool calls.

pub mod catalog;
pub mod client;
pub mod compression;
pub mod config;
pub mod conversation;
pub mod error;
pub mod http;
pub mod provider;
pub mod request;
pub mod sse;
pub mod types;

pub use client::{LLMClient, SafeOutcome};
pub use conversation::{Conversation, ExchangeOutcome, ResponseHandlers, ToolCallHandler};
pub use error::LLMError;
pub use provider::{ChatStream, LLMProvider};
pub use types::*;
