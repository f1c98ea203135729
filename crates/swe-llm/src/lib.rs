//! # swe-llm
//!
//! The model capability: given a transcript and a tool catalog, a provider
//! returns either final text or a set of tool calls. Adapters exist for the
//! Anthropic Messages API and OpenAI-compatible chat completions; the router
//! picks one from a `provider/model` string and retries transient failures.

pub mod anthropic;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod router;

pub use mock::{MockProvider, MockResponse};
pub use provider::{LlmProvider, LlmRequest, LlmResponse, ModelOutput, StopReason};
pub use router::ModelRouter;
