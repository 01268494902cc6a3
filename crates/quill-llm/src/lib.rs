//! Text-generation and web-search collaborators for the Quill pipeline.
//!
//! Provides the `ProviderAdapter` trait with OpenAI and Anthropic adapters,
//! a middleware chain and model catalog in `LlmClient`, and the two seams the
//! pipeline stages call: `TextGenerator` and `SearchProvider`.

mod anthropic;
mod client;
mod generator;
mod openai;
mod provider;
mod search;
mod types;

pub use anthropic::AnthropicAdapter;
pub use client::*;
pub use generator::{GenerationSettings, LlmGenerator, TextGenerator, UnconfiguredGenerator};
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use search::{SearchChain, SearchProvider, SerpApiSearch, TemplateSearch};
pub use types::*;
