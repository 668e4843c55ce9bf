//! Provider abstraction: a uniform `unary` + `stream` contract over
//! upstream LLMs, two concrete implementations (OpenAI pass-through,
//! Bedrock translator), and a lazily-instantiating registry that caches
//! provider singletons by name.

pub mod bedrock;
pub mod openai;
pub mod registry;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use lr_types::{AppResult, ProviderResponse, StreamChunk};
use serde_json::Value;

pub use registry::ProviderRegistry;

/// A finite, non-restartable sequence of stream chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = AppResult<StreamChunk>> + Send>>;

/// Uniform contract every upstream implements.
///
/// `body` is the client's chat-completions JSON body, already past the
/// security pipeline. `api_key` is the per-client upstream credential
/// (may be empty, meaning "use the provider's own fallback" — for
/// OpenAI that's the global key, for Bedrock it's ignored entirely
/// since auth is via IAM). `model_id` is the provider-specific model
/// identifier (the requested `model` for OpenAI, `bedrock_model_id` for
/// Bedrock).
#[async_trait]
pub trait Provider: Send + Sync {
    async fn unary(&self, body: &Value, api_key: &str, model_id: &str) -> AppResult<ProviderResponse>;

    async fn stream(&self, body: &Value, api_key: &str, model_id: &str) -> AppResult<ChunkStream>;

    /// Release held resources (connection pools, SDK clients). Called
    /// once at process shutdown via [`ProviderRegistry::close`].
    async fn close(&self) {}
}
