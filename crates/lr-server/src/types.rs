//! Wire types for the gateway's HTTP surface.
//!
//! Chat-completions request/response bodies are carried as raw
//! [`serde_json::Value`] end to end rather than a fully-typed struct:
//! the gateway forwards unrecognized fields opaquely (OpenAI path) and
//! only a handful of fields (`model`, `messages`, `stream`,
//! `temperature`, `max_tokens`, `top_p`, `stop`) are ever read or
//! rewritten by the pipeline.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
}
