//! OpenAI-compatible pass-through provider.
//!
//! The request body is forwarded verbatim to `<base>/v1/chat/completions`
//! with a bearer token; streaming forces `"stream": true` on the
//! forwarded body and re-parses the upstream SSE so the gateway can scan
//! the accumulated text before forwarding `[DONE]`.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use lr_types::{AppError, AppResult, ProviderResponse, StreamChunk};

use crate::{ChunkStream, Provider};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAIProvider {
    client: Client,
    base_url: String,
    global_api_key: String,
}

impl OpenAIProvider {
    pub fn new(base_url: impl Into<String>, global_api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");

        OpenAIProvider {
            client,
            base_url: base_url.into(),
            global_api_key: global_api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn bearer_key<'a>(&'a self, api_key: &'a str) -> &'a str {
        if api_key.is_empty() {
            &self.global_api_key
        } else {
            api_key
        }
    }

    fn map_send_error(err: reqwest::Error) -> AppError {
        if err.is_connect() {
            AppError::UpstreamConnect
        } else if err.is_timeout() {
            AppError::UpstreamTimeout
        } else {
            AppError::Upstream(err.to_string())
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn unary(&self, body: &Value, api_key: &str, _model_id: &str) -> AppResult<ProviderResponse> {
        debug!(endpoint = %self.endpoint(), "dispatching unary request to OpenAI-compatible upstream");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.bearer_key(api_key))
            .json(body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status_code = response.status().as_u16();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid upstream response body: {e}")))?;

        Ok(ProviderResponse { status_code, body })
    }

    async fn stream(&self, body: &Value, api_key: &str, _model_id: &str) -> AppResult<ChunkStream> {
        debug!(endpoint = %self.endpoint(), "dispatching streaming request to OpenAI-compatible upstream");
        let mut forwarded = body.clone();
        if let Value::Object(map) = &mut forwarded {
            map.insert("stream".to_string(), Value::Bool(true));
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.bearer_key(api_key))
            .json(&forwarded)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("upstream returned {status}: {text}")));
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(sse_to_chunks(byte_stream)))
    }
}

/// Re-frame a raw SSE byte stream into `StreamChunk`s, buffering partial
/// lines across chunk boundaries: lines starting `data:` are unwrapped,
/// and `[DONE]` terminates the stream.
fn sse_to_chunks(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = AppResult<StreamChunk>> + Send + 'static {
    let state = std::sync::Arc::new(parking_lot::Mutex::new(String::new()));

    byte_stream.flat_map(move |result| {
        let state = state.clone();
        let lines: Vec<AppResult<StreamChunk>> = match result {
            Ok(bytes) => {
                let mut buffer = state.lock();
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                let mut out = Vec::new();
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    *buffer = buffer[pos + 1..].to_string();

                    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };

                    if payload == "[DONE]" {
                        out.push(Ok(StreamChunk::done()));
                        continue;
                    }

                    let text_delta = serde_json::from_str::<Value>(payload)
                        .ok()
                        .and_then(|v| {
                            v.get("choices")?
                                .get(0)?
                                .get("delta")?
                                .get("content")?
                                .as_str()
                                .map(str::to_string)
                        })
                        .unwrap_or_default();

                    out.push(Ok(StreamChunk {
                        data: payload.to_string(),
                        is_done: false,
                        text_delta,
                    }));
                }
                out
            }
            Err(err) => vec![Err(OpenAIProvider::map_send_error(err))],
        };
        stream::iter(lines)
    })
}
