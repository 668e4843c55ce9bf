//! Route handlers: `GET /health` and the protected
//! `POST /v1/chat/completions`, which drives the full request pipeline.

use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::Value;

use lr_audit::AuditRecord;
use lr_guardrails::{scan_for_pii, scan_prompt};
use lr_types::{AppError, PiiAction, Provider as ProviderKind, ProviderResponse, RateLimitDecision};
use lr_utils::crypto::generate_request_id;

use crate::pipeline;
use crate::state::AppState;
use crate::types::HealthResponse;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /v1/chat/completions`. Every path through this handler —
/// success, early rejection, or upstream failure — emits exactly one
/// audit record.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let request_id = generate_request_id();
    let span = tracing::info_span!("request", request_id = %request_id);
    let _enter = span.enter();

    let mut audit = AuditRecord::new(request_id.clone());
    audit.client_ip = Some(client_ip(&headers));

    match run_pipeline(&state, &headers, body, &request_id, &mut audit).await {
        Ok(response) => response,
        Err(err) => {
            audit.outcome = format!("error: {err}");
            state.audit.log(&audit);
            crate::error::ApiError::from(err).into_response()
        }
    }
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Runs authentication through response scanning for a single request.
/// Streaming responses defer their final audit log to the generator
/// itself, since latency and response-scan results aren't known until
/// the upstream stream has finished.
async fn run_pipeline(
    state: &AppState,
    headers: &HeaderMap,
    mut body: Value,
    request_id: &str,
    audit: &mut AuditRecord,
) -> Result<Response, AppError> {
    // Authenticate.
    let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    let client = state.authenticate(api_key).await?;
    audit.client_id = Some(client.client_id.clone());
    audit.provider = Some(client.provider.as_str().to_string());

    // Rate-limit.
    let decision = state.rate_limiter.check(&client.client_id, client.rate_limit_rpm);
    audit.rate_limit_remaining = Some(decision.remaining);
    if !decision.allowed {
        return Err(AppError::RateLimited {
            limit: decision.limit,
            reset_seconds: decision.reset_seconds,
        });
    }

    // Model allowlist.
    let model = pipeline::requested_model(&body);
    audit.model = Some(model.clone());
    if !client.allows_model(&model) {
        return Err(AppError::ModelNotAllowed(model));
    }

    // Injection scan.
    let prompt = pipeline::extract_prompt_text(&body);
    let scan = scan_prompt(&prompt, state.injection_threshold());
    audit.injection_score = Some(scan.risk_score);
    audit.injection_categories = scan.matched_categories.iter().map(|c| c.as_str().to_string()).collect();
    if !scan.allowed {
        return Err(AppError::InjectionBlocked);
    }

    // PII scan.
    let pii_action = state.settings.pii_action();
    let pii = scan_for_pii(&prompt, pii_action);
    audit.pii_detections = pii.detections.iter().map(|k| k.as_str().to_string()).collect();
    audit.pii_detection_count = pii.detection_count;
    if pii_action == PiiAction::Block && pii.detection_count > 0 {
        return Err(AppError::PiiBlocked);
    }
    if pii_action == PiiAction::Redact {
        pipeline::redact_last_user_message(&mut body);
    }

    // Streaming environment guard.
    let streaming = pipeline::is_streaming_requested(&body);
    if streaming && state.settings.is_serverless() {
        return Err(AppError::StreamingUnsupported);
    }

    // Dispatch.
    let provider = state.providers.get(client.provider, &state.settings).await;
    let model_id = match client.provider {
        ProviderKind::Openai => model.clone(),
        ProviderKind::Bedrock => client.bedrock_model_id.clone(),
    };
    let started = Instant::now();

    if streaming {
        let chunk_stream = provider.stream(&body, &client.upstream_api_key, &model_id).await?;
        return Ok(build_sse_response(
            state.clone(),
            decision,
            request_id.to_string(),
            audit.clone(),
            chunk_stream,
            started,
        ));
    }

    let response = provider.unary(&body, &client.upstream_api_key, &model_id).await?;
    audit.upstream_status = Some(response.status_code);
    audit.latency_ms = Some(started.elapsed().as_millis() as u64);

    let assistant_text = pipeline::extract_assistant_text(&response.body);
    let response_scan = scan_prompt(&assistant_text, state.injection_threshold());
    audit.response_injection_score = Some(response_scan.risk_score);

    let response_pii_action = state.settings.response_pii_action();
    let response_pii = scan_for_pii(&assistant_text, response_pii_action);
    audit.response_pii_detection_count = response_pii.detection_count;
    if response_pii_action == PiiAction::Block && response_pii.detection_count > 0 {
        return Err(AppError::ResponsePiiBlocked);
    }

    audit.outcome = "success".to_string();
    state.audit.log(audit);

    Ok(success_response(response, &decision, request_id))
}

fn success_response(response: ProviderResponse, decision: &RateLimitDecision, request_id: &str) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    let mut http_response = (status, Json(response.body)).into_response();
    add_rate_limit_headers(http_response.headers_mut(), decision);
    insert_header(http_response.headers_mut(), "X-Request-Id", request_id);
    http_response
}

/// Build the streaming branch of dispatch. Forwards each upstream chunk
/// verbatim, accumulating `text_delta`; on the terminal chunk,
/// response-scans the accumulated text and emits either the `[DONE]`
/// terminator or a single `error` event in its place.
fn build_sse_response(
    state: AppState,
    decision: RateLimitDecision,
    request_id: String,
    mut audit: AuditRecord,
    mut chunk_stream: lr_providers::ChunkStream,
    started: Instant,
) -> Response {
    let response_pii_action = state.settings.response_pii_action();
    let injection_threshold = state.injection_threshold();

    let sse_stream = async_stream::stream! {
        let mut buffer = String::new();

        loop {
            match chunk_stream.next().await {
                Some(Ok(chunk)) => {
                    buffer.push_str(&chunk.text_delta);

                    if !chunk.is_done {
                        yield Ok::<_, std::convert::Infallible>(Event::default().data(chunk.data));
                        continue;
                    }

                    audit.latency_ms = Some(started.elapsed().as_millis() as u64);
                    let response_scan = scan_prompt(&buffer, injection_threshold);
                    audit.response_injection_score = Some(response_scan.risk_score);
                    let response_pii = scan_for_pii(&buffer, response_pii_action);
                    audit.response_pii_detection_count = response_pii.detection_count;

                    if response_pii_action == PiiAction::Block && response_pii.detection_count > 0 {
                        audit.outcome = "error: response blocked by security policy".to_string();
                        state.audit.log(&audit);
                        let error_body = serde_json::json!({
                            "error": AppError::ResponsePiiBlocked.to_string(),
                        });
                        yield Ok(Event::default().data(error_body.to_string()));
                    } else {
                        audit.outcome = "success".to_string();
                        state.audit.log(&audit);
                        yield Ok(Event::default().data("[DONE]"));
                    }
                    break;
                }
                Some(Err(err)) => {
                    audit.outcome = format!("error: {err}");
                    state.audit.log(&audit);
                    let error_body = serde_json::json!({ "error": err.to_string() });
                    yield Ok(Event::default().data(error_body.to_string()));
                    break;
                }
                None => {
                    audit.outcome = "success".to_string();
                    state.audit.log(&audit);
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
            }
        }
    };

    let mut response = Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response();
    add_rate_limit_headers(response.headers_mut(), &decision);
    insert_header(response.headers_mut(), "X-Request-Id", &request_id);
    response
}

fn add_rate_limit_headers(headers: &mut axum::http::HeaderMap, decision: &RateLimitDecision) {
    insert_header(headers, "X-RateLimit-Limit", &decision.limit.to_string());
    insert_header(headers, "X-RateLimit-Remaining", &decision.remaining.to_string());
    insert_header(headers, "X-RateLimit-Reset", &decision.reset_seconds.to_string());
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
