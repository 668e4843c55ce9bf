//! Maps [`AppError`] to an HTTP response: status code, a
//! `{"error": "..."}` body, and — for rate-limit denials — the
//! `Retry-After`/`X-RateLimit-*` headers.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use lr_types::AppError;
use serde_json::json;

pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.0.to_string() }));
        let mut response = (status, body).into_response();

        if let AppError::RateLimited { limit, reset_seconds } = &self.0 {
            let headers = response.headers_mut();
            let reset = reset_seconds.to_string();
            if let Ok(value) = HeaderValue::from_str(&reset) {
                headers.insert("Retry-After", value.clone());
                headers.insert("X-RateLimit-Reset", value);
            }
            if let Ok(value) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("X-RateLimit-Limit", value);
            }
            headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        }

        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
