//! Error types shared across the gateway.
//!
//! Each variant maps to exactly one HTTP status; `lr-server` turns
//! these into `{"error": "..."}` JSON bodies in one place rather than
//! scattering a `match` over the pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Client suspended")]
    ClientSuspended,

    #[error("Model '{0}' not allowed for this client")]
    ModelNotAllowed(String),

    #[error("Request blocked by security policy")]
    InjectionBlocked,

    #[error("Request contains sensitive data")]
    PiiBlocked,

    #[error("Response blocked by security policy — contains sensitive data")]
    ResponsePiiBlocked,

    #[error("Streaming not supported here")]
    StreamingUnsupported,

    #[error("bedrock_model_id is required for bedrock provider")]
    BedrockModelIdRequired,

    #[error("Rate limit exceeded")]
    RateLimited { limit: u32, reset_seconds: u64 },

    #[error("Bedrock rate limit exceeded")]
    UpstreamThrottled,

    #[error("Upstream validation error: {0}")]
    UpstreamValidation(String),

    #[error("Upstream access denied — check IAM permissions")]
    UpstreamAccessDenied,

    #[error("Upstream model not ready")]
    UpstreamModelNotReady,

    #[error("Cannot reach upstream provider")]
    UpstreamConnect,

    #[error("Upstream provider timed out")]
    UpstreamTimeout,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// The HTTP status this error is reported as.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::MissingApiKey => 401,
            AppError::InvalidApiKey | AppError::ClientSuspended => 403,
            AppError::ModelNotAllowed(_) => 403,
            AppError::InjectionBlocked
            | AppError::PiiBlocked
            | AppError::ResponsePiiBlocked
            | AppError::StreamingUnsupported
            | AppError::BedrockModelIdRequired
            | AppError::UpstreamValidation(_)
            | AppError::BadRequest(_) => 400,
            AppError::RateLimited { .. } | AppError::UpstreamThrottled => 429,
            AppError::UpstreamAccessDenied => 403,
            AppError::UpstreamModelNotReady => 503,
            AppError::UpstreamConnect | AppError::Upstream(_) => 502,
            AppError::UpstreamTimeout => 504,
            AppError::Config(_) | AppError::Internal(_) | AppError::Io(_) | AppError::Serialization(_) => {
                500
            }
        }
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
