//! Shared domain types and error types for the LLM security gateway

pub mod domain;
pub mod errors;

pub use domain::{
    ClientRecord, ClientStatus, InjectionCategory, PiiAction, PiiDetection, PiiKind, PiiResult,
    Provider, ProviderResponse, RateLimitDecision, ScanResult, StreamChunk,
};
pub use errors::{AppError, AppResult};
