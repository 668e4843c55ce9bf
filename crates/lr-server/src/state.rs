//! Shared application state, passed to every handler via axum's `State`
//! extractor.

use std::sync::Arc;

use lr_clients::ClientDirectory;
use lr_config::Settings;
use lr_providers::ProviderRegistry;
use lr_ratelimit::RateLimiter;
use lr_types::{AppError, AppResult, ClientRecord};

/// Every long-lived collaborator the pipeline invokes, each behind an
/// `Arc` so cloning `AppState` per request is cheap and never touches
/// the resources themselves — only the directory's inner state and the
/// rate limiter's map are mutated, both via interior mutability.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub directory: Arc<dyn ClientDirectory>,
    pub rate_limiter: Arc<RateLimiter>,
    pub providers: Arc<ProviderRegistry>,
    pub audit: Arc<lr_audit::AuditLogger>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        directory: Arc<dyn ClientDirectory>,
        rate_limiter: Arc<RateLimiter>,
        providers: Arc<ProviderRegistry>,
        audit: Arc<lr_audit::AuditLogger>,
    ) -> Self {
        AppState {
            settings,
            directory,
            rate_limiter,
            providers,
            audit,
        }
    }

    /// Resolve a presented `X-API-Key` to a client record: directory
    /// lookup first, then the legacy comma-separated list. All
    /// comparisons are constant-time.
    pub async fn authenticate(&self, api_key: Option<&str>) -> AppResult<ClientRecord> {
        let api_key = api_key.ok_or(AppError::MissingApiKey)?;

        if let Some(record) = self.directory.lookup(api_key).await {
            return match record.status {
                lr_types::domain::ClientStatus::Suspended => Err(AppError::ClientSuspended),
                lr_types::domain::ClientStatus::Active => Ok(record),
            };
        }

        for valid_key in self.settings.api_keys_list() {
            if lr_utils::crypto::constant_time_eq(api_key, &valid_key) {
                return Ok(ClientRecord::legacy(
                    &valid_key,
                    self.settings.upstream_api_key.clone(),
                    self.settings.rate_limit_rpm,
                ));
            }
        }

        Err(AppError::InvalidApiKey)
    }

    pub fn injection_threshold(&self) -> f64 {
        self.settings.injection_threshold
    }
}
