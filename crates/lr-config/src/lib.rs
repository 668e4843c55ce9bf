//! Runtime settings for the gateway, loaded once from environment
//! variables and then passed around as a read-only snapshot. Tests
//! build their own [`Settings`] value with [`Settings::for_test`]
//! rather than touching process environment.

use lr_types::{AppError, AppResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Comma-separated legacy API keys, the fallback used when a
    /// presented key doesn't match any client directory record.
    pub gateway_api_keys: String,
    pub upstream_base_url: String,
    pub upstream_api_key: String,
    pub injection_threshold: f64,
    pub pii_action: String,
    pub response_pii_action: String,
    pub rate_limit_rpm: u32,
    pub client_store_backend: String,
    pub client_config_path: String,
    pub dynamodb_table_name: String,
    pub aws_region: String,
    pub log_level: String,
    pub audit_log_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            gateway_api_keys: "dev-key-1".to_string(),
            upstream_base_url: "https://api.openai.com".to_string(),
            upstream_api_key: String::new(),
            injection_threshold: 0.7,
            pii_action: "redact".to_string(),
            response_pii_action: "log_only".to_string(),
            rate_limit_rpm: 60,
            client_store_backend: "json".to_string(),
            client_config_path: "clients.json".to_string(),
            dynamodb_table_name: "llm-gateway-clients".to_string(),
            aws_region: "us-east-1".to_string(),
            log_level: "INFO".to_string(),
            audit_log_file: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from process environment, falling back to the
    /// defaults above for anything unset.
    pub fn from_env() -> AppResult<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::Environment::default())
            .build()
            .map_err(|e| AppError::Config(format!("failed to build settings: {e}")))?;

        cfg.try_deserialize()
            .map_err(|e| AppError::Config(format!("failed to parse settings: {e}")))
    }

    /// A settings snapshot for tests — avoids coupling test behavior to
    /// the ambient process environment.
    pub fn for_test() -> Self {
        Settings::default()
    }

    /// Parsed, deduplicated legacy API keys (empty entries dropped).
    pub fn api_keys_list(&self) -> Vec<String> {
        self.gateway_api_keys
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn pii_action(&self) -> lr_types::PiiAction {
        self.pii_action.parse().unwrap_or(lr_types::PiiAction::Redact)
    }

    pub fn response_pii_action(&self) -> lr_types::PiiAction {
        self.response_pii_action
            .parse()
            .unwrap_or(lr_types::PiiAction::LogOnly)
    }

    /// `true` when running somewhere that cannot hold open SSE
    /// connections.
    pub fn is_serverless(&self) -> bool {
        std::env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.injection_threshold, 0.7);
        assert_eq!(s.rate_limit_rpm, 60);
        assert_eq!(s.pii_action, "redact");
        assert_eq!(s.response_pii_action, "log_only");
    }

    #[test]
    fn api_keys_list_trims_and_drops_empty() {
        let mut s = Settings::default();
        s.gateway_api_keys = " key-a, key-b ,, key-c".to_string();
        assert_eq!(s.api_keys_list(), vec!["key-a", "key-b", "key-c"]);
    }
}
