//! The per-request audit record.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

/// One audit entry per request. Fields are optional/defaulted because a
/// request can fail at any pipeline stage before most of them are
/// known — an auth failure never reaches provider dispatch, for
/// instance, so `upstream_status`/`latency_ms` stay absent.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injection_score: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub injection_categories: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub pii_detections: Vec<String>,
    #[serde(default)]
    pub pii_detection_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_injection_score: Option<f64>,
    #[serde(default)]
    pub response_pii_detection_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u32>,
    pub outcome: String,
}

impl AuditRecord {
    pub fn new(request_id: String) -> Self {
        AuditRecord {
            request_id,
            client_id: None,
            client_ip: None,
            provider: None,
            model: None,
            upstream_status: None,
            latency_ms: None,
            injection_score: None,
            injection_categories: Vec::new(),
            pii_detections: Vec::new(),
            pii_detection_count: 0,
            response_injection_score: None,
            response_pii_detection_count: 0,
            rate_limit_remaining: None,
            outcome: "unknown".to_string(),
        }
    }

    /// Render the wrapping JSON-lines envelope: `timestamp`, `level`,
    /// `logger`, `message`, `request_id`, and the merged audit fields at
    /// the top level. Any value here is already a well-typed JSON
    /// value, so there's no need for a "stringify unknown types"
    /// fallback — `serde_json` enforces that at the type level instead.
    pub fn to_json_line(&self) -> String {
        let mut envelope = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": "INFO",
            "logger": "audit",
            "message": format!("request {} completed: {}", self.request_id, self.outcome),
        });

        if let Value::Object(ref mut map) = envelope {
            if let Value::Object(fields) = serde_json::to_value(self).unwrap_or(Value::Null) {
                map.extend(fields);
            }
        }

        envelope.to_string()
    }
}
