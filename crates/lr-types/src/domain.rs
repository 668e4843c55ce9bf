//! Core domain types, shared by every layer of the gateway.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Which upstream a [`ClientRecord`] is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Bedrock,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Bedrock => "bedrock",
        }
    }
}

/// Whether a client is allowed to make requests right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Suspended,
}

/// The gateway's principal entity. Immutable once looked up — a
/// directory reload swaps the whole record set atomically, never
/// mutates a record an in-flight request is holding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,
    pub api_key: String,
    #[serde(default = "default_provider")]
    pub provider: Provider,
    #[serde(default = "default_rpm")]
    pub rate_limit_rpm: u32,
    #[serde(default)]
    pub model_allowlist: HashSet<String>,
    #[serde(default)]
    pub upstream_api_key: String,
    #[serde(default)]
    pub bedrock_model_id: String,
    #[serde(default = "default_status")]
    pub status: ClientStatus,
}

fn default_provider() -> Provider {
    Provider::Openai
}

fn default_rpm() -> u32 {
    60
}

fn default_status() -> ClientStatus {
    ClientStatus::Active
}

impl ClientRecord {
    /// `true` iff `model` is allowed for this client (empty allowlist = all allowed).
    pub fn allows_model(&self, model: &str) -> bool {
        self.model_allowlist.is_empty() || self.model_allowlist.contains(model)
    }

    /// Synthesize an ephemeral record for the legacy comma-separated-keys
    /// fallback. Never persisted, never looked up again.
    pub fn legacy(api_key: &str, upstream_api_key: String, rate_limit_rpm: u32) -> Self {
        let suffix: String = api_key.chars().take(8).collect();
        ClientRecord {
            client_id: format!("legacy-{suffix}"),
            api_key: api_key.to_string(),
            provider: Provider::Openai,
            rate_limit_rpm,
            model_allowlist: HashSet::new(),
            upstream_api_key,
            bedrock_model_id: String::new(),
            status: ClientStatus::Active,
        }
    }
}

/// Prompt-injection detection categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionCategory {
    InstructionOverride,
    RoleManipulation,
    DelimiterInjection,
    ContextManipulation,
}

impl InjectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionCategory::InstructionOverride => "instruction_override",
            InjectionCategory::RoleManipulation => "role_manipulation",
            InjectionCategory::DelimiterInjection => "delimiter_injection",
            InjectionCategory::ContextManipulation => "context_manipulation",
        }
    }
}

/// Result of running the injection scanner over a piece of text.
///
/// `risk_score` is the *display* score, clamped to `[0, 1]` and rounded to
/// two decimals. The blocking decision is made against the unclamped
/// cumulative score and is deliberately not recoverable from this struct
/// alone — the two are kept separate rather than merged into one
/// clamped value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub allowed: bool,
    pub risk_score: f64,
    pub reason: String,
    pub matched_categories: Vec<InjectionCategory>,
}

/// Kinds of PII the scanner recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PiiKind {
    Ssn,
    CreditCard,
    Email,
    Phone,
    IpAddress,
}

impl PiiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::Ssn => "SSN",
            PiiKind::CreditCard => "CREDIT_CARD",
            PiiKind::Email => "EMAIL",
            PiiKind::Phone => "PHONE",
            PiiKind::IpAddress => "IP_ADDRESS",
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiKind::Ssn => "[REDACTED_SSN]",
            PiiKind::CreditCard => "[REDACTED_CC]",
            PiiKind::Email => "[REDACTED_EMAIL]",
            PiiKind::Phone => "[REDACTED_PHONE]",
            PiiKind::IpAddress => "[REDACTED_IP]",
        }
    }
}

/// One matched PII span, in the order it was found. Order drives the
/// first-occurrence redaction rule: only the first span of a given kind
/// is replaced, later repeats of the same literal text are left alone.
#[derive(Debug, Clone)]
pub struct PiiDetection {
    pub kind: PiiKind,
    pub matched_text: String,
}

/// Result of the PII scanner. Invariant: `clean ⇒ detection_count == 0
/// && redacted_content.is_none()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PiiResult {
    pub clean: bool,
    pub detections: Vec<PiiKind>,
    pub detection_count: usize,
    pub redacted_content: Option<String>,
}

/// The configured behavior when PII is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    Redact,
    Block,
    LogOnly,
}

impl std::str::FromStr for PiiAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redact" => Ok(PiiAction::Redact),
            "block" => Ok(PiiAction::Block),
            "log_only" => Ok(PiiAction::LogOnly),
            other => Err(format!("invalid PII action: {other}")),
        }
    }
}

/// A provider's unary response: status code plus a structured JSON
/// body. The body is forwarded to the client largely verbatim.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

/// One chunk of a streamed response. The terminal chunk has
/// `is_done = true` and `data == "[DONE]"`.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub data: String,
    pub is_done: bool,
    pub text_delta: String,
}

impl StreamChunk {
    pub fn done() -> Self {
        StreamChunk {
            data: "[DONE]".to_string(),
            is_done: true,
            text_delta: String::new(),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_seconds: u64,
}
