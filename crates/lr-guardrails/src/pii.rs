//! PII detection and redaction.
//!
//! Patterns are tried in a fixed order; every match is recorded, credit
//! card candidates additionally have to pass a Luhn check or they're
//! silently discarded. Redaction replaces the *first* remaining
//! occurrence of each match's literal text in the running redacted copy,
//! in match order — this can collapse two occurrences of the same
//! literal text into a single redaction.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use lr_types::{PiiAction, PiiDetection, PiiKind, PiiResult};

struct PiiPattern {
    regex: Regex,
    kind: PiiKind,
}

static PATTERNS: Lazy<Vec<PiiPattern>> = Lazy::new(|| {
    vec![
        PiiPattern {
            regex: Regex::new(r"\b\d{3}[-\s]\d{2}[-\s]\d{4}\b").unwrap(),
            kind: PiiKind::Ssn,
        },
        PiiPattern {
            regex: Regex::new(r"\b(?:\d[-\s]?){12,18}\d\b").unwrap(),
            kind: PiiKind::CreditCard,
        },
        PiiPattern {
            regex: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
            kind: PiiKind::Email,
        },
        PiiPattern {
            regex: Regex::new(r"(?:\+1[-.\s])?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").unwrap(),
            kind: PiiKind::Phone,
        },
        PiiPattern {
            regex: Regex::new(
                r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b",
            )
            .unwrap(),
            kind: PiiKind::IpAddress,
        },
    ]
});

/// Validate a candidate credit-card number with the Luhn checksum.
fn luhn_check(number: &str) -> bool {
    let digits: Vec<u32> = number.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }

    let checksum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    checksum % 10 == 0
}

/// Scan `content` for PII, applying `action` to decide the resulting
/// `PiiResult` shape.
pub fn scan_for_pii(content: &str, action: PiiAction) -> PiiResult {
    if content.trim().is_empty() {
        return PiiResult {
            clean: true,
            ..Default::default()
        };
    }

    let mut detections: Vec<PiiDetection> = Vec::new();
    let mut kinds_seen: Vec<PiiKind> = Vec::new();
    let mut redacted = content.to_string();

    for pattern in PATTERNS.iter() {
        for m in pattern.regex.find_iter(content) {
            let matched_text = m.as_str().to_string();

            if pattern.kind == PiiKind::CreditCard && !luhn_check(&matched_text) {
                continue;
            }

            if !kinds_seen.contains(&pattern.kind) {
                kinds_seen.push(pattern.kind);
            }
            detections.push(PiiDetection {
                kind: pattern.kind,
                matched_text: matched_text.clone(),
            });

            if let Some(pos) = redacted.find(&matched_text) {
                redacted.replace_range(pos..pos + matched_text.len(), pattern.kind.placeholder());
            }
        }
    }

    if detections.is_empty() {
        return PiiResult {
            clean: true,
            ..Default::default()
        };
    }

    let detection_count = detections.len();

    debug!("PII scan: {} detections, action {:?}", detection_count, action);

    match action {
        PiiAction::Block => PiiResult {
            clean: false,
            detections: kinds_seen,
            detection_count,
            redacted_content: None,
        },
        PiiAction::Redact => PiiResult {
            clean: false,
            detections: kinds_seen,
            detection_count,
            redacted_content: Some(redacted),
        },
        PiiAction::LogOnly => PiiResult {
            clean: true,
            detections: kinds_seen,
            detection_count,
            redacted_content: None,
        },
    }
}
