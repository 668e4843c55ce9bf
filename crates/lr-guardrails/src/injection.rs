//! Prompt-injection detection.
//!
//! A static, ordered table of `(pattern, weight, category)` triples.
//! Each matched pattern contributes `weight * occurrence_count` to a
//! cumulative risk score; scores at or above the configured threshold
//! block the request. The *display* score is clamped to `[0, 1]` for
//! reporting, but the blocking decision is made against the unclamped
//! total — these are kept as two separate values on purpose, so a
//! heavily-over-threshold prompt doesn't look identical to a
//! barely-over-threshold one in the reported score.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use lr_types::{InjectionCategory, ScanResult};

use InjectionCategory::*;

static PATTERNS: Lazy<Vec<(Regex, f64, InjectionCategory)>> = Lazy::new(|| {
    let raw: &[(&str, f64, InjectionCategory)] = &[
        // --- Instruction override ---
        (r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+(instructions|prompts|rules)", 0.5, InstructionOverride),
        (r"(?i)disregard\s+(all\s+)?(previous|prior|above|your)\s+(instructions|prompts|rules|programming)", 0.5, InstructionOverride),
        (r"(?i)forget\s+(all\s+)?(previous|prior|your)\s+(instructions|rules|context|programming)", 0.5, InstructionOverride),
        (r"(?i)do\s+not\s+follow\s+(your|any|the)\s+(previous|prior|original)\s+(instructions|rules)", 0.5, InstructionOverride),
        (r"(?i)override\s+(your|all|the)\s+(instructions|rules|guidelines|programming)", 0.4, InstructionOverride),
        (r"(?i)new\s+instructions?\s*:", 0.3, InstructionOverride),
        // --- Role manipulation ---
        (r"(?i)you\s+are\s+now\s+", 0.4, RoleManipulation),
        (r"(?i)act\s+as\s+(an?\s+)?(unrestricted|unfiltered|uncensored|evil)", 0.5, RoleManipulation),
        (r"(?i)pretend\s+(you'?re?|to\s+be)\s+(an?\s+)?(unrestricted|unfiltered|different\s+ai)", 0.5, RoleManipulation),
        (r"(?i)\bDAN\s*(mode)?\b", 0.6, RoleManipulation),
        (r"(?i)jailbreak", 0.7, RoleManipulation),
        (r"(?i)developer\s+mode\s+(enabled|on|activated)", 0.5, RoleManipulation),
        // --- Delimiter injection ---
        (r"(?i)<\|?(system|im_start|im_end|endoftext)\|?>", 0.6, DelimiterInjection),
        (r"(?i)\[SYSTEM\]", 0.4, DelimiterInjection),
        (r"(?i)#{3,}\s*(system|instruction|prompt)", 0.3, DelimiterInjection),
        (r"(?i)```\s*(system|instruction)", 0.3, DelimiterInjection),
        // --- Context manipulation ---
        (r"(?i)(respond|answer|reply)\s+(without|with\s+no)\s+(restrictions|limits|filters|guidelines)", 0.5, ContextManipulation),
        (r"(?i)no\s+(ethical|moral|safety)\s+(guidelines|restrictions|filters|limits)", 0.5, ContextManipulation),
        (r"(?i)bypass\s+(your|all|the|any)\s+(restrictions|filters|safety|guidelines)", 0.6, ContextManipulation),
        (r"(?i)enable\s+(unrestricted|unfiltered|uncensored)\s+mode", 0.5, ContextManipulation),
    ];

    raw.iter()
        .map(|(pattern, weight, category)| (Regex::new(pattern).expect("static pattern is valid"), *weight, *category))
        .collect()
});

/// Scan `content` for prompt-injection attempts, blocking if the
/// cumulative score reaches `threshold`.
pub fn scan_prompt(content: &str, threshold: f64) -> ScanResult {
    if content.trim().is_empty() {
        return ScanResult {
            allowed: true,
            risk_score: 0.0,
            reason: "empty".to_string(),
            matched_categories: Vec::new(),
        };
    }

    let mut total_score = 0.0f64;
    let mut matched: Vec<InjectionCategory> = Vec::new();

    for (pattern, weight, category) in PATTERNS.iter() {
        let hits = pattern.find_iter(content).count();
        if hits > 0 {
            total_score += weight * hits as f64;
            if !matched.contains(category) {
                matched.push(*category);
            }
        }
    }

    let display_score = (total_score.min(1.0) * 100.0).round() / 100.0;

    debug!(
        "Injection scan: {} categories matched, score {:.2}, threshold {:.2}",
        matched.len(),
        total_score,
        threshold
    );

    if total_score >= threshold {
        return ScanResult {
            allowed: false,
            risk_score: display_score,
            reason: format!(
                "Injection detected: {}",
                matched.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            ),
            matched_categories: matched,
        };
    }

    let reason = if matched.is_empty() {
        "pass".to_string()
    } else {
        format!(
            "Low-risk patterns: {}",
            matched.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
        )
    };

    ScanResult {
        allowed: true,
        risk_score: display_score,
        reason,
        matched_categories: matched,
    }
}
