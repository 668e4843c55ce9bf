//! Content-security scanners for the gateway: prompt-injection detection
//! and PII detection/redaction. Both operate over plain text and are
//! reused, unmodified, to scan model output for the response scanner.

pub mod injection;
pub mod pii;

pub use injection::scan_prompt;
pub use pii::scan_for_pii;
