//! Operational logging setup and per-request audit trail.
//!
//! `init_tracing` wires up free-form operational logs via
//! `tracing_subscriber::registry()` with an `EnvFilter` and a JSON
//! `fmt` layer. [`AuditLogger`] is a separate, narrower concern: exactly
//! one structured JSON line per request, emitted to stdout and
//! optionally appended to `AUDIT_LOG_FILE`.

mod record;

pub use record::AuditRecord;

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use chrono::Utc;
use parking_lot::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide tracing subscriber. Safe to call once at
/// startup; a second call is a no-op (errors are swallowed) since tests
/// may share a process.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .try_init();
}

/// Emits one JSON line per request. `AUDIT_LOG_FILE` empty means
/// stdout-only; otherwise every record is appended to both.
pub struct AuditLogger {
    file: Option<Mutex<BufWriter<File>>>,
}

impl AuditLogger {
    /// `path` empty ⇒ stdout only. A file that can't be opened is
    /// treated as a configuration error: a typo'd path should fail
    /// loudly at startup, not drop every audit record silently.
    pub fn new(path: &str) -> std::io::Result<Self> {
        if path.is_empty() {
            return Ok(AuditLogger { file: None });
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(AuditLogger {
            file: Some(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn stdout_only() -> Self {
        AuditLogger { file: None }
    }

    /// Emit one audit record. Always goes to stdout via `tracing`;
    /// additionally appended to the configured file, if any.
    pub fn log(&self, record: &AuditRecord) {
        let line = record.to_json_line();

        tracing::info!(target: "audit", request_id = %record.request_id, "{line}");

        if let Some(file) = &self.file {
            let mut writer = file.lock();
            if writeln!(writer, "{line}").is_ok() {
                let _ = writer.flush();
            }
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        AuditLogger::stdout_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn stdout_only_logger_does_not_require_a_file() {
        let logger = AuditLogger::stdout_only();
        let record = AuditRecord::new("req-1".to_string());
        logger.log(&record);
    }

    #[test]
    fn file_logger_appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let logger = AuditLogger::new(path.to_str().unwrap()).unwrap();

        logger.log(&AuditRecord::new("req-1".to_string()));
        logger.log(&AuditRecord::new("req-2".to_string()));

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("req-1"));
        assert!(lines[1].contains("req-2"));
        for line in &lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["level"], "INFO");
            assert_eq!(parsed["logger"], "audit");
        }
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing("info");
        init_tracing("info");
    }

    #[test]
    fn timestamp_field_is_iso8601_utc() {
        let record = AuditRecord::new("req-x".to_string());
        let line = record.to_json_line();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        let ts = parsed["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        let _ = Utc::now();
    }
}
