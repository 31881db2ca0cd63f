//! Diagnostic log for unexpected call failures.
//!
//! When a call hits an error that is neither a connection failure nor a
//! remote error, the client appends the payload it sent, the raw response
//! body and the error to this file. Each line is prefixed with a local
//! timestamp.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::warn;

/// Timestamp format for diagnostic lines.
const TIMESTAMP_FORMAT: &str = "%Y%m%d %H%M%S";

/// One failed attempt, as recorded in the diagnostic log.
#[derive(Debug, Clone)]
pub struct DiagnosticEntry<'a> {
    /// Serialized envelope that was sent.
    pub payload: &'a str,
    /// Raw response body, if one was received.
    pub response: Option<&'a str>,
    /// The error that made the attempt fail.
    pub error: &'a str,
}

/// Append-only diagnostic log file.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    path: PathBuf,
}

impl DiagnosticLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry, logging (not returning) any write failure.
    pub fn record(&self, entry: &DiagnosticEntry<'_>) {
        if let Err(e) = self.try_record(entry) {
            warn!("Failed to write diagnostic log {}: {:#}", self.path.display(), e);
        }
    }

    fn try_record(&self, entry: &DiagnosticEntry<'_>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        let response = entry.response.unwrap_or("<none>");
        let text = format!(
            "{stamp}: payload {}\n{stamp}: res {}\n{stamp}: e {}\n",
            entry.payload, response, entry.error
        );
        file.write_all(text.as_bytes())
            .context("Failed to write diagnostic entry")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log_path(test_name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "peaceful-pie-test-{}-{}-{}/rpc.log",
            test_name,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn test_record_appends_timestamped_lines() {
        let path = temp_log_path("append");
        let log = DiagnosticLog::new(&path);

        log.record(&DiagnosticEntry {
            payload: r#"{"method":"reset"}"#,
            response: Some("not json"),
            error: "expected value at line 1 column 1",
        });
        log.record(&DiagnosticEntry {
            payload: r#"{"method":"step"}"#,
            response: None,
            error: "decode failed",
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].ends_with(r#": payload {"method":"reset"}"#));
        assert!(lines[1].ends_with(": res not json"));
        assert!(lines[4].ends_with(": res <none>"));
        assert!(lines[5].ends_with(": e decode failed"));

        // "YYYYMMDD HHMMSS: " prefix
        let stamp = lines[0].split(": ").next().unwrap();
        assert_eq!(stamp.len(), 15);
        assert!(stamp.chars().filter(|c| c.is_ascii_digit()).count() == 14);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_record_failure_is_not_fatal() {
        // A directory cannot be opened as a log file
        let dir = std::env::temp_dir();
        let log = DiagnosticLog::new(&dir);
        log.record(&DiagnosticEntry {
            payload: "{}",
            response: None,
            error: "x",
        });
    }
}
