//! Structured audit logging for the s3gate gateway.
//!
//! Every request produces exactly one [`AuditEntry`], serialized as a single
//! JSON object per line and written to stdout, an append-only file, or both.
//! Serialization happens outside the writer lock; only the write calls are
//! inside it, so records are never interleaved.
//!
//! A disabled logger is a no-op. A write error on any sink aborts that entry
//! with an error but does not terminate the process.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use s3gate_config::{AuditConfig, AuditOutput};

/// One audit record. Optional fields are omitted from the JSON when empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// RFC 3339 UTC timestamp.
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub client_id: String,
    pub tenant_id: String,
    pub action: String,
    /// Resource ARN.
    pub resource: String,
    pub bucket: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    /// `"allow"` or `"deny"`.
    pub decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,
    pub source_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(rename = "error", skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
}

fn serialize_timestamp<S: serde::Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Fields shared by the allow and deny constructors.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub request_id: String,
    pub client_id: String,
    pub tenant_id: String,
    pub action: String,
    pub resource: String,
    pub bucket: String,
    pub key: String,
    pub source_ip: String,
    pub user_agent: String,
    pub duration_ms: i64,
}

impl AuditEntry {
    /// Entry for an allowed request that reached the backend.
    #[must_use]
    pub fn allow(info: RequestInfo, status_code: u16) -> Self {
        Self::build(info, "allow", None, Some(status_code))
    }

    /// Entry for a denied request.
    #[must_use]
    pub fn deny(info: RequestInfo, deny_reason: &str) -> Self {
        Self::build(info, "deny", Some(deny_reason.to_owned()), None)
    }

    /// Attach the raw backend error message (`S3_ERROR` entries).
    #[must_use]
    pub fn with_error(mut self, error_msg: impl Into<String>) -> Self {
        self.error_msg = error_msg.into();
        self
    }

    fn build(
        info: RequestInfo,
        decision: &'static str,
        deny_reason: Option<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: info.request_id,
            client_id: info.client_id,
            tenant_id: info.tenant_id,
            action: info.action,
            resource: info.resource,
            bucket: info.bucket,
            key: info.key,
            decision,
            deny_reason,
            source_ip: info.source_ip,
            user_agent: info.user_agent,
            duration_ms: info.duration_ms,
            status_code,
            error_msg: String::new(),
        }
    }
}

/// Errors surfaced by the audit logger.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The audit file could not be opened at startup.
    #[error("failed to open audit log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The entry could not be serialized.
    #[error("failed to marshal audit entry: {0}")]
    Marshal(#[from] serde_json::Error),

    /// A sink rejected the write; the entry was aborted.
    #[error("failed to write audit entry: {0}")]
    Write(#[from] std::io::Error),
}

/// Writes audit records as JSON lines to a set of sinks behind one mutex.
///
/// The logger does not know what its sinks are; anything that can write one
/// line atomically qualifies. It owns its file descriptor and releases it
/// when dropped.
pub struct AuditLogger {
    enabled: bool,
    sinks: Mutex<Vec<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Build a logger from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Open`] if the audit file cannot be opened for
    /// appending.
    pub fn new(cfg: &AuditConfig) -> Result<Self, AuditError> {
        if !cfg.enabled {
            return Ok(Self::disabled());
        }

        let mut sinks: Vec<Box<dyn Write + Send>> = Vec::new();
        match cfg.output {
            AuditOutput::Stdout => sinks.push(Box::new(std::io::stdout())),
            AuditOutput::File => sinks.push(open_audit_file(&cfg.file_path)?),
            AuditOutput::Both => {
                sinks.push(Box::new(std::io::stdout()));
                sinks.push(open_audit_file(&cfg.file_path)?);
            }
        }

        Ok(Self {
            enabled: true,
            sinks: Mutex::new(sinks),
        })
    }

    /// A logger that drops every entry.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// A logger writing to the given sinks. Used by tests and embedders.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn Write + Send>>) -> Self {
        Self {
            enabled: true,
            sinks: Mutex::new(sinks),
        }
    }

    /// Write one entry as a single JSON line to every sink.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] if serialization fails or any sink write
    /// fails. The process continues either way; the caller only logs it.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        if !self.enabled {
            return Ok(());
        }

        // Marshal outside the lock; only the writes are serialized.
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut sinks = self.sinks.lock().expect("audit lock poisoned");
        for sink in sinks.iter_mut() {
            sink.write_all(&line)?;
            sink.flush()?;
        }
        Ok(())
    }
}

fn open_audit_file(path: &str) -> Result<Box<dyn Write + Send>, AuditError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AuditError::Open {
            path: path.to_owned(),
            source,
        })?;
    Ok(Box::new(file))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// A shared in-memory sink for capturing what the logger wrote.
    #[derive(Clone, Default)]
    struct CaptureSink(Arc<Mutex<Vec<u8>>>);

    impl CaptureSink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("capture lock").clone()).expect("utf8")
        }
    }

    impl Write for CaptureSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// A sink that always fails.
    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("sink unavailable"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn request_info() -> RequestInfo {
        RequestInfo {
            request_id: "req-1".to_owned(),
            client_id: "client-1".to_owned(),
            tenant_id: "tenant-001".to_owned(),
            action: "s3:GetObject".to_owned(),
            resource: "arn:aws:s3:::tenant-001-data/file.txt".to_owned(),
            bucket: "tenant-001-data".to_owned(),
            key: "file.txt".to_owned(),
            source_ip: "10.0.0.1".to_owned(),
            user_agent: "aws-cli/2.0".to_owned(),
            duration_ms: 12,
        }
    }

    #[test]
    fn test_should_write_allow_entry_as_single_json_line() {
        let sink = CaptureSink::default();
        let logger = AuditLogger::with_sinks(vec![Box::new(sink.clone())]);

        logger
            .log(&AuditEntry::allow(request_info(), 200))
            .expect("should log");

        let line = sink.contents();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: serde_json::Value =
            serde_json::from_str(line.trim_end()).expect("valid JSON");
        assert_eq!(value["decision"], "allow");
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["clientId"], "client-1");
        assert_eq!(value["tenantId"], "tenant-001");
        assert_eq!(value["action"], "s3:GetObject");
        assert_eq!(value["resource"], "arn:aws:s3:::tenant-001-data/file.txt");
        assert_eq!(value["bucket"], "tenant-001-data");
        assert_eq!(value["key"], "file.txt");
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["durationMs"], 12);
        assert_eq!(value["sourceIp"], "10.0.0.1");
        // Allow entries carry no deny fields.
        assert!(value.get("denyReason").is_none());
        assert!(value.get("error").is_none());
        // Timestamp is RFC 3339 UTC.
        let ts = value["timestamp"].as_str().expect("timestamp string");
        assert!(ts.ends_with('Z'));
        DateTime::parse_from_rfc3339(ts).expect("RFC 3339 timestamp");
    }

    #[test]
    fn test_should_omit_empty_optional_fields_on_deny() {
        let sink = CaptureSink::default();
        let logger = AuditLogger::with_sinks(vec![Box::new(sink.clone())]);

        let mut info = request_info();
        info.key = String::new();
        info.user_agent = String::new();
        logger
            .log(&AuditEntry::deny(info, "DENY_TENANT_BOUNDARY"))
            .expect("should log");

        let value: serde_json::Value =
            serde_json::from_str(sink.contents().trim_end()).expect("valid JSON");
        assert_eq!(value["decision"], "deny");
        assert_eq!(value["denyReason"], "DENY_TENANT_BOUNDARY");
        assert!(value.get("key").is_none());
        assert!(value.get("userAgent").is_none());
        assert!(value.get("statusCode").is_none());
    }

    #[test]
    fn test_should_carry_backend_error_message() {
        let sink = CaptureSink::default();
        let logger = AuditLogger::with_sinks(vec![Box::new(sink.clone())]);

        logger
            .log(&AuditEntry::deny(request_info(), "S3_ERROR").with_error("NoSuchKey: not found"))
            .expect("should log");

        let value: serde_json::Value =
            serde_json::from_str(sink.contents().trim_end()).expect("valid JSON");
        assert_eq!(value["denyReason"], "S3_ERROR");
        assert_eq!(value["error"], "NoSuchKey: not found");
    }

    #[test]
    fn test_should_write_to_all_sinks() {
        let first = CaptureSink::default();
        let second = CaptureSink::default();
        let logger =
            AuditLogger::with_sinks(vec![Box::new(first.clone()), Box::new(second.clone())]);

        logger
            .log(&AuditEntry::allow(request_info(), 204))
            .expect("should log");

        assert_eq!(first.contents(), second.contents());
        assert!(!first.contents().is_empty());
    }

    #[test]
    fn test_should_report_error_when_a_sink_fails() {
        let logger = AuditLogger::with_sinks(vec![Box::new(FailingSink)]);
        let result = logger.log(&AuditEntry::allow(request_info(), 200));
        assert!(matches!(result, Err(AuditError::Write(_))));
    }

    #[test]
    fn test_should_do_nothing_when_disabled() {
        let logger = AuditLogger::disabled();
        assert!(logger.log(&AuditEntry::allow(request_info(), 200)).is_ok());
    }

    #[test]
    fn test_should_build_disabled_logger_from_config() {
        let cfg = AuditConfig::default();
        let logger = AuditLogger::new(&cfg).expect("should build");
        assert!(!logger.enabled);
    }

    #[test]
    fn test_should_append_to_audit_file() {
        let path = std::env::temp_dir().join(format!("s3gate-audit-test-{}.log", std::process::id()));
        std::fs::remove_file(&path).ok();

        let cfg = AuditConfig {
            enabled: true,
            output: AuditOutput::File,
            file_path: path.display().to_string(),
        };

        {
            let logger = AuditLogger::new(&cfg).expect("should open file");
            logger
                .log(&AuditEntry::allow(request_info(), 200))
                .expect("should log");
            logger
                .log(&AuditEntry::deny(request_info(), "DENY_POLICY"))
                .expect("should log");
        }

        let contents = std::fs::read_to_string(&path).expect("read audit file");
        std::fs::remove_file(&path).ok();
        assert_eq!(contents.lines().count(), 2);
        for line in contents.lines() {
            serde_json::from_str::<serde_json::Value>(line).expect("each line is JSON");
        }
    }
}
