//! Violation monitoring via the macOS unified log.
//!
//! Seatbelt denials land in the `com.apple.sandbox` log subsystem. Profiles
//! carry a per-command trace tag, so a `log stream` subprocess filtered on
//! that tag attributes each denial back to the wrapped command.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::SandboxError;
use crate::violation::{ViolationKind, ViolationRecord, ViolationStore};

/// Log monitor for sandbox violations.
pub struct LogMonitor {
    child: Option<Child>,
}

impl LogMonitor {
    /// Start streaming denials carrying `log_tag` into the violation store.
    pub async fn start(
        log_tag: String,
        command: Option<String>,
        store: Arc<ViolationStore>,
    ) -> Result<Self, SandboxError> {
        let mut child = Command::new("log")
            .args([
                "stream",
                "--predicate",
                &format!(
                    "subsystem == 'com.apple.sandbox' AND eventMessage CONTAINS '{log_tag}'"
                ),
                "--style",
                "compact",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take();
        if let Some(stdout) = stdout {
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(record) = parse_violation(&line, &log_tag, command.as_deref()) {
                        store.record(record);
                    }
                }
            });
        }

        Ok(Self { child: Some(child) })
    }

    /// Stop the log monitor.
    pub async fn stop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.kill().await;
        }
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

/// Parse a denial line into a violation record.
///
/// Lines look like `... deny(1) file-read-data /t/denied/secret.txt`.
pub fn parse_violation(
    line: &str,
    log_tag: &str,
    command: Option<&str>,
) -> Option<ViolationRecord> {
    if !line.contains(log_tag) || !line.contains("deny") {
        return None;
    }

    let kind = if line.contains("file-write") {
        ViolationKind::Write
    } else if line.contains("file-read") {
        ViolationKind::Read
    } else if line.contains("network") {
        ViolationKind::Network
    } else {
        ViolationKind::Read
    };

    let target = line
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string();

    let mut record = ViolationRecord::new(kind, target);
    if let Some(command) = command {
        record = record.with_process_hint(command);
    }
    Some(record)
}

/// Decode the original command from a `CMD64_<base64>_END_<suffix>` tag.
pub fn decode_command_from_tag(tag: &str) -> Option<String> {
    use base64::Engine;

    let start = tag.find("CMD64_")?;
    let rest = &tag[start + 6..];
    let end = rest.find("_END_")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&rest[..end])
        .ok()?;
    String::from_utf8(decoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_violation_classifies_kind() {
        let tag = "CMD64_dGVzdA==_END_0";

        let write = parse_violation(
            &format!("{tag} deny(1) file-write-unlink /t/denied"),
            tag,
            Some("mv /t/denied /t2"),
        )
        .unwrap();
        assert_eq!(write.kind, ViolationKind::Write);
        assert_eq!(write.target, "/t/denied");
        assert_eq!(write.process_hint.as_deref(), Some("mv /t/denied /t2"));

        let read = parse_violation(
            &format!("{tag} deny(1) file-read-data /etc/shadow"),
            tag,
            None,
        )
        .unwrap();
        assert_eq!(read.kind, ViolationKind::Read);
    }

    #[test]
    fn test_parse_violation_ignores_unrelated_lines() {
        let tag = "CMD64_dGVzdA==_END_0";
        assert!(parse_violation("some other log line", tag, None).is_none());
        assert!(parse_violation(&format!("{tag} allow file-read-data /x"), tag, None).is_none());
    }

    #[test]
    fn test_decode_command_from_tag() {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode("echo hello");
        let tag = format!("CMD64_{encoded}_END_12345678");
        assert_eq!(decode_command_from_tag(&tag), Some("echo hello".to_string()));
        assert_eq!(decode_command_from_tag("garbage"), None);
    }
}
