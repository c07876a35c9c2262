//! Declarative configuration schema (the shape consumed by `initialize` /
//! `update_config`).
//!
//! Absence matters: a missing `network` block means no network restriction
//! at all, while a present block with an empty `allowedDomains` list means
//! deny-all. The same distinction applies to `filesystem.allowWrite`.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SandboxError};

/// Network restriction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Hosts allowed for egress (e.g., "github.com", "*.npmjs.org", "*").
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    /// Hosts explicitly denied, taking precedence over allows.
    #[serde(default)]
    pub denied_domains: Vec<String>,

    /// Bypass proxying entirely; filesystem rules still apply.
    #[serde(default)]
    pub unrestricted_network: Option<bool>,

    /// Select the seccomp variant that leaves AF_UNIX unrestricted (Linux).
    #[serde(default)]
    pub allow_all_unix_sockets: Option<bool>,
}

/// Filesystem restriction configuration.
///
/// `deny_read` and `allow_read` select between the two read semantics and
/// are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemConfig {
    /// Deny-only read mode: everything readable except these patterns.
    #[serde(default)]
    pub deny_read: Option<Vec<String>>,

    /// Allow-only read mode: only these patterns (plus implicit system
    /// paths) are readable.
    #[serde(default)]
    pub allow_read: Option<Vec<String>>,

    /// Carve-outs denied within the allow-read set.
    #[serde(default)]
    pub deny_read_within_allow: Option<Vec<String>>,

    /// Paths writable inside the sandbox. Absent means no write
    /// restriction; an empty list means nothing is writable.
    #[serde(default)]
    pub allow_write: Option<Vec<String>>,

    /// Carve-outs denied within the allow-write set.
    #[serde(default)]
    pub deny_write: Vec<String>,
}

/// Override paths for the seccomp BPF artifacts (testing escape hatch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SeccompConfig {
    /// Path to a custom BPF filter blob.
    pub bpf_path: Option<String>,
}

/// Top-level sandbox configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SandboxHostConfig {
    /// Network restriction; absent means unrestricted egress.
    #[serde(default)]
    pub network: Option<NetworkConfig>,

    /// Filesystem restriction; absent means unrestricted filesystem.
    #[serde(default)]
    pub filesystem: Option<FilesystemConfig>,

    /// Seccomp artifact overrides.
    #[serde(default)]
    pub seccomp: Option<SeccompConfig>,
}

impl SandboxHostConfig {
    /// Validate the configuration shape.
    pub fn validate(&self) -> Result<(), SandboxError> {
        if let Some(ref network) = self.network {
            for pattern in network
                .allowed_domains
                .iter()
                .chain(network.denied_domains.iter())
            {
                validate_host_pattern(pattern)?;
            }
        }

        if let Some(ref fs) = self.filesystem {
            if fs.deny_read.is_some() && fs.allow_read.is_some() {
                return Err(ConfigError::ConflictingReadModes.into());
            }

            let all_patterns = fs
                .deny_read
                .iter()
                .flatten()
                .chain(fs.allow_read.iter().flatten())
                .chain(fs.deny_read_within_allow.iter().flatten())
                .chain(fs.allow_write.iter().flatten())
                .chain(fs.deny_write.iter());
            for pattern in all_patterns {
                validate_path_pattern(pattern)?;
            }
        }

        Ok(())
    }
}

/// Validate a host pattern: `*`, `*.suffix`, or an exact host, each with an
/// optional `:port` suffix.
fn validate_host_pattern(pattern: &str) -> Result<(), SandboxError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidHostPattern {
            pattern: pattern.to_string(),
            reason: "host pattern cannot be empty".to_string(),
        }
        .into());
    }

    let (host, port) = match pattern.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (pattern, None),
    };

    if let Some(port) = port {
        if port.is_empty() || port.parse::<u16>().is_err() {
            return Err(ConfigError::InvalidHostPattern {
                pattern: pattern.to_string(),
                reason: format!("invalid port '{port}'"),
            }
            .into());
        }
    }

    if host == "*" {
        return Ok(());
    }

    let body = host.strip_prefix("*.").unwrap_or(host);
    if body.is_empty() || body.contains('*') {
        return Err(ConfigError::InvalidHostPattern {
            pattern: pattern.to_string(),
            reason: "wildcard is only valid as '*' or a '*.' prefix".to_string(),
        }
        .into());
    }

    for ch in body.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '-' && ch != '_' {
            return Err(ConfigError::InvalidHostPattern {
                pattern: pattern.to_string(),
                reason: format!("invalid character '{ch}'"),
            }
            .into());
        }
    }

    Ok(())
}

/// Validate a path pattern: absolute (or `~`-relative) literal or glob.
fn validate_path_pattern(pattern: &str) -> Result<(), SandboxError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: "path pattern cannot be empty".to_string(),
        }
        .into());
    }

    if !pattern.starts_with('/') && !pattern.starts_with('~') {
        return Err(ConfigError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: "path patterns must be absolute".to_string(),
        }
        .into());
    }

    if pattern.contains('\n') || pattern.contains('\0') {
        return Err(ConfigError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: "path patterns cannot contain control characters".to_string(),
        }
        .into());
    }

    Ok(())
}
