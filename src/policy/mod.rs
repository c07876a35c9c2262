//! Normalized policy snapshots.
//!
//! A [`Policy`] is the immutable, validated form of a [`SandboxHostConfig`].
//! Snapshots are replace-only: the manager swaps whole `Arc<Policy>` values
//! and never mutates one in place, so a wrapper or proxy decision always
//! sees a coherent policy.

use std::path::{Path, PathBuf};

use crate::config::{FilesystemConfig, SandboxHostConfig};
use crate::error::{Result, SandboxError};
use crate::utils::normalize;

/// Read-restriction semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRestriction {
    /// Everything readable except the listed patterns. An empty list is no
    /// restriction at all.
    DenyOnly { deny: Vec<String> },
    /// Only the listed patterns (plus implicit system paths) are readable.
    AllowOnly {
        allow: Vec<String>,
        deny_within_allow: Vec<String>,
    },
}

impl ReadRestriction {
    /// Whether this restriction actually restricts anything.
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, ReadRestriction::DenyOnly { deny } if deny.is_empty())
    }
}

/// Write restriction: always allow-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRestriction {
    pub allow: Vec<String>,
    pub deny_within_allow: Vec<String>,
}

/// Network restriction. An empty `allowed_hosts` means deny-all, which is
/// why the restriction's *presence* is tracked separately from its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRestriction {
    pub allowed_hosts: Vec<String>,
    pub denied_hosts: Vec<String>,
}

/// An immutable, normalized policy snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub read_restriction: ReadRestriction,
    pub write_restriction: Option<WriteRestriction>,
    pub network_restriction: Option<NetworkRestriction>,
    pub unrestricted_network: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            read_restriction: ReadRestriction::DenyOnly { deny: Vec::new() },
            write_restriction: None,
            network_restriction: None,
            unrestricted_network: false,
        }
    }
}

impl Policy {
    /// Normalize a validated configuration into a policy snapshot.
    pub fn from_config(config: &SandboxHostConfig) -> Result<Self> {
        config.validate()?;

        let fs = config.filesystem.clone().unwrap_or_default();
        let read_restriction = normalize_read(&fs)?;

        let write_restriction = fs.allow_write.map(|allow| WriteRestriction {
            allow: normalize_patterns(&allow),
            deny_within_allow: normalize_patterns(&fs.deny_write),
        });

        let (network_restriction, unrestricted_network) = match &config.network {
            Some(network) => {
                let unrestricted = network.unrestricted_network.unwrap_or(false);
                let restriction = NetworkRestriction {
                    allowed_hosts: lowercase_dedup(&network.allowed_domains),
                    denied_hosts: lowercase_dedup(&network.denied_domains),
                };
                (Some(restriction), unrestricted)
            }
            None => (None, false),
        };

        Ok(Self {
            read_restriction,
            write_restriction,
            network_restriction,
            unrestricted_network,
        })
    }

    /// Whether the filtering proxy must be running for this policy.
    pub fn network_restriction_active(&self) -> bool {
        self.network_restriction.is_some() && !self.unrestricted_network
    }

    /// Cheap structural hash of the whole policy.
    pub fn content_hash(&self) -> u64 {
        let mut hash = Fnv1a::new();
        hash_read(&mut hash, &self.read_restriction);
        if let Some(ref write) = self.write_restriction {
            hash.write_str("w");
            hash_patterns(&mut hash, &write.allow);
            hash_patterns(&mut hash, &write.deny_within_allow);
        }
        hash.write_u64(self.network_hash());
        hash.finish()
    }

    /// Hash of the network fields only, so the proxy can short-circuit
    /// updates that did not alter network rules.
    pub fn network_hash(&self) -> u64 {
        let mut hash = Fnv1a::new();
        if let Some(ref network) = self.network_restriction {
            hash.write_str("n");
            hash_patterns(&mut hash, &network.allowed_hosts);
            hash_patterns(&mut hash, &network.denied_hosts);
        }
        hash.write_u64(self.unrestricted_network as u64);
        hash.finish()
    }
}

fn normalize_read(fs: &FilesystemConfig) -> Result<ReadRestriction> {
    match (&fs.deny_read, &fs.allow_read) {
        (Some(_), Some(_)) => Err(SandboxError::Config(
            crate::error::ConfigError::ConflictingReadModes,
        )),
        (None, Some(allow)) => Ok(ReadRestriction::AllowOnly {
            allow: normalize_patterns(allow),
            deny_within_allow: normalize_patterns(
                fs.deny_read_within_allow.as_deref().unwrap_or(&[]),
            ),
        }),
        // deny_read_within_allow is meaningless without allow_read; it is
        // ignored rather than rejected so partial configs stay loadable.
        (deny, None) => Ok(ReadRestriction::DenyOnly {
            deny: normalize_patterns(deny.as_deref().unwrap_or(&[])),
        }),
    }
}

/// Normalize patterns and drop duplicates, preserving first-seen order.
fn normalize_patterns(patterns: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    patterns
        .iter()
        .map(|p| normalize(p))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn lowercase_dedup(patterns: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    patterns
        .iter()
        .map(|p| p.to_lowercase())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn hash_read(hash: &mut Fnv1a, read: &ReadRestriction) {
    match read {
        ReadRestriction::DenyOnly { deny } => {
            hash.write_str("rd");
            hash_patterns(hash, deny);
        }
        ReadRestriction::AllowOnly {
            allow,
            deny_within_allow,
        } => {
            hash.write_str("ra");
            hash_patterns(hash, allow);
            hash_patterns(hash, deny_within_allow);
        }
    }
}

fn hash_patterns(hash: &mut Fnv1a, patterns: &[String]) {
    for pattern in patterns {
        hash.write_str(pattern);
        hash.write_u64(0x1f);
    }
    hash.write_u64(patterns.len() as u64);
}

/// FNV-1a, enough for change detection (not a security boundary).
struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    fn write_str(&mut self, s: &str) {
        for byte in s.as_bytes() {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(0x100_0000_01b3);
        }
    }

    fn write_u64(&mut self, v: u64) {
        for byte in v.to_le_bytes() {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(0x100_0000_01b3);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// System paths a usable shell needs, implicitly readable in allow-only
/// mode. Appended to the effective allow set before compilation.
pub const IMPLICIT_READ_PATHS: &[&str] = &[
    "/bin",
    "/sbin",
    "/usr",
    "/lib",
    "/lib32",
    "/lib64",
    "/opt",
    "/etc",
    "/dev",
    "/proc",
    "/System",
    "/Library",
    "/private/etc",
    "/var/db",
];

/// The effective implicit read set for a given working directory.
pub fn implicit_read_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = IMPLICIT_READ_PATHS.iter().map(PathBuf::from).collect();
    paths.push(cwd.to_path_buf());
    paths
}
