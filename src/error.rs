//! Error types for the sandbox host.

use thiserror::Error;

/// Main error type for sandbox operations.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform not supported: {0}")]
    PlatformUnsupported(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Proxy bind failed: {0}")]
    ProxyBindFailed(String),

    #[error("Sandbox manager already initialized with a different policy")]
    AlreadyInitialized,

    #[error("Sandbox manager not initialized")]
    NotInitialized,

    #[error("Seccomp BPF filter not found for architecture '{arch}' (checked {checked:?})")]
    SeccompBlobMissing {
        arch: &'static str,
        checked: Vec<String>,
    },

    #[error("Profile generation error: {0}")]
    ProfileGeneration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-shape errors, surfaced to the caller at normalization time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid host pattern '{pattern}': {reason}")]
    InvalidHostPattern { pattern: String, reason: String },

    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern { pattern: String, reason: String },

    #[error("'denyRead' and 'allowRead' are mutually exclusive")]
    ConflictingReadModes,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
