//! Sandbox Host - OS-level sandboxing for enforcing filesystem and network
//! restrictions on arbitrary commands.
//!
//! A declarative policy (reachable hosts, readable paths, writable paths)
//! is compiled into platform enforcement without containerization:
//! - macOS: Seatbelt profiles via sandbox-exec
//! - Linux: bubblewrap namespaces plus a pre-compiled seccomp filter
//!
//! Network egress is funneled through a filtering HTTP/HTTPS proxy that
//! applies the host allowlist live, so policy updates reach running
//! sandboxed processes.

pub mod cli;
pub mod config;
pub mod error;
pub mod manager;
pub mod policy;
pub mod proxy;
pub mod sandbox;
pub mod utils;
pub mod violation;

pub use config::{FilesystemConfig, NetworkConfig, SandboxHostConfig, SeccompConfig};
pub use error::{ConfigError, Result, SandboxError};
pub use manager::SandboxManager;
pub use policy::{Policy, ReadRestriction};
pub use violation::{ViolationKind, ViolationRecord, ViolationStore};

/// Re-export of commonly used items.
pub mod prelude {
    pub use crate::config::SandboxHostConfig;
    pub use crate::error::{Result, SandboxError};
    pub use crate::manager::SandboxManager;
    pub use crate::policy::Policy;
    pub use crate::violation::{ViolationRecord, ViolationStore};
}
