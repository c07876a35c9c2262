//! Seccomp BPF artifact resolution and staging.
//!
//! The syscall filter is a pre-compiled BPF blob vendored per CPU ABI; it is
//! used verbatim and never assembled at runtime. The default variant blocks
//! socket creation for address families other than AF_UNIX and loopback
//! AF_INET, plus mknod, bpf, ptrace, mount syscalls, module loading, and
//! obsolete I/O syscalls. The open-unix variant leaves AF_UNIX unrestricted
//! for tooling that needs arbitrary local sockets.

use std::path::{Path, PathBuf};

use crate::config::SeccompConfig;
use crate::error::SandboxError;
use crate::utils::get_arch;

/// Which pre-compiled filter variant to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeccompVariant {
    /// AF_UNIX restricted to the proxy sockets.
    RestrictUnix,
    /// AF_UNIX left open (`allow_all_unix_sockets` escape hatch).
    AllowUnix,
}

impl SeccompVariant {
    fn file_name(self) -> &'static str {
        match self {
            SeccompVariant::RestrictUnix => "net-restrict.bpf",
            SeccompVariant::AllowUnix => "net-restrict-open-unix.bpf",
        }
    }
}

/// Locate the vendored BPF blob for the current architecture.
pub fn locate_bpf(
    variant: SeccompVariant,
    config: Option<&SeccompConfig>,
) -> Result<PathBuf, SandboxError> {
    if let Some(cfg) = config {
        if let Some(ref path) = cfg.bpf_path {
            let p = PathBuf::from(path);
            if p.exists() {
                return Ok(p);
            }
        }
    }

    let arch = get_arch();
    let relative = format!("vendor/seccomp/{arch}/{}", variant.file_name());

    let mut checked = Vec::new();
    for base in candidate_bases() {
        let path = base.join(&relative);
        checked.push(path.display().to_string());
        if path.exists() {
            return Ok(path);
        }
    }

    Err(SandboxError::SeccompBlobMissing { arch, checked })
}

fn candidate_bases() -> Vec<PathBuf> {
    let mut bases = vec![PathBuf::from(".")];

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            bases.push(dir.to_path_buf());
            bases.push(dir.join(".."));
            bases.push(dir.join("../.."));
        }
    }

    bases
}

/// Stage the blob to a private temp file the jailer can read from inside
/// the mount namespace, and return its path. The staged copy is owned by
/// the manager and removed on reset.
pub fn stage_bpf(
    variant: SeccompVariant,
    config: Option<&SeccompConfig>,
) -> Result<PathBuf, SandboxError> {
    let source = locate_bpf(variant, config)?;
    let staged = std::env::temp_dir().join(format!(
        "sbx-seccomp-{}-{}",
        std::process::id(),
        variant.file_name()
    ));
    std::fs::copy(&source, &staged)?;
    Ok(staged)
}

/// Remove a previously staged blob.
pub fn remove_staged(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}

/// Remove every blob this process may have staged.
pub fn cleanup_staged() {
    for variant in [SeccompVariant::RestrictUnix, SeccompVariant::AllowUnix] {
        let staged = std::env::temp_dir().join(format!(
            "sbx-seccomp-{}-{}",
            std::process::id(),
            variant.file_name()
        ));
        remove_staged(&staged);
    }
}

/// Check whether the filter artifacts are present.
pub fn is_seccomp_available(config: Option<&SeccompConfig>) -> bool {
    locate_bpf(SeccompVariant::RestrictUnix, config).is_ok()
}
