//! Platform-specific sandbox compilation.
//!
//! Both backends are plain text generators, so they compile and are tested
//! on every platform; only [`wrap_command`] dispatches on the host.

pub mod linux;
pub mod macos;

use crate::config::SeccompConfig;
use crate::error::SandboxError;
use crate::policy::Policy;
use crate::utils::Platform;

/// Options threaded from the manager into the platform wrappers.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrapOptions<'a> {
    pub proxy_port: Option<u16>,
    pub shell: Option<&'a str>,
    pub allow_all_unix_sockets: bool,
    pub seccomp: Option<&'a SeccompConfig>,
    pub enable_log_monitor: bool,
}

/// Result of wrapping a command.
#[derive(Debug)]
pub struct WrapResult {
    /// The wrapped shell command string.
    pub command: String,
    /// Log tag for violation monitoring (macOS only).
    pub log_tag: Option<String>,
    /// Warnings generated during wrapping.
    pub warnings: Vec<String>,
}

/// Result of checking sandbox dependencies.
#[derive(Debug, Clone, Default)]
pub struct SandboxDependencyCheck {
    /// Problems that prevent the sandbox from running.
    pub errors: Vec<String>,
    /// Degraded-functionality notes.
    pub warnings: Vec<String>,
}

impl SandboxDependencyCheck {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Self, SandboxError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(SandboxError::MissingDependency(self.errors.join(", ")))
        }
    }
}

/// Check sandboxing dependencies for a platform.
pub fn check_dependencies_detailed(
    platform: Platform,
    seccomp_config: Option<&SeccompConfig>,
) -> SandboxDependencyCheck {
    let mut result = SandboxDependencyCheck::default();

    match platform {
        // sandbox-exec ships with macOS.
        Platform::Macos => {}
        Platform::Linux | Platform::Wsl => {
            if !platform.is_supported() {
                result
                    .errors
                    .push("WSL1 does not support user namespaces".to_string());
                return result;
            }
            if !linux::check_bwrap() {
                result
                    .errors
                    .push("bubblewrap (bwrap) not installed".to_string());
            }
            if !linux::is_seccomp_available(seccomp_config) {
                result.warnings.push(
                    "seccomp BPF artifacts not found - network restriction will fail to wrap"
                        .to_string(),
                );
            }
        }
        Platform::Other => {
            result
                .errors
                .push("no sandbox backend for this platform".to_string());
        }
    }

    result
}

/// Check dependencies, failing on any error.
pub fn check_dependencies(platform: Platform) -> Result<(), SandboxError> {
    check_dependencies_detailed(platform, None)
        .into_result()
        .map(|_| ())
}

/// Wrap a command for a platform under a policy snapshot.
pub fn wrap_command(
    command: &str,
    policy: &Policy,
    platform: Platform,
    options: WrapOptions<'_>,
) -> Result<WrapResult, SandboxError> {
    match platform {
        Platform::Macos => {
            let (wrapped, log_tag) = macos::wrap_command(
                command,
                policy,
                options.proxy_port,
                options.shell,
                options.enable_log_monitor,
            )?;
            Ok(WrapResult {
                command: wrapped,
                log_tag,
                warnings: vec![],
            })
        }
        Platform::Linux | Platform::Wsl => {
            if !platform.is_supported() {
                return Err(SandboxError::PlatformUnsupported(
                    "WSL1 lacks the user namespaces bubblewrap requires".to_string(),
                ));
            }
            let cwd = std::env::current_dir()?;
            let (wrapped, warnings) = linux::generate_bwrap_command(
                command,
                policy,
                &cwd,
                options.proxy_port,
                options.allow_all_unix_sockets,
                options.seccomp,
                options.shell,
            )?;
            Ok(WrapResult {
                command: wrapped,
                log_tag: None,
                warnings,
            })
        }
        Platform::Other => Err(SandboxError::PlatformUnsupported(
            "no sandbox backend for this platform".to_string(),
        )),
    }
}
