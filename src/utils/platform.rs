//! Platform detection.

/// Platforms the sandbox dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Macos,
    Linux,
    /// Windows Subsystem for Linux. WSL2 runs a real kernel and behaves like
    /// Linux; WSL1 lacks user namespaces and is rejected at wrap time.
    Wsl,
    Other,
}

impl Platform {
    /// Detect the current platform.
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            Platform::Macos
        }
        #[cfg(target_os = "linux")]
        {
            if get_wsl_version().is_some() {
                Platform::Wsl
            } else {
                Platform::Linux
            }
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            Platform::Other
        }
    }

    /// Whether sandboxing is supported here. WSL1 lacks the user namespaces
    /// bubblewrap needs; WSL2+ is fine.
    pub fn is_supported(self) -> bool {
        match self {
            Platform::Macos | Platform::Linux => true,
            Platform::Wsl => get_wsl_version().as_deref() != Some("1"),
            Platform::Other => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Macos => "macOS",
            Platform::Linux => "Linux",
            Platform::Wsl => "WSL",
            Platform::Other => "other",
        }
    }
}

/// Get the CPU architecture tag used for seccomp artifact lookup.
pub fn get_arch() -> &'static str {
    #[cfg(target_arch = "x86_64")]
    {
        "x64"
    }
    #[cfg(target_arch = "aarch64")]
    {
        "arm64"
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        "unknown"
    }
}

/// Get the WSL version if running in WSL, from /proc/version.
///
/// Explicit "WSL<digit>" markers win; a bare "microsoft" marker means the
/// original WSL1 kernel format ("4.4.0-19041-Microsoft").
pub fn get_wsl_version() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let proc_version = std::fs::read_to_string("/proc/version").ok()?;
        parse_wsl_version(&proc_version)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(any(target_os = "linux", test))]
fn parse_wsl_version(proc_version: &str) -> Option<String> {
    let lower = proc_version.to_lowercase();

    if let Some(pos) = lower.find("wsl") {
        if let Some(ch) = lower[pos + 3..].chars().next() {
            if ch.is_ascii_digit() {
                return Some(ch.to_string());
            }
        }
    }

    if lower.contains("microsoft") {
        return Some("1".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_arch() {
        let arch = get_arch();
        assert!(arch == "x64" || arch == "arm64" || arch == "unknown");
    }

    #[test]
    fn test_platform_current_matches_target() {
        let platform = Platform::current();
        #[cfg(target_os = "macos")]
        assert_eq!(platform, Platform::Macos);
        #[cfg(target_os = "linux")]
        assert!(matches!(platform, Platform::Linux | Platform::Wsl));
    }

    #[test]
    fn test_wsl_version_parsing() {
        let wsl2 = "Linux version 5.15.90.1-microsoft-standard-WSL2 (oe-user@oe-host)";
        assert_eq!(parse_wsl_version(wsl2), Some("2".to_string()));

        let wsl1 = "Linux version 4.4.0-19041-Microsoft (Microsoft@Microsoft.com)";
        assert_eq!(parse_wsl_version(wsl1), Some("1".to_string()));

        let native = "Linux version 6.2.0-26-generic (buildd@ubuntu)";
        assert_eq!(parse_wsl_version(native), None);
        assert_eq!(parse_wsl_version(""), None);
    }

    #[test]
    fn test_other_platform_unsupported() {
        assert!(!Platform::Other.is_supported());
    }
}
