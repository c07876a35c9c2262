//! Bubblewrap command generation for the Linux jail.

use std::path::Path;

use crate::error::SandboxError;
use crate::policy::Policy;
use crate::sandbox::linux::filesystem::plan_mounts;
use crate::sandbox::linux::seccomp::{stage_bpf, SeccompVariant};
use crate::utils::{quote, resolve_shell};

/// Fd number the seccomp program is passed on. Redirected from the staged
/// blob file on the outer command line.
const SECCOMP_FD: u32 = 9;

/// Check if bubblewrap is available.
pub fn check_bwrap() -> bool {
    std::process::Command::new("bwrap")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Generate the bubblewrap invocation for a command under the given policy.
///
/// The jail unshares PID, IPC, UTS, and cgroup namespaces but keeps the
/// network namespace: egress control comes from the seccomp filter, which
/// confines sockets to AF_UNIX and loopback AF_INET, forcing traffic
/// through the filtering proxy. Capabilities are dropped; bwrap runs
/// unprivileged, so no-new-privs is set as part of filter attachment.
/// `HTTP_PROXY`/`HTTPS_PROXY` are exported whenever network restriction is
/// active, including with an empty allow list, so a later policy update
/// can open access without re-wrapping.
///
/// Returns the shell string plus warnings for rules that could not be
/// expressed as mounts. The wrapped command's exit code propagates through
/// bwrap unchanged.
pub fn generate_bwrap_command(
    command: &str,
    policy: &Policy,
    cwd: &Path,
    proxy_port: Option<u16>,
    allow_all_unix_sockets: bool,
    seccomp_config: Option<&crate::config::SeccompConfig>,
    shell: Option<&str>,
) -> Result<(String, Vec<String>), SandboxError> {
    let shell = resolve_shell(shell);
    let network_active = policy.network_restriction_active();

    let plan = plan_mounts(policy, cwd);

    let mut args: Vec<String> = vec![
        "bwrap".to_string(),
        "--die-with-parent".to_string(),
        "--unshare-pid".to_string(),
        "--unshare-ipc".to_string(),
        "--unshare-uts".to_string(),
        "--unshare-cgroup".to_string(),
        "--cap-drop".to_string(),
        "ALL".to_string(),
    ];

    // Root mount first, then fresh /dev and /proc, then the rest of the
    // plan so rebinds layer correctly.
    let mut ops = plan.ops.iter();
    if let Some(root) = ops.next() {
        args.extend(root.to_bwrap_args());
    }
    args.extend([
        "--dev".to_string(),
        "/dev".to_string(),
        "--proc".to_string(),
        "/proc".to_string(),
        "--tmpfs".to_string(),
        "/run".to_string(),
    ]);
    for op in ops {
        args.extend(op.to_bwrap_args());
    }

    args.push("--chdir".to_string());
    args.push(cwd.display().to_string());

    // Seccomp is mandatory while network restriction is active; without it
    // the jail could open sockets around the proxy.
    let seccomp_path = if network_active {
        let variant = if allow_all_unix_sockets {
            SeccompVariant::AllowUnix
        } else {
            SeccompVariant::RestrictUnix
        };
        let staged = stage_bpf(variant, seccomp_config)?;
        args.push("--seccomp".to_string());
        args.push(SECCOMP_FD.to_string());
        Some(staged)
    } else {
        None
    };

    let inner = build_inner_command(command, network_active, proxy_port);

    args.push("--".to_string());
    args.push(shell.clone());
    args.push("-c".to_string());
    args.push(inner);

    let mut wrapped = args
        .iter()
        .map(|s| quote(s))
        .collect::<Vec<_>>()
        .join(" ");

    if let Some(staged) = seccomp_path {
        wrapped.push_str(&format!(
            " {}<{}",
            SECCOMP_FD,
            quote(&staged.display().to_string())
        ));
    }

    Ok((wrapped, plan.warnings))
}

/// The command run inside the jail: proxy exports (when restricted)
/// followed by the user command.
fn build_inner_command(command: &str, network_active: bool, proxy_port: Option<u16>) -> String {
    match (network_active, proxy_port) {
        (true, Some(port)) => {
            let url = format!("http://localhost:{port}");
            format!(
                "export HTTP_PROXY='{url}' HTTPS_PROXY='{url}' http_proxy='{url}' https_proxy='{url}'; {command}"
            )
        }
        _ => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeccompConfig;
    use crate::policy::NetworkRestriction;
    use std::io::Write;

    fn restricted_policy() -> Policy {
        Policy {
            network_restriction: Some(NetworkRestriction {
                allowed_hosts: vec![],
                denied_hosts: vec![],
            }),
            ..Policy::default()
        }
    }

    fn fake_seccomp() -> (tempfile::TempDir, SeccompConfig) {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("filter.bpf");
        std::fs::File::create(&blob)
            .unwrap()
            .write_all(&[0u8; 8])
            .unwrap();
        let config = SeccompConfig {
            bpf_path: Some(blob.display().to_string()),
        };
        (dir, config)
    }

    #[test]
    fn test_basic_shape() {
        let (wrapped, warnings) = generate_bwrap_command(
            "echo hello",
            &Policy::default(),
            Path::new("/tmp"),
            None,
            false,
            None,
            None,
        )
        .unwrap();

        assert!(wrapped.starts_with("bwrap --die-with-parent"));
        assert!(wrapped.contains("--unshare-pid"));
        assert!(wrapped.contains("--unshare-ipc"));
        assert!(wrapped.contains("--unshare-uts"));
        assert!(wrapped.contains("--unshare-cgroup"));
        assert!(!wrapped.contains("--unshare-net"));
        assert!(wrapped.contains("--cap-drop ALL"));
        assert!(wrapped.contains("--chdir /tmp"));
        assert!(wrapped.ends_with("-- bash -c 'echo hello'"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_network_restriction_exports_proxy_and_attaches_seccomp() {
        let (_dir, seccomp) = fake_seccomp();
        let (wrapped, _) = generate_bwrap_command(
            "curl example.com",
            &restricted_policy(),
            Path::new("/tmp"),
            Some(3128),
            false,
            Some(&seccomp),
            None,
        )
        .unwrap();

        // Proxy env is exported even though the allow list is empty.
        assert!(wrapped.contains("HTTP_PROXY='\"'\"'http://localhost:3128'\"'\"'")
            || wrapped.contains("HTTP_PROXY='http://localhost:3128'"));
        assert!(wrapped.contains("--seccomp 9"));
        assert!(wrapped.contains(" 9<"));
    }

    #[test]
    fn test_seccomp_missing_surfaces_error() {
        let err = generate_bwrap_command(
            "true",
            &restricted_policy(),
            Path::new("/tmp"),
            Some(3128),
            false,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SandboxError::SeccompBlobMissing { .. }));
    }

    #[test]
    fn test_no_seccomp_without_network_restriction() {
        let (wrapped, _) = generate_bwrap_command(
            "true",
            &Policy::default(),
            Path::new("/tmp"),
            None,
            false,
            None,
            None,
        )
        .unwrap();
        assert!(!wrapped.contains("--seccomp"));
        assert!(!wrapped.contains("HTTP_PROXY"));
    }

    #[test]
    fn test_absolute_shell_honored() {
        let (wrapped, _) = generate_bwrap_command(
            "ls",
            &Policy::default(),
            Path::new("/tmp"),
            None,
            false,
            None,
            Some("/usr/bin/fish"),
        )
        .unwrap();
        assert!(wrapped.contains("-- /usr/bin/fish -c ls"));
    }
}
