//! Command wrapping for macOS sandbox-exec.

use std::path::PathBuf;

use crate::error::SandboxError;
use crate::policy::Policy;
use crate::sandbox::macos::profile::{generate_log_tag, generate_profile};
use crate::utils::{quote, resolve_shell};

/// Wrap a command with sandbox-exec.
///
/// When network restriction is active, `HTTP_PROXY`/`HTTPS_PROXY` are
/// prefixed so everything inside the sandbox routes through the filtering
/// proxy. The prefix is emitted even when the allow list is empty, so a
/// later policy update can open access without re-wrapping.
pub fn wrap_command(
    command: &str,
    policy: &Policy,
    proxy_port: Option<u16>,
    shell: Option<&str>,
    enable_log_monitor: bool,
) -> Result<(String, Option<String>), SandboxError> {
    let shell = resolve_shell(shell);

    let log_tag = if enable_log_monitor {
        Some(generate_log_tag(command))
    } else {
        None
    };

    let cwd = std::env::current_dir()?;
    let profile = generate_profile(policy, proxy_port, &cwd, log_tag.as_deref());
    let profile_path = write_profile_to_temp(&profile)?;

    let mut wrapped = String::new();
    if policy.network_restriction_active() {
        if let Some(port) = proxy_port {
            wrapped.push_str(&proxy_env_prefix(port));
        }
    }
    wrapped.push_str(&format!(
        "sandbox-exec -f {} {} -c {}",
        quote(&profile_path.display().to_string()),
        quote(&shell),
        quote(command)
    ));

    Ok((wrapped, log_tag))
}

fn proxy_env_prefix(port: u16) -> String {
    let url = format!("http://localhost:{port}");
    format!(
        "HTTP_PROXY={url} HTTPS_PROXY={url} http_proxy={url} https_proxy={url} ",
    )
}

/// Write the profile next to other per-process temp files.
fn write_profile_to_temp(profile: &str) -> Result<PathBuf, SandboxError> {
    use std::io::Write;

    let path = std::env::temp_dir().join(format!("sbx-profile-{}.sb", std::process::id()));
    let mut file = std::fs::File::create(&path)?;
    file.write_all(profile.as_bytes())?;

    Ok(path)
}

/// Remove this process's temp profile, if any.
pub fn cleanup_temp_profiles() {
    let path = std::env::temp_dir().join(format!("sbx-profile-{}.sb", std::process::id()));
    if path.exists() {
        let _ = std::fs::remove_file(&path);
    }
}
