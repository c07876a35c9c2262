//! Seatbelt (SBPL) profile generation.
//!
//! Profiles start from `(deny default)` and grant selectively. The one
//! subtle, load-bearing part is the rename defense: Seatbelt's `file-read*`
//! class does not cover `rename(2)`, so a read-denied file could be moved
//! (or any ancestor directory of it moved) to a readable location. Every
//! read-deny therefore also denies `file-write-unlink` on the pattern and
//! every ancestor directory up to `/`.

use std::fmt::Write as _;
use std::path::Path;

use crate::policy::{implicit_read_paths, Policy, ReadRestriction};
use crate::sandbox::macos::glob::glob_to_regex;
use crate::utils::{is_glob, pattern_ancestors};

/// Session suffix for log tagging, generated once per process.
static SESSION_SUFFIX: once_cell::sync::Lazy<String> = once_cell::sync::Lazy::new(|| {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!("{:08x}", rng.gen::<u32>())
});

/// Generate a unique, greppable log tag for a command so `log stream`
/// output can be attributed back to it.
pub fn generate_log_tag(command: &str) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(command);
    format!("CMD64_{}_END_{}", encoded, *SESSION_SUFFIX)
}

/// Generate a Seatbelt profile for the given policy snapshot.
pub fn generate_profile(
    policy: &Policy,
    proxy_port: Option<u16>,
    cwd: &Path,
    log_tag: Option<&str>,
) -> String {
    let mut profile = String::new();

    profile.push_str("(version 1)\n");
    profile.push_str("(deny default)\n\n");

    if let Some(tag) = log_tag {
        let _ = writeln!(profile, "; Log tag: {tag}");
        let _ = writeln!(profile, "(trace \"{tag}\")\n");
    }

    profile.push_str("; Process\n");
    profile.push_str("(allow process-exec)\n");
    profile.push_str("(allow process-fork)\n");
    profile.push_str("(allow process-info*)\n");
    profile.push_str("(allow process-codesigning-status*)\n\n");

    profile.push_str("; Signals\n");
    profile.push_str("(allow signal (target self))\n\n");

    // kern.proc.all is covered so tooling inside the sandbox can enumerate
    // PIDs.
    profile.push_str("; Sysctl\n");
    profile.push_str("(allow sysctl-read)\n\n");

    profile.push_str("; Mach\n");
    profile.push_str("(allow mach-lookup)\n");
    profile.push_str("(allow mach-register)\n\n");

    profile.push_str("; IPC\n");
    profile.push_str("(allow ipc-posix*)\n");
    profile.push_str("(allow ipc-sysv*)\n\n");

    profile.push_str("; Devices\n");
    profile.push_str("(allow file-read* file-write* file-ioctl\n");
    profile.push_str("  (literal \"/dev/null\")\n");
    profile.push_str("  (literal \"/dev/zero\")\n");
    profile.push_str("  (literal \"/dev/tty\"))\n");
    profile.push_str("(allow file-read*\n");
    profile.push_str("  (literal \"/dev/random\")\n");
    profile.push_str("  (literal \"/dev/urandom\"))\n\n");

    profile.push_str("; Network\n");
    generate_network_rules(&mut profile, policy, proxy_port);
    profile.push('\n');

    profile.push_str("; Filesystem\n");
    generate_read_rules(&mut profile, policy, cwd);
    profile.push('\n');
    generate_write_rules(&mut profile, policy);
    profile.push('\n');
    generate_rename_defense(&mut profile, policy);

    profile
}

fn generate_network_rules(profile: &mut String, policy: &Policy, proxy_port: Option<u16>) {
    if !policy.network_restriction_active() {
        profile.push_str("(allow network*)\n");
        return;
    }

    // All egress funnels through the loopback proxy; the proxy enforces the
    // host rules. TLS clients still need a handful of mach services.
    if let Some(port) = proxy_port {
        let _ = writeln!(
            profile,
            "(allow network-outbound (remote tcp \"localhost:{port}\"))"
        );
    }
    profile.push_str("(allow network-outbound (remote unix-socket))\n");
    profile.push_str("(allow network-inbound (local tcp \"localhost:*\"))\n");
    profile.push_str("(allow mach-lookup\n");
    profile.push_str("  (global-name \"com.apple.SecurityServer\")\n");
    profile.push_str("  (global-name \"com.apple.trustd\")\n");
    profile.push_str("  (global-name \"com.apple.networkd\"))\n");
}

fn generate_read_rules(profile: &mut String, policy: &Policy, cwd: &Path) {
    match &policy.read_restriction {
        ReadRestriction::DenyOnly { deny } => {
            profile.push_str("; Read access (deny-only)\n");
            profile.push_str("(allow file-read*)\n");
            for pattern in deny {
                push_path_rule(profile, "deny", "file-read*", pattern);
            }
        }
        ReadRestriction::AllowOnly {
            allow,
            deny_within_allow,
        } => {
            profile.push_str("; Read access (allow-only)\n");
            profile.push_str("(deny file-read*)\n");
            for pattern in allow {
                push_path_rule(profile, "allow", "file-read*", pattern);
            }
            // System paths a usable shell needs are always readable.
            for path in implicit_read_paths(cwd) {
                let escaped = escape_seatbelt_string(&path.display().to_string());
                let _ = writeln!(profile, "(allow file-read* (subpath \"{escaped}\"))");
            }
            for pattern in deny_within_allow {
                push_path_rule(profile, "deny", "file-read*", pattern);
            }
        }
    }
}

fn generate_write_rules(profile: &mut String, policy: &Policy) {
    match &policy.write_restriction {
        None => {
            profile.push_str("; Write access (unrestricted)\n");
            profile.push_str("(allow file-write*)\n");
        }
        Some(write) => {
            profile.push_str("; Write access (allow-only)\n");
            profile.push_str("(deny file-write*)\n");
            for pattern in &write.allow {
                push_path_rule(profile, "allow", "file-write*", pattern);
            }
            for pattern in &write.deny_within_allow {
                push_path_rule(profile, "deny", "file-write*", pattern);
            }
        }
    }
}

/// Deny `file-write-unlink` on every read-denied pattern, every
/// write-deny-within-allow pattern, and all of their ancestors up to `/`.
/// For glob patterns the ancestor chain starts at the deepest literal
/// directory prefix.
fn generate_rename_defense(profile: &mut String, policy: &Policy) {
    let mut protected: Vec<&str> = Vec::new();

    match &policy.read_restriction {
        ReadRestriction::DenyOnly { deny } => protected.extend(deny.iter().map(String::as_str)),
        ReadRestriction::AllowOnly {
            deny_within_allow, ..
        } => protected.extend(deny_within_allow.iter().map(String::as_str)),
    }
    if let Some(ref write) = policy.write_restriction {
        protected.extend(write.deny_within_allow.iter().map(String::as_str));
    }

    if protected.is_empty() {
        return;
    }

    profile.push_str("; Rename defense\n");
    let mut emitted = std::collections::HashSet::new();
    for pattern in protected {
        if is_glob(pattern) && emitted.insert(pattern.to_string()) {
            let regex = glob_to_regex(pattern);
            let _ = writeln!(profile, "(deny file-write-unlink (regex #\"{regex}\"))");
        }
        for ancestor in pattern_ancestors(pattern) {
            let path = ancestor.display().to_string();
            if emitted.insert(path.clone()) {
                let escaped = escape_seatbelt_string(&path);
                let _ = writeln!(profile, "(deny file-write-unlink (literal \"{escaped}\"))");
            }
        }
    }
}

/// Emit a single allow/deny rule, choosing a subpath predicate for literal
/// patterns and an anchored regex for globs.
fn push_path_rule(profile: &mut String, mode: &str, access: &str, pattern: &str) {
    if is_glob(pattern) {
        let regex = glob_to_regex(pattern);
        let _ = writeln!(profile, "({mode} {access} (regex #\"{regex}\"))");
    } else {
        let escaped = escape_seatbelt_string(pattern);
        let _ = writeln!(profile, "({mode} {access} (subpath \"{escaped}\"))");
    }
}

/// Escape a path for an SBPL string literal.
fn escape_seatbelt_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
