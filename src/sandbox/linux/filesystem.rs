//! Bind mount planning for the bubblewrap jail.
//!
//! Mount order is significant: bwrap applies arguments left to right, so
//! writable binds come first and read-only rebinds layered on top win.
//! A bind mount also turns its target into a mount point, which makes
//! `rename(2)` of the target fail with EBUSY; the rename defense for
//! read-denied paths leans on that.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::policy::{implicit_read_paths, Policy, ReadRestriction};
use crate::utils::{is_glob, literal_prefix, pattern_ancestors};

/// A single mount operation in the jail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOp {
    /// Bind a path read-only at the same location.
    RoBind(PathBuf),
    /// Bind a path read-write at the same location.
    RwBind(PathBuf),
    /// Cover a path with an empty tmpfs, hiding its contents.
    Tmpfs(PathBuf),
}

impl MountOp {
    /// Convert to bwrap arguments.
    pub fn to_bwrap_args(&self) -> Vec<String> {
        match self {
            MountOp::RoBind(path) => vec![
                "--ro-bind".to_string(),
                path.display().to_string(),
                path.display().to_string(),
            ],
            MountOp::RwBind(path) => vec![
                "--bind".to_string(),
                path.display().to_string(),
                path.display().to_string(),
            ],
            MountOp::Tmpfs(path) => {
                vec!["--tmpfs".to_string(), path.display().to_string()]
            }
        }
    }
}

/// The computed mount set plus warnings about rules that could not be
/// expressed as mounts.
#[derive(Debug, Default)]
pub struct MountPlan {
    pub ops: Vec<MountOp>,
    pub warnings: Vec<String>,
}

/// Plan the jail's mounts for a policy snapshot.
pub fn plan_mounts(policy: &Policy, cwd: &Path) -> MountPlan {
    let mut plan = MountPlan::default();

    match &policy.read_restriction {
        ReadRestriction::DenyOnly { deny } => {
            plan_deny_only(&mut plan, policy, deny);
        }
        ReadRestriction::AllowOnly {
            allow,
            deny_within_allow,
        } => {
            plan_allow_only(&mut plan, policy, allow, deny_within_allow, cwd);
        }
    }

    plan
}

/// Deny-only reads: the root stays visible (read-only when a write
/// restriction exists, writable otherwise), write allows are rebound
/// read-write, and denied subtrees plus the ancestors that would otherwise
/// be renameable are pinned read-only on top. A pinned path is also a
/// mount point, so renaming it fails outright.
fn plan_deny_only(plan: &mut MountPlan, policy: &Policy, deny_read: &[String]) {
    let unrestricted_writes = policy.write_restriction.is_none();
    if unrestricted_writes {
        plan.ops.push(MountOp::RwBind(PathBuf::from("/")));
    } else {
        plan.ops.push(MountOp::RoBind(PathBuf::from("/")));
    }

    let rw_roots = push_write_mounts(plan, policy);

    let mut pinned: HashSet<PathBuf> = HashSet::new();
    for pattern in deny_read {
        let anchor = deny_anchor(plan, pattern);
        let Some(anchor) = anchor else { continue };

        for ancestor in pattern_ancestors(&anchor.display().to_string()) {
            if ancestor == Path::new("/") {
                continue;
            }
            let inside_rw = unrestricted_writes
                || rw_roots.iter().any(|root| ancestor.starts_with(root));
            let is_anchor = ancestor == anchor;
            // The anchor itself always becomes a mount point so it cannot
            // be renamed; intermediate ancestors only need pinning when a
            // writable root would otherwise leave them renameable.
            if (is_anchor || inside_rw) && ancestor.exists() && pinned.insert(ancestor.clone()) {
                plan.ops.push(MountOp::RoBind(ancestor));
            }
        }
    }
}

/// Allow-only reads: tmpfs over `/` and only the allowed plus implicit
/// system paths are bound back in.
fn plan_allow_only(
    plan: &mut MountPlan,
    policy: &Policy,
    allow_read: &[String],
    deny_within_allow: &[String],
    cwd: &Path,
) {
    plan.ops.push(MountOp::Tmpfs(PathBuf::from("/")));

    let mut bound: HashSet<PathBuf> = HashSet::new();

    for path in implicit_read_paths(cwd) {
        if path.exists() && bound.insert(path.clone()) {
            plan.ops.push(MountOp::RoBind(path));
        }
    }

    // With no write restriction, writes are unrestricted over whatever is
    // visible, so the allowed paths are bound writable.
    let unrestricted_writes = policy.write_restriction.is_none();
    for pattern in allow_read {
        let Some(anchor) = deny_anchor(plan, pattern) else {
            continue;
        };
        if anchor.exists() && bound.insert(anchor.clone()) {
            if unrestricted_writes {
                plan.ops.push(MountOp::RwBind(anchor));
            } else {
                plan.ops.push(MountOp::RoBind(anchor));
            }
        } else if !anchor.exists() {
            plan.warnings
                .push(format!("Read path '{}' does not exist", anchor.display()));
        }
    }

    push_write_mounts(plan, policy);

    // Carve-outs are hidden entirely rather than just made read-only.
    for pattern in deny_within_allow {
        let Some(anchor) = deny_anchor(plan, pattern) else {
            continue;
        };
        if anchor.exists() {
            plan.ops.push(MountOp::Tmpfs(anchor));
        }
    }
}

/// Append writable binds and their read-only carve-outs; returns the
/// writable roots for ancestor pinning.
fn push_write_mounts(plan: &mut MountPlan, policy: &Policy) -> Vec<PathBuf> {
    let mut rw_roots = Vec::new();

    let Some(ref write) = policy.write_restriction else {
        return rw_roots;
    };

    for pattern in &write.allow {
        if is_glob(pattern) {
            plan.warnings.push(format!(
                "Glob write pattern '{pattern}' is not supported on Linux; ignoring"
            ));
            continue;
        }
        let path = PathBuf::from(pattern);
        if path.exists() {
            rw_roots.push(path.clone());
            plan.ops.push(MountOp::RwBind(path));
        } else {
            plan.warnings
                .push(format!("Write path '{pattern}' does not exist"));
        }
    }

    for pattern in &write.deny_within_allow {
        if is_glob(pattern) {
            plan.warnings.push(format!(
                "Glob write pattern '{pattern}' is not supported on Linux; ignoring"
            ));
            continue;
        }
        let path = PathBuf::from(pattern);
        if path.exists() {
            plan.ops.push(MountOp::RoBind(path));
        }
    }

    rw_roots
}

/// The mountable anchor for a pattern: the path itself for a literal, the
/// deepest literal directory prefix for a glob (with a warning, since the
/// glob's tail cannot be expressed as a mount).
fn deny_anchor(plan: &mut MountPlan, pattern: &str) -> Option<PathBuf> {
    if is_glob(pattern) {
        let prefix = literal_prefix(pattern);
        plan.warnings.push(format!(
            "Glob pattern '{pattern}' coarsened to '{}' on Linux",
            prefix.display()
        ));
        if prefix == Path::new("/") {
            return None;
        }
        Some(prefix)
    } else {
        Some(PathBuf::from(pattern))
    }
}
