//! Linux sandboxing via bubblewrap and seccomp.

pub mod bwrap;
pub mod filesystem;
pub mod seccomp;

pub use bwrap::{check_bwrap, generate_bwrap_command};
pub use filesystem::{plan_mounts, MountOp, MountPlan};
pub use seccomp::{is_seccomp_available, locate_bpf, remove_staged, stage_bpf, SeccompVariant};
