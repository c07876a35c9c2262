//! Utility modules.

pub mod debug;
pub mod path;
pub mod platform;
pub mod shell;

pub use debug::{init_debug_logging, is_debug_enabled, SBX_DEBUG_ENV};
pub use path::{
    ancestors, expand_home, glob_ancestors, is_glob, literal_prefix, normalize,
    pattern_ancestors, resolve_below_public_root,
};
pub use platform::{get_arch, get_wsl_version, Platform};
pub use shell::{join_args, quote, resolve_shell, split_args};
