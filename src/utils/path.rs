//! Path and pattern utilities.
//!
//! Path rules come in two syntactic flavors: literal absolute paths (which
//! cover the path and all descendants) and glob patterns. Classification is
//! purely syntactic so that rule authors get predictable behavior.

use std::path::{Path, PathBuf};

/// Check if a pattern contains glob metacharacters (`*`, `?`, `[`, `**`).
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?') || pattern.contains('[')
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.display().to_string();
        }
    }
    path.to_string()
}

/// Normalize a path string for rule compilation.
///
/// Expands `~`, collapses `.` and `..` components lexically, and strips
/// trailing slashes. User-supplied rules are used as written: symlinks are
/// NOT resolved here (see [`resolve_below_public_root`] for the one case
/// where resolution is wanted).
pub fn normalize(path: &str) -> String {
    let expanded = expand_home(path);
    let mut parts: Vec<&str> = Vec::new();
    let absolute = expanded.starts_with('/');

    for component in expanded.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    if absolute {
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        }
    } else if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Resolve symlinks for a path, but only when it sits below one of the
/// well-known public roots. Rule paths outside these roots are kept as
/// written so a rule on a symlinked home directory stays on the link.
pub fn resolve_below_public_root(path: &str) -> String {
    const PUBLIC_ROOTS: &[&str] = &["/tmp", "/var", "/private", "/etc"];

    if PUBLIC_ROOTS.iter().any(|root| {
        path == *root || path.starts_with(&format!("{root}/"))
    }) {
        if let Ok(canonical) = std::fs::canonicalize(path) {
            return canonical.display().to_string();
        }
    }
    path.to_string()
}

/// Enumerate a path and every ancestor directory up to `/`, in order.
///
/// `/a/b/c` yields `[/a/b/c, /a/b, /a, /]`. Works the same for files and
/// directories; no filesystem access is performed.
pub fn ancestors(path: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut current = PathBuf::from(normalize(path));

    loop {
        out.push(current.clone());
        if current == Path::new("/") {
            break;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                current = parent.to_path_buf();
            }
            _ => {
                out.push(PathBuf::from("/"));
                break;
            }
        }
    }

    out
}

/// The deepest literal directory prefix of a glob pattern.
///
/// `/a/b/**/*.txt` → `/a/b`. A pattern whose first component is already a
/// glob has prefix `/`.
pub fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::from("/");
    for component in pattern.split('/') {
        if component.is_empty() {
            continue;
        }
        if is_glob(component) {
            break;
        }
        prefix.push(component);
    }
    prefix
}

/// Ancestors of a glob pattern: the deepest literal directory prefix plus
/// its ancestors. `/a/b/**/*.txt` → `[/a/b, /a, /]`. These feed the
/// write-unlink rename defense for glob deny rules.
pub fn glob_ancestors(pattern: &str) -> Vec<PathBuf> {
    ancestors(&literal_prefix(pattern).display().to_string())
}

/// Ancestor enumeration that dispatches on pattern kind: the pattern itself
/// plus its ancestors for a literal, [`glob_ancestors`] for a glob.
pub fn pattern_ancestors(pattern: &str) -> Vec<PathBuf> {
    if is_glob(pattern) {
        glob_ancestors(pattern)
    } else {
        ancestors(pattern)
    }
}
