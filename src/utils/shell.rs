//! Shell quoting and shell selection.

/// Quote a string for use in a shell command.
/// Plain strings pass through; anything else is single-quoted with embedded
/// single quotes escaped (`it's` -> `'it'"'"'s'`).
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if !needs_quoting(s) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

fn needs_quoting(s: &str) -> bool {
    s.chars().any(|c| {
        matches!(
            c,
            ' ' | '\t'
                | '\n'
                | '\r'
                | '"'
                | '\''
                | '\\'
                | '$'
                | '`'
                | '!'
                | '*'
                | '?'
                | '['
                | ']'
                | '{'
                | '}'
                | '('
                | ')'
                | '<'
                | '>'
                | '|'
                | '&'
                | ';'
                | '#'
                | '~'
        )
    })
}

/// Join arguments with proper quoting for shell execution.
pub fn join_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|s| quote(s.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a shell command string into arguments.
pub fn split_args(s: &str) -> Result<Vec<String>, shell_words::ParseError> {
    shell_words::split(s)
}

/// Resolve the shell to run the wrapped command under.
///
/// Defaults to `bash`; an absolute path is honored as given; a bare name is
/// looked up on PATH by the wrapper's own shell, so it passes through too.
pub fn resolve_shell(shell: Option<&str>) -> String {
    match shell {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => "bash".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("simple"), "simple");
        assert_eq!(quote("with space"), "'with space'");
        assert_eq!(quote("it's"), "'it'\"'\"'s'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("$var"), "'$var'");
    }

    #[test]
    fn test_join_args() {
        let args = vec!["echo", "hello world", "it's"];
        assert_eq!(join_args(args), "echo 'hello world' 'it'\"'\"'s'");
    }

    #[test]
    fn test_split_args() {
        let args = split_args("echo 'hello world' test").unwrap();
        assert_eq!(args, vec!["echo", "hello world", "test"]);
    }

    #[test]
    fn test_resolve_shell() {
        assert_eq!(resolve_shell(None), "bash");
        assert_eq!(resolve_shell(Some("zsh")), "zsh");
        assert_eq!(resolve_shell(Some("/usr/local/bin/fish")), "/usr/local/bin/fish");
        assert_eq!(resolve_shell(Some("")), "bash");
    }
}
