//! Host matching for proxy decisions.
//!
//! Wildcard semantics are strict: `*.github.com` matches `api.github.com`
//! and `a.b.github.com` but neither `github.com` nor `malicious-github.com`.
//! A bare `*` in the allow list means allow-all (still subject to the deny
//! list). A pattern carrying `:port` only matches that port; patterns
//! without one match any port.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::policy::NetworkRestriction;

/// Asynchronous permission-ask predicate over `(host, port)`. Consulted only
/// when the static rules would deny; its answer becomes the decision.
pub type AskCallback = Arc<dyn Fn(&str, u16) -> BoxFuture<'static, bool> + Send + Sync>;

/// A parsed host pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HostPattern {
    raw: String,
    host: String,
    port: Option<u16>,
}

impl HostPattern {
    fn parse(pattern: &str) -> Self {
        let raw = pattern.to_lowercase();
        match raw.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Self {
                    raw: raw.clone(),
                    host: host.to_string(),
                    port: Some(port),
                },
                Err(_) => Self {
                    raw: raw.clone(),
                    host: raw.clone(),
                    port: None,
                },
            },
            None => Self {
                raw: raw.clone(),
                host: raw.clone(),
                port: None,
            },
        }
    }

    fn matches(&self, host: &str, port: u16) -> bool {
        if let Some(fixed) = self.port {
            if fixed != port {
                return false;
            }
        }

        if self.host == "*" {
            return true;
        }

        if let Some(suffix) = self.host.strip_prefix("*.") {
            // At least one label must precede the suffix; the bare suffix
            // itself does not match.
            return host
                .strip_suffix(suffix)
                .is_some_and(|head| head.ends_with('.') && head.len() > 1);
        }

        host == self.host
    }
}

/// Outcome of evaluating the static rules for a `(host, port)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostDecision {
    Allow,
    /// Matched an explicit deny rule; the ask callback is never consulted.
    DeniedByRule(String),
    /// No allow rule matched; the ask callback may still grant access.
    NotAllowed,
}

impl HostDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, HostDecision::Allow)
    }
}

/// Compiled host filter for one policy snapshot.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    allowed: Vec<HostPattern>,
    denied: Vec<HostPattern>,
    allow_all: bool,
}

impl HostFilter {
    /// Compile a filter from the policy's network restriction.
    pub fn from_restriction(restriction: &NetworkRestriction) -> Self {
        let allowed: Vec<HostPattern> = restriction
            .allowed_hosts
            .iter()
            .map(|p| HostPattern::parse(p))
            .collect();
        let allow_all = allowed.iter().any(|p| p.host == "*" && p.port.is_none());
        Self {
            allowed,
            denied: restriction
                .denied_hosts
                .iter()
                .map(|p| HostPattern::parse(p))
                .collect(),
            allow_all,
        }
    }

    /// A filter that denies everything (no allow rules).
    pub fn deny_all() -> Self {
        Self::default()
    }

    /// Evaluate the static rules: deny list first, then `*`, then allows,
    /// otherwise not-allowed.
    pub fn evaluate(&self, host: &str, port: u16) -> HostDecision {
        let host = host.to_lowercase();

        for pattern in &self.denied {
            if pattern.matches(&host, port) {
                return HostDecision::DeniedByRule(pattern.raw.clone());
            }
        }

        if self.allow_all {
            return HostDecision::Allow;
        }

        for pattern in &self.allowed {
            if pattern.matches(&host, port) {
                return HostDecision::Allow;
            }
        }

        HostDecision::NotAllowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(allowed: &[&str], denied: &[&str]) -> HostFilter {
        HostFilter::from_restriction(&NetworkRestriction {
            allowed_hosts: allowed.iter().map(|s| s.to_string()).collect(),
            denied_hosts: denied.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn test_exact_match() {
        let f = filter(&["example.com"], &[]);
        assert!(f.evaluate("example.com", 443).is_allow());
        assert!(f.evaluate("EXAMPLE.com", 443).is_allow());
        assert_eq!(f.evaluate("other.com", 443), HostDecision::NotAllowed);
        assert_eq!(
            f.evaluate("api.example.com", 443),
            HostDecision::NotAllowed
        );
    }

    #[test]
    fn test_wildcard_strictness() {
        let f = filter(&["*.github.com"], &[]);
        assert!(f.evaluate("api.github.com", 443).is_allow());
        assert!(f.evaluate("a.b.github.com", 443).is_allow());
        assert_eq!(f.evaluate("github.com", 443), HostDecision::NotAllowed);
        assert_eq!(
            f.evaluate("malicious-github.com", 443),
            HostDecision::NotAllowed
        );
    }

    #[test]
    fn test_allow_all_with_denied() {
        let f = filter(
            &["*"],
            &["metadata.google.internal", "169.254.169.254"],
        );
        assert!(f.evaluate("example.com", 443).is_allow());
        assert_eq!(
            f.evaluate("metadata.google.internal", 443),
            HostDecision::DeniedByRule("metadata.google.internal".to_string())
        );
        assert_eq!(
            f.evaluate("169.254.169.254", 80),
            HostDecision::DeniedByRule("169.254.169.254".to_string())
        );
    }

    #[test]
    fn test_deny_takes_precedence_over_allow() {
        let f = filter(&["*.example.com"], &["evil.example.com"]);
        assert!(f.evaluate("api.example.com", 443).is_allow());
        assert_eq!(
            f.evaluate("evil.example.com", 443),
            HostDecision::DeniedByRule("evil.example.com".to_string())
        );
    }

    #[test]
    fn test_empty_allow_denies_everything() {
        let f = filter(&[], &[]);
        assert_eq!(f.evaluate("example.com", 443), HostDecision::NotAllowed);
        assert_eq!(f.evaluate("localhost", 80), HostDecision::NotAllowed);
    }

    #[test]
    fn test_port_fixed_pattern() {
        let f = filter(&["example.com:8443"], &[]);
        assert!(f.evaluate("example.com", 8443).is_allow());
        assert_eq!(f.evaluate("example.com", 443), HostDecision::NotAllowed);
    }

    #[test]
    fn test_port_fixed_deny() {
        let f = filter(&["*"], &["example.com:80"]);
        assert!(f.evaluate("example.com", 443).is_allow());
        assert_eq!(
            f.evaluate("example.com", 80),
            HostDecision::DeniedByRule("example.com:80".to_string())
        );
    }

    #[test]
    fn test_deny_all_filter() {
        let f = HostFilter::deny_all();
        assert_eq!(f.evaluate("anything.com", 443), HostDecision::NotAllowed);
    }
}
