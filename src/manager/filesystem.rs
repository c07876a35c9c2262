//! Derived restriction shapes exposed to callers.
//!
//! The stored policy keeps explicit empty sets (empty allow means deny-all,
//! which callers must be able to distinguish from no restriction), but the
//! getter surface normalizes empty collections to absent.

use crate::policy::{Policy, ReadRestriction};

/// Caller-facing view of the read restriction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FsReadRestrictionView {
    /// Deny-only patterns, when in deny-only mode.
    pub deny: Option<Vec<String>>,
    /// Allow-only patterns, when in allow-only mode.
    pub allow: Option<Vec<String>>,
    pub deny_within_allow: Option<Vec<String>>,
}

/// Caller-facing view of the write restriction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FsWriteRestrictionView {
    pub allow: Option<Vec<String>>,
    pub deny_within_allow: Option<Vec<String>>,
}

/// Caller-facing view of the network restriction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkRestrictionView {
    pub allowed_hosts: Option<Vec<String>>,
    pub denied_hosts: Option<Vec<String>>,
    pub unrestricted: bool,
}

fn absent_if_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

/// Read-restriction view for a policy.
pub fn read_view(policy: &Policy) -> FsReadRestrictionView {
    match &policy.read_restriction {
        ReadRestriction::DenyOnly { deny } => FsReadRestrictionView {
            deny: absent_if_empty(deny),
            ..Default::default()
        },
        ReadRestriction::AllowOnly {
            allow,
            deny_within_allow,
        } => FsReadRestrictionView {
            deny: None,
            allow: absent_if_empty(allow),
            deny_within_allow: absent_if_empty(deny_within_allow),
        },
    }
}

/// Write-restriction view for a policy; None when unrestricted.
pub fn write_view(policy: &Policy) -> Option<FsWriteRestrictionView> {
    policy
        .write_restriction
        .as_ref()
        .map(|write| FsWriteRestrictionView {
            allow: absent_if_empty(&write.allow),
            deny_within_allow: absent_if_empty(&write.deny_within_allow),
        })
}

/// Network-restriction view for a policy; None when no restriction was
/// configured.
pub fn network_view(policy: &Policy) -> Option<NetworkRestrictionView> {
    policy
        .network_restriction
        .as_ref()
        .map(|network| NetworkRestrictionView {
            allowed_hosts: absent_if_empty(&network.allowed_hosts),
            denied_hosts: absent_if_empty(&network.denied_hosts),
            unrestricted: policy.unrestricted_network,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{NetworkRestriction, WriteRestriction};

    #[test]
    fn test_empty_collections_surface_as_absent() {
        let policy = Policy {
            network_restriction: Some(NetworkRestriction {
                allowed_hosts: vec![],
                denied_hosts: vec!["evil.com".to_string()],
            }),
            write_restriction: Some(WriteRestriction {
                allow: vec![],
                deny_within_allow: vec![],
            }),
            ..Policy::default()
        };

        let network = network_view(&policy).unwrap();
        assert_eq!(network.allowed_hosts, None);
        assert_eq!(network.denied_hosts, Some(vec!["evil.com".to_string()]));

        let write = write_view(&policy).unwrap();
        assert_eq!(write.allow, None);
        assert_eq!(write.deny_within_allow, None);
    }

    #[test]
    fn test_absent_restrictions_are_none() {
        let policy = Policy::default();
        assert!(network_view(&policy).is_none());
        assert!(write_view(&policy).is_none());
        assert_eq!(read_view(&policy), FsReadRestrictionView::default());
    }

    #[test]
    fn test_allow_only_read_view() {
        let policy = Policy {
            read_restriction: ReadRestriction::AllowOnly {
                allow: vec!["/t/a".to_string()],
                deny_within_allow: vec![],
            },
            ..Policy::default()
        };
        let view = read_view(&policy);
        assert_eq!(view.allow, Some(vec!["/t/a".to_string()]));
        assert_eq!(view.deny_within_allow, None);
        assert_eq!(view.deny, None);
    }
}
