//! Proxy startup for the manager.

use std::sync::Arc;

use crate::error::SandboxError;
use crate::policy::Policy;
use crate::proxy::{AskCallback, FilterHandle, HostFilter, HttpProxy};
use crate::violation::ViolationStore;

/// Compile the host filter for a policy snapshot. Policies without a
/// network restriction never reach the proxy, so the deny-all fallback only
/// covers the window where a restriction exists but is empty.
pub fn compile_filter(policy: &Policy) -> HostFilter {
    match &policy.network_restriction {
        Some(restriction) => HostFilter::from_restriction(restriction),
        None => HostFilter::deny_all(),
    }
}

/// Bind and start the filtering proxy against a live filter cell.
pub async fn start_proxy(
    filter: Arc<FilterHandle>,
    violations: Arc<ViolationStore>,
    ask: Option<AskCallback>,
) -> Result<(HttpProxy, u16), SandboxError> {
    let mut proxy = HttpProxy::bind(filter, violations, ask).await?;
    let port = proxy.port();
    proxy.start()?;

    tracing::debug!("Filtering proxy started on port {}", port);

    Ok((proxy, port))
}
