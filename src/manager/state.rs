//! Internal state for the sandbox manager.

use std::sync::Arc;

use crate::config::SandboxHostConfig;
use crate::policy::Policy;
use crate::proxy::{FilterHandle, HttpProxy};
use crate::violation::ViolationStore;

/// Mutable state behind the manager's lock.
pub struct ManagerState {
    /// The stored configuration, as the caller supplied it. Explicit empty
    /// sets are preserved here; getters normalize them to absent.
    pub config: Option<SandboxHostConfig>,

    /// The normalized snapshot wrappers and proxy decisions read.
    pub policy: Option<Arc<Policy>>,

    /// Configuration supplied via update_config before initialize.
    pub pending: Option<SandboxHostConfig>,

    /// Running filtering proxy, present only while network restriction is
    /// active.
    pub proxy: Option<HttpProxy>,
    pub proxy_port: Option<u16>,

    /// Live host-filter cell shared with the proxy tasks.
    pub filter: Arc<FilterHandle>,

    pub violation_store: Arc<ViolationStore>,

    pub initialized: bool,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            config: None,
            policy: None,
            pending: None,
            proxy: None,
            proxy_port: None,
            filter: Arc::new(FilterHandle::default()),
            violation_store: Arc::new(ViolationStore::new()),
            initialized: false,
        }
    }
}

impl ManagerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the proxy and clear everything back to uninitialized.
    pub fn reset(&mut self) {
        if let Some(ref mut proxy) = self.proxy {
            proxy.stop();
        }
        self.proxy = None;
        self.proxy_port = None;

        crate::sandbox::linux::seccomp::cleanup_staged();

        self.config = None;
        self.policy = None;
        self.pending = None;
        self.filter = Arc::new(FilterHandle::default());
        self.violation_store.clear();
        self.initialized = false;
    }
}
