//! Sandbox manager: lifecycle, live reconfiguration, wrapper synthesis.

pub mod filesystem;
pub mod network;
pub mod state;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::SandboxHostConfig;
use crate::error::{Result, SandboxError};
use crate::policy::Policy;
use crate::proxy::AskCallback;
use crate::sandbox::{self, WrapOptions};
use crate::utils::Platform;
use crate::violation::ViolationStore;

use self::filesystem::{FsReadRestrictionView, FsWriteRestrictionView, NetworkRestrictionView};
use self::state::ManagerState;

/// Process-wide manager instance for callers that do not want to thread a
/// handle through every wrap site.
static GLOBAL: once_cell::sync::Lazy<SandboxManager> =
    once_cell::sync::Lazy::new(SandboxManager::new);

/// The sandbox manager. Clone-free handle over shared state; a process
/// normally holds exactly one, via [`SandboxManager::global`] or its own.
pub struct SandboxManager {
    state: Arc<RwLock<ManagerState>>,
    ask: RwLock<Option<AskCallback>>,
}

impl Default for SandboxManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxManager {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ManagerState::new())),
            ask: RwLock::new(None),
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static SandboxManager {
        &GLOBAL
    }

    /// Install the permission-ask callback. Takes effect for proxies
    /// started after this call; ask answers are never cached.
    pub fn set_ask_callback(&self, callback: AskCallback) {
        *self.ask.write() = Some(callback);
    }

    /// Check platform dependencies (bwrap, seccomp artifacts) without
    /// initializing anything.
    pub fn check_dependencies(
        &self,
        config: Option<&SandboxHostConfig>,
    ) -> sandbox::SandboxDependencyCheck {
        let seccomp = config.and_then(|c| c.seccomp.as_ref());
        sandbox::check_dependencies_detailed(Platform::current(), seccomp)
    }

    /// Initialize with a configuration. Idempotent up to [`reset`]: calling
    /// again with an equivalent policy is a no-op, with a different one an
    /// error. Starts the filtering proxy when network restriction is active
    /// and not unrestricted. A configuration stored by an earlier
    /// `update_config` call is applied on top once initialization is done.
    ///
    /// [`reset`]: SandboxManager::reset
    pub async fn initialize(&self, config: SandboxHostConfig) -> Result<()> {
        let policy = Arc::new(Policy::from_config(&config)?);

        {
            let state = self.state.read();
            if state.initialized {
                let same = state
                    .policy
                    .as_ref()
                    .is_some_and(|current| current.content_hash() == policy.content_hash());
                return if same {
                    Ok(())
                } else {
                    Err(SandboxError::AlreadyInitialized)
                };
            }
        }

        let platform = Platform::current();
        if !platform.is_supported() {
            return Err(SandboxError::PlatformUnsupported(format!(
                "{} is not a supported sandbox platform",
                platform.name()
            )));
        }

        let (filter, violations) = {
            let state = self.state.read();
            (state.filter.clone(), state.violation_store.clone())
        };
        filter.replace(network::compile_filter(&policy));

        let proxy = if policy.network_restriction_active() {
            let ask = self.ask.read().clone();
            Some(network::start_proxy(filter, violations, ask).await?)
        } else {
            None
        };

        let pending = {
            let mut state = self.state.write();
            if let Some((proxy, port)) = proxy {
                state.proxy = Some(proxy);
                state.proxy_port = Some(port);
            }
            state.config = Some(config);
            state.policy = Some(policy);
            state.initialized = true;
            state.pending.take()
        };

        tracing::info!(
            "Sandbox manager initialized for {} (proxy port: {:?})",
            platform.name(),
            self.proxy_port()
        );

        if let Some(pending) = pending {
            self.update_config(pending).await?;
        }

        Ok(())
    }

    /// Replace the policy snapshot. Before `initialize` the configuration
    /// is stored and applied at initialization time. After, the swap is
    /// atomic: wrappers produced and proxy decisions made after this
    /// returns reflect the new policy. The proxy is only restarted when the
    /// *presence* of network restriction changes; otherwise its port is
    /// preserved.
    pub async fn update_config(&self, config: SandboxHostConfig) -> Result<()> {
        let policy = Arc::new(Policy::from_config(&config)?);

        enum ProxyAction {
            Keep,
            Stop,
            Start,
        }

        let action = {
            let mut state = self.state.write();

            if !state.initialized {
                state.pending = Some(config);
                return Ok(());
            }

            let old_policy = state.policy.clone();
            let was_active = old_policy
                .as_ref()
                .is_some_and(|p| p.network_restriction_active());
            let now_active = policy.network_restriction_active();

            // Skip the filter swap when network rules did not change, so
            // in-flight decisions keep their current snapshot untouched.
            let network_changed = old_policy
                .as_ref()
                .map_or(true, |p| p.network_hash() != policy.network_hash());
            if network_changed {
                state.filter.replace(network::compile_filter(&policy));
            }

            state.config = Some(config);
            state.policy = Some(policy);

            match (was_active, now_active) {
                (true, false) => ProxyAction::Stop,
                (false, true) => ProxyAction::Start,
                _ => ProxyAction::Keep,
            }
        };

        match action {
            ProxyAction::Keep => {}
            ProxyAction::Stop => {
                let mut state = self.state.write();
                if let Some(ref mut proxy) = state.proxy {
                    proxy.stop();
                }
                state.proxy = None;
                state.proxy_port = None;
            }
            ProxyAction::Start => {
                let (filter, violations) = {
                    let state = self.state.read();
                    (state.filter.clone(), state.violation_store.clone())
                };
                let ask = self.ask.read().clone();
                let (proxy, port) = network::start_proxy(filter, violations, ask).await?;

                let mut state = self.state.write();
                state.proxy = Some(proxy);
                state.proxy_port = Some(port);
            }
        }

        Ok(())
    }

    /// Stop the proxy, drop all state, and return to uninitialized.
    /// In-flight proxy connections are closed without drain.
    pub async fn reset(&self) {
        crate::sandbox::macos::cleanup_temp_profiles();
        self.state.write().reset();
        tracing::info!("Sandbox manager reset");
    }

    /// Wrap a command for execution under the current policy.
    ///
    /// `shell` defaults to `bash`; any absolute shell path is honored. The
    /// returned string reflects the policy snapshot at call time.
    pub async fn wrap_with_sandbox(&self, command: &str, shell: Option<&str>) -> Result<String> {
        let (policy, config, proxy_port, _violations) = {
            let state = self.state.read();
            if !state.initialized {
                return Err(SandboxError::NotInitialized);
            }
            (
                state.policy.clone().ok_or(SandboxError::NotInitialized)?,
                state.config.clone().unwrap_or_default(),
                state.proxy_port,
                state.violation_store.clone(),
            )
        };

        let platform = Platform::current();
        let allow_all_unix_sockets = config
            .network
            .as_ref()
            .and_then(|n| n.allow_all_unix_sockets)
            .unwrap_or(false);

        let result = sandbox::wrap_command(
            command,
            &policy,
            platform,
            WrapOptions {
                proxy_port,
                shell,
                allow_all_unix_sockets,
                seccomp: config.seccomp.as_ref(),
                enable_log_monitor: platform == Platform::Macos,
            },
        )?;

        for warning in &result.warnings {
            tracing::warn!("{}", warning);
        }

        #[cfg(target_os = "macos")]
        if let Some(log_tag) = result.log_tag {
            let store = _violations;
            if let Err(e) = crate::sandbox::macos::LogMonitor::start(
                log_tag,
                Some(command.to_string()),
                store,
            )
            .await
            {
                tracing::debug!("Failed to start violation monitor: {}", e);
            }
        }

        Ok(result.command)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// The stored configuration, exactly as supplied.
    pub fn get_config(&self) -> Option<SandboxHostConfig> {
        self.state.read().config.clone()
    }

    /// The filtering proxy port, stable until reset or a presence change.
    pub fn proxy_port(&self) -> Option<u16> {
        self.state.read().proxy_port
    }

    /// Derived network restriction with empty collections normalized to
    /// absent; None when no restriction is configured.
    pub fn get_network_restriction_config(&self) -> Option<NetworkRestrictionView> {
        let state = self.state.read();
        state.policy.as_ref().and_then(|p| filesystem::network_view(p))
    }

    /// Derived read restriction view.
    pub fn get_fs_read_config(&self) -> FsReadRestrictionView {
        let state = self.state.read();
        state
            .policy
            .as_ref()
            .map(|p| filesystem::read_view(p))
            .unwrap_or_default()
    }

    /// Derived write restriction view; None when writes are unrestricted.
    pub fn get_fs_write_config(&self) -> Option<FsWriteRestrictionView> {
        let state = self.state.read();
        state.policy.as_ref().and_then(|p| filesystem::write_view(p))
    }

    /// The violation store for subscriptions and inspection.
    pub fn violation_store(&self) -> Arc<ViolationStore> {
        self.state.read().violation_store.clone()
    }

    /// Append recent violations for `command` to its stderr, so failures
    /// caused by the sandbox are distinguishable from ordinary errors.
    pub fn annotate_stderr_with_sandbox_failures(&self, command: &str, stderr: &str) -> String {
        let store = self.violation_store();
        let violations = store.for_process_hint(command);

        if violations.is_empty() {
            return stderr.to_string();
        }

        let mut annotated = stderr.to_string();
        annotated.push_str("\n\n--- Sandbox Violations ---\n");
        for violation in violations {
            annotated.push_str(&format!(
                "  {} {}\n",
                violation.kind.name(),
                violation.target
            ));
        }

        annotated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilesystemConfig, NetworkConfig};

    fn network_config(allowed: &[&str]) -> SandboxHostConfig {
        SandboxHostConfig {
            network: Some(NetworkConfig {
                allowed_domains: allowed.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_for_equal_policy() {
        let manager = SandboxManager::new();
        manager.initialize(network_config(&["example.com"])).await.unwrap();
        manager.initialize(network_config(&["example.com"])).await.unwrap();

        let err = manager
            .initialize(network_config(&["other.com"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::AlreadyInitialized));

        manager.reset().await;
    }

    #[tokio::test]
    async fn test_proxy_started_only_when_restriction_active() {
        let manager = SandboxManager::new();
        manager.initialize(SandboxHostConfig::default()).await.unwrap();
        assert_eq!(manager.proxy_port(), None);
        manager.reset().await;

        manager.initialize(network_config(&[])).await.unwrap();
        assert!(manager.proxy_port().is_some());
        manager.reset().await;
    }

    #[tokio::test]
    async fn test_unrestricted_network_skips_proxy() {
        let manager = SandboxManager::new();
        let mut config = network_config(&[]);
        config.network.as_mut().unwrap().unrestricted_network = Some(true);
        manager.initialize(config).await.unwrap();
        assert_eq!(manager.proxy_port(), None);
        manager.reset().await;
    }

    #[tokio::test]
    async fn test_update_preserves_port_when_presence_unchanged() {
        let manager = SandboxManager::new();
        manager.initialize(network_config(&[])).await.unwrap();
        let port = manager.proxy_port().unwrap();

        manager
            .update_config(network_config(&["example.com"]))
            .await
            .unwrap();
        assert_eq!(manager.proxy_port(), Some(port));

        manager.reset().await;
    }

    #[tokio::test]
    async fn test_update_stops_proxy_when_restriction_removed() {
        let manager = SandboxManager::new();
        manager.initialize(network_config(&["example.com"])).await.unwrap();
        assert!(manager.proxy_port().is_some());

        manager
            .update_config(SandboxHostConfig::default())
            .await
            .unwrap();
        assert_eq!(manager.proxy_port(), None);

        manager
            .update_config(network_config(&["example.com"]))
            .await
            .unwrap();
        assert!(manager.proxy_port().is_some());

        manager.reset().await;
    }

    #[tokio::test]
    async fn test_update_before_initialize_stores_pending() {
        let manager = SandboxManager::new();
        manager
            .update_config(network_config(&["example.com"]))
            .await
            .unwrap();
        assert!(!manager.is_initialized());

        manager.initialize(SandboxHostConfig::default()).await.unwrap();
        // The pending update is applied on top of initialization.
        let view = manager.get_network_restriction_config().unwrap();
        assert_eq!(view.allowed_hosts, Some(vec!["example.com".to_string()]));
        assert!(manager.proxy_port().is_some());

        manager.reset().await;
    }

    #[tokio::test]
    async fn test_wrap_requires_initialization() {
        let manager = SandboxManager::new();
        let err = manager.wrap_with_sandbox("true", None).await.unwrap_err();
        assert!(matches!(err, SandboxError::NotInitialized));
    }

    #[tokio::test]
    async fn test_reset_returns_to_uninitialized() {
        let manager = SandboxManager::new();
        manager.initialize(network_config(&[])).await.unwrap();
        manager.reset().await;

        assert!(!manager.is_initialized());
        assert_eq!(manager.proxy_port(), None);
        assert!(manager.get_config().is_none());

        // Re-initialization works after reset.
        manager.initialize(network_config(&["example.com"])).await.unwrap();
        manager.reset().await;
    }

    #[tokio::test]
    async fn test_getter_normalization_empty_allow() {
        let manager = SandboxManager::new();
        let mut config = network_config(&[]);
        config.filesystem = Some(FilesystemConfig {
            allow_write: Some(vec![]),
            ..Default::default()
        });
        manager.initialize(config).await.unwrap();

        // Stored config keeps the explicit empty set.
        let stored = manager.get_config().unwrap();
        assert_eq!(stored.network.unwrap().allowed_domains, Vec::<String>::new());

        // Getter views surface empties as absent.
        let network = manager.get_network_restriction_config().unwrap();
        assert_eq!(network.allowed_hosts, None);
        let write = manager.get_fs_write_config().unwrap();
        assert_eq!(write.allow, None);

        manager.reset().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_wrap_on_linux_without_network_restriction() {
        let manager = SandboxManager::new();
        manager.initialize(SandboxHostConfig::default()).await.unwrap();

        let wrapped = manager.wrap_with_sandbox("echo hi", None).await.unwrap();
        assert!(wrapped.starts_with("bwrap "));
        assert!(wrapped.contains("echo hi"));

        manager.reset().await;
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_wrap_on_linux_missing_seccomp_blob() {
        let manager = SandboxManager::new();
        manager.initialize(network_config(&["example.com"])).await.unwrap();

        let err = manager.wrap_with_sandbox("curl x", None).await.unwrap_err();
        assert!(matches!(err, SandboxError::SeccompBlobMissing { .. }));

        manager.reset().await;
    }
}
