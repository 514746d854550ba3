//! Sandbox facade (§4.I): the public handle. Owns the resolved workspace,
//! policy, network configuration, detected kernel isolation, and the
//! lazily-started proxy.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use agentcage_core::observability;
#[cfg(target_os = "macos")]
use which::which;

use crate::allowlist::NetworkAllowlist;
use crate::backend;
use crate::driver;
use crate::error::{Result, SandboxError};
use crate::policy::SecurityPolicy;
use crate::proxy::FilteringProxy;
use crate::result::{CommandResult, KernelIsolation, NetworkMode};

/// Construction parameters for [`SandboxHandle::new`].
pub struct SandboxOptions {
    pub timeout: Duration,
    pub policy: SecurityPolicy,
    pub network_mode: NetworkMode,
    pub allowlist: NetworkAllowlist,
    pub max_output_bytes: usize,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            policy: SecurityPolicy::standard(),
            network_mode: NetworkMode::Blocked,
            allowlist: NetworkAllowlist::new(),
            max_output_bytes: 30_000,
        }
    }
}

impl SandboxOptions {
    /// Build from `AGENTCAGE_*` environment variables (see
    /// `agentcage_core::config::SandboxConfig`), falling back to
    /// [`SandboxOptions::default`]'s values for anything unset.
    ///
    /// Fails if `AGENTCAGE_SECURITY_LEVEL` or `AGENTCAGE_NETWORK_MODE` names
    /// an unrecognized value, or if `AGENTCAGE_SECURITY_LEVEL=paranoid` is
    /// requested (PARANOID needs an allowed-command set that has no
    /// environment-variable form; build it explicitly instead).
    pub fn from_env() -> Result<Self> {
        let config = agentcage_core::config::SandboxConfig::from_env();

        let policy = SecurityPolicy::from_level_name(&config.security_level)
            .map_err(SandboxError::ConfigurationError)?;
        let network_mode = NetworkMode::from_name(&config.network_mode)
            .map_err(SandboxError::ConfigurationError)?;
        let allowlist = NetworkAllowlist::from_patterns(config.network_allowlist);

        Ok(Self {
            timeout: Duration::from_secs(config.timeout_secs),
            policy,
            network_mode,
            allowlist,
            max_output_bytes: config.max_output_bytes,
        })
    }
}

/// The public handle. `new` resolves the workspace and detects isolation
/// once; `execute` may be called any number of times until `close`.
pub struct SandboxHandle {
    workspace: PathBuf,
    timeout: Duration,
    policy: SecurityPolicy,
    network_mode: NetworkMode,
    allowlist: NetworkAllowlist,
    max_output_bytes: usize,
    isolation: KernelIsolation,
    proxy: Mutex<Option<FilteringProxy>>,
    closed: Mutex<bool>,
}

impl SandboxHandle {
    /// Resolve `workspace` to an absolute, existing directory and detect
    /// the available kernel isolation. Fails if the workspace can't be
    /// resolved, or if `ALLOWLIST` is chosen with an empty allow-list.
    pub fn new(workspace: &str, options: SandboxOptions) -> Result<Self> {
        let resolved = agentcage_core::path_validation::resolve_workspace(workspace)
            .map_err(|e| SandboxError::ConfigurationError(e.to_string()))?;

        if options.network_mode == NetworkMode::Allowlist && options.allowlist.is_empty() {
            return Err(SandboxError::ConfigurationError(
                "NetworkMode::Allowlist requires a non-empty allow-list".to_string(),
            ));
        }

        let isolation = backend::detect();
        if isolation == KernelIsolation::None {
            observability::security_isolation_fallback(
                "no supported kernel isolation detected for this host",
            );
        }

        Ok(Self {
            workspace: resolved,
            timeout: options.timeout,
            policy: options.policy,
            network_mode: options.network_mode,
            allowlist: options.allowlist,
            max_output_bytes: options.max_output_bytes,
            isolation,
            proxy: Mutex::new(None),
            closed: Mutex::new(false),
        })
    }

    /// Convenience constructor: resolve both the workspace and the
    /// construction options from `AGENTCAGE_*` environment variables.
    /// `AGENTCAGE_WORKSPACE` falls back to `current_dir()` when unset.
    pub fn from_env() -> Result<Self> {
        let config = agentcage_core::config::SandboxConfig::from_env();
        let workspace = match config.workspace {
            Some(ref path) => path.clone(),
            None => std::env::current_dir()
                .map_err(SandboxError::Io)?
                .to_string_lossy()
                .into_owned(),
        };
        Self::new(&workspace, SandboxOptions::from_env()?)
    }

    pub fn isolation(&self) -> KernelIsolation {
        self.isolation
    }

    pub fn workspace(&self) -> &std::path::Path {
        &self.workspace
    }

    /// Run `command` under the configured policy and isolation.
    ///
    /// `timeout_override`, when given, replaces the handle's default for
    /// this call only.
    pub fn execute(&self, command: &str, timeout_override: Option<Duration>) -> Result<CommandResult> {
        if *self.closed.lock().expect("closed mutex poisoned") {
            return Err(SandboxError::Closed);
        }

        if let Err(reason) = self.policy.check(command) {
            observability::security_blocked_command(command, &reason);
            return Err(SandboxError::SecurityViolation {
                command: command.to_string(),
                reason,
            });
        }

        let proxy_port = self.ensure_proxy_if_needed()?;

        let env = self.build_child_env(proxy_port);
        let workspace_str = self.workspace.to_string_lossy().into_owned();
        let allow_network = matches!(self.network_mode, NetworkMode::Allowed);

        let (argv, pre_exec) = self.build_launch(&workspace_str, allow_network, command);

        let timeout = timeout_override.unwrap_or(self.timeout);

        observability::audit_execution_started(command, &workspace_str);
        let start = Instant::now();
        let result = driver::run(&argv, &workspace_str, &env, timeout, self.max_output_bytes, pre_exec)
            .map_err(SandboxError::Io)?;
        observability::audit_execution_completed(
            command,
            result.exit_code,
            start.elapsed().as_millis() as u64,
            result.truncated,
            result.timed_out,
        );

        Ok(result)
    }

    /// Idempotent: repeated calls are no-ops. Stops the proxy, if running.
    pub fn close(&self) {
        let mut closed = self.closed.lock().expect("closed mutex poisoned");
        if *closed {
            return;
        }
        *closed = true;
        if let Some(proxy) = self.proxy.lock().expect("proxy mutex poisoned").take() {
            proxy.stop();
        }
    }

    fn ensure_proxy_if_needed(&self) -> Result<Option<u16>> {
        if self.network_mode != NetworkMode::Allowlist {
            return Ok(None);
        }
        let mut guard = self.proxy.lock().expect("proxy mutex poisoned");
        if let Some(proxy) = guard.as_ref() {
            return Ok(Some(proxy.port()));
        }
        let proxy = FilteringProxy::start(self.allowlist.clone()).map_err(SandboxError::Io)?;
        let port = proxy.port();
        *guard = Some(proxy);
        Ok(Some(port))
    }

    fn build_child_env(&self, proxy_port: Option<u16>) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        if let Some(port) = proxy_port {
            let value = format!("http://127.0.0.1:{port}");
            for key in ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"] {
                env.insert(key.to_string(), value.clone());
            }
        }
        env
    }

    fn build_launch(
        &self,
        workspace: &str,
        allow_network: bool,
        command: &str,
    ) -> (Vec<String>, Option<driver::PreExecHook>) {
        match self.isolation {
            #[cfg(target_os = "macos")]
            KernelIsolation::Seatbelt => self.seatbelt_launch(workspace, allow_network, command),
            #[cfg(not(target_os = "macos"))]
            KernelIsolation::Seatbelt => unreachable!("Seatbelt is only selected on macOS"),

            #[cfg(target_os = "linux")]
            KernelIsolation::Landlock => self.landlock_launch(workspace, allow_network, command),
            #[cfg(not(target_os = "linux"))]
            KernelIsolation::Landlock => unreachable!("Landlock is only selected on Linux"),

            KernelIsolation::None => (Self::bare_shell_argv(command), None),
        }
    }

    #[cfg(target_os = "windows")]
    fn bare_shell_argv(command: &str) -> Vec<String> {
        vec!["cmd".to_string(), "/C".to_string(), command.to_string()]
    }

    #[cfg(not(target_os = "windows"))]
    fn bare_shell_argv(command: &str) -> Vec<String> {
        vec!["bash".to_string(), "-c".to_string(), command.to_string()]
    }

    #[cfg(target_os = "macos")]
    fn seatbelt_launch(
        &self,
        workspace: &str,
        allow_network: bool,
        command: &str,
    ) -> (Vec<String>, Option<driver::PreExecHook>) {
        let helper = which(crate::seatbelt::HELPER_NAME)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "/usr/bin/sandbox-exec".to_string());
        let builder = crate::seatbelt::SeatbeltBuilder::new(helper);
        (builder.command_args(workspace, allow_network, command), None)
    }

    #[cfg(target_os = "linux")]
    fn landlock_launch(
        &self,
        workspace: &str,
        allow_network: bool,
        command: &str,
    ) -> (Vec<String>, Option<driver::PreExecHook>) {
        let argv = vec!["bash".to_string(), "-c".to_string(), command.to_string()];
        let workspace_owned = PathBuf::from(workspace);
        let seccomp_mode = if allow_network {
            crate::landlock::NetworkSeccompMode::Unrestricted
        } else if self.network_mode == NetworkMode::Allowlist {
            crate::landlock::NetworkSeccompMode::ProxyRouted
        } else {
            crate::landlock::NetworkSeccompMode::Blocked
        };
        let hook: driver::PreExecHook = Box::new(move || {
            crate::landlock::restrict_current_thread(&workspace_owned, seccomp_mode)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        });
        (argv, Some(hook))
    }
}

impl Drop for SandboxHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> SandboxOptions {
        SandboxOptions {
            timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[test]
    fn execute_runs_a_simple_command() {
        let dir = std::env::temp_dir();
        let handle = SandboxHandle::new(dir.to_str().unwrap(), opts()).unwrap();
        let result = handle.execute("echo hello", None).unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.success());
    }

    #[test]
    fn execute_reports_nonzero_exit() {
        let dir = std::env::temp_dir();
        let handle = SandboxHandle::new(dir.to_str().unwrap(), opts()).unwrap();
        let result = handle.execute("exit 42", None).unwrap();
        assert_eq!(result.exit_code, 42);
        assert!(!result.success());
    }

    #[test]
    fn execute_enforces_timeout_override() {
        let dir = std::env::temp_dir();
        let handle = SandboxHandle::new(dir.to_str().unwrap(), opts()).unwrap();
        let result = handle
            .execute("sleep 10", Some(Duration::from_millis(200)))
            .unwrap();
        assert!(result.timed_out);
    }

    #[test]
    fn standard_policy_rejects_dangerous_command() {
        let dir = std::env::temp_dir();
        let handle = SandboxHandle::new(dir.to_str().unwrap(), opts()).unwrap();
        let err = handle.execute("rm -rf /", None).unwrap_err();
        assert!(matches!(err, SandboxError::SecurityViolation { .. }));
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_execution() {
        let dir = std::env::temp_dir();
        let handle = SandboxHandle::new(dir.to_str().unwrap(), opts()).unwrap();
        handle.close();
        handle.close();
        let err = handle.execute("echo hi", None).unwrap_err();
        assert!(matches!(err, SandboxError::Closed));
    }

    #[test]
    fn options_from_env_fall_back_to_defaults_when_unset() {
        let options = SandboxOptions::from_env().unwrap();
        assert_eq!(options.network_mode, NetworkMode::Blocked);
        assert_eq!(options.max_output_bytes, 30_000);
    }

    #[test]
    fn allowlist_mode_requires_non_empty_allowlist() {
        let dir = std::env::temp_dir();
        let options = SandboxOptions {
            network_mode: NetworkMode::Allowlist,
            allowlist: NetworkAllowlist::new(),
            ..opts()
        };
        let err = SandboxHandle::new(dir.to_str().unwrap(), options).unwrap_err();
        assert!(matches!(err, SandboxError::ConfigurationError(_)));
    }
}
