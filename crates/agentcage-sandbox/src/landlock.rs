//! Landlock launcher (§4.E), Linux only.
//!
//! Installs a filesystem ruleset restricting the current thread (so only
//! the sandboxed child, spawned immediately after, inherits it) before
//! exec. Network egress is narrowed with a seccomp filter rather than
//! Landlock's (still-unstable) network-scoping rules, mirroring the
//! reference isolation backend this module is modeled on.

use std::path::Path;

use landlock::{
    Access, AccessFs, CompatLevel, Compatible, RulesetAttr, RulesetCreatedAttr, RulesetStatus,
    ABI,
};
use seccompiler::{
    apply_filter, BpfProgram, SeccompAction, SeccompCmpArgLen, SeccompCmpOp, SeccompCondition,
    SeccompFilter, SeccompRule, TargetArch,
};
use std::collections::BTreeMap;

use crate::error::{Result, SandboxError};

/// Detect whether the running kernel supports the Landlock ABI this
/// launcher targets (kernel ≥ 5.13).
pub fn is_available() -> bool {
    kernel_release()
        .map(|release| meets_minimum(&release))
        .unwrap_or(false)
}

fn kernel_release() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let uname = nix::sys::utsname::uname().ok()?;
        Some(uname.release().to_string_lossy().into_owned())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// `major>5 || (major==5 && minor>=13)`. The release string may carry a
/// distro suffix after the version, e.g. `5.15.0-generic`; only the
/// leading two dot-separated numeric fields are consulted.
fn meets_minimum(release: &str) -> bool {
    let mut parts = release.split('.');
    let major: u32 = match parts.next().and_then(|s| s.parse().ok()) {
        Some(v) => v,
        None => return false,
    };
    let minor: u32 = match parts
        .next()
        .and_then(|s| s.split('-').next())
        .and_then(|s| s.parse().ok())
    {
        Some(v) => v,
        None => return false,
    };
    major > 5 || (major == 5 && minor >= 13)
}

/// How the child's network access should be narrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkSeccompMode {
    /// No network access at all: every socket/connect syscall is denied.
    Blocked,
    /// IP sockets permitted so the child can reach the loopback-bound
    /// filtering proxy; the proxy's own allowlist does the real gating.
    ProxyRouted,
    /// Full network access: no seccomp filter installed.
    Unrestricted,
}

/// Install the filesystem ruleset and, per `network`, a network-restricting
/// seccomp filter, on the calling thread. Must be called on the thread
/// that will `exec` the child (e.g. from a `pre_exec` hook), never on the
/// parent process thread.
pub fn restrict_current_thread(workspace: &Path, network: NetworkSeccompMode) -> Result<()> {
    install_filesystem_rules(workspace)?;
    if network != NetworkSeccompMode::Unrestricted {
        install_network_seccomp_filter(network)
            .map_err(|e| SandboxError::ConfigurationError(format!("seccomp install failed: {e}")))?;
    }
    Ok(())
}

fn install_filesystem_rules(workspace: &Path) -> Result<()> {
    let abi = ABI::V5;
    let access_rw = AccessFs::from_all(abi);
    let access_ro = AccessFs::from_read(abi);

    let ruleset = landlock::Ruleset::default()
        .set_compatibility(CompatLevel::BestEffort)
        .handle_access(access_rw)
        .map_err(|e| SandboxError::ConfigurationError(format!("landlock handle_access: {e}")))?
        .create()
        .map_err(|e| SandboxError::ConfigurationError(format!("landlock create: {e}")))?
        .add_rules(landlock::path_beneath_rules(
            &["/usr", "/bin", "/lib", "/lib64", "/etc"],
            access_ro,
        ))
        .map_err(|e| SandboxError::ConfigurationError(format!("landlock system rules: {e}")))?
        .add_rules(landlock::path_beneath_rules(&[workspace], access_rw))
        .map_err(|e| SandboxError::ConfigurationError(format!("landlock workspace rule: {e}")))?
        .set_no_new_privs(true);

    let status = ruleset
        .restrict_self()
        .map_err(|e| SandboxError::ConfigurationError(format!("landlock restrict_self: {e}")))?;

    if status.ruleset == RulesetStatus::NotEnforced {
        return Err(SandboxError::ConfigurationError(
            "landlock ruleset was not enforced by the kernel".to_string(),
        ));
    }
    Ok(())
}

/// `Blocked`: deny `connect`/`bind`/`listen` outright and restrict
/// `socket`/`socketpair` to AF_UNIX only. `ProxyRouted`: allow AF_INET and
/// AF_INET6 sockets (loopback is just an address within that family) but
/// still deny AF_UNIX, so the child can only reach the host via IP sockets
/// — in practice, only the loopback-bound proxy.
fn install_network_seccomp_filter(
    mode: NetworkSeccompMode,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();

    match mode {
        NetworkSeccompMode::Blocked => {
            rules.insert(libc::SYS_connect, vec![]);
            rules.insert(libc::SYS_bind, vec![]);
            rules.insert(libc::SYS_listen, vec![]);

            let unix_only = SeccompRule::new(vec![SeccompCondition::new(
                0,
                SeccompCmpArgLen::Dword,
                SeccompCmpOp::Ne,
                libc::AF_UNIX as u64,
            )?])?;
            rules.insert(libc::SYS_socket, vec![unix_only.clone()]);
            rules.insert(libc::SYS_socketpair, vec![unix_only]);
        }
        NetworkSeccompMode::ProxyRouted => {
            let deny_non_ip = SeccompRule::new(vec![
                SeccompCondition::new(0, SeccompCmpArgLen::Dword, SeccompCmpOp::Ne, libc::AF_INET as u64)?,
                SeccompCondition::new(0, SeccompCmpArgLen::Dword, SeccompCmpOp::Ne, libc::AF_INET6 as u64)?,
            ])?;
            let deny_unix = SeccompRule::new(vec![SeccompCondition::new(
                0,
                SeccompCmpArgLen::Dword,
                SeccompCmpOp::Eq,
                libc::AF_UNIX as u64,
            )?])?;
            rules.insert(libc::SYS_socket, vec![deny_non_ip]);
            rules.insert(libc::SYS_socketpair, vec![deny_unix]);
        }
        NetworkSeccompMode::Unrestricted => unreachable!("caller skips filter install"),
    }

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow,
        SeccompAction::Errno(libc::EPERM as u32),
        if cfg!(target_arch = "x86_64") {
            TargetArch::x86_64
        } else if cfg!(target_arch = "aarch64") {
            TargetArch::aarch64
        } else {
            return Err("unsupported architecture for seccomp filter".into());
        },
    )?;

    let prog: BpfProgram = filter.try_into()?;
    apply_filter(&prog)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_version_boundary_is_inclusive_at_5_13() {
        assert!(meets_minimum("5.13.0"));
        assert!(meets_minimum("5.13.0-generic"));
        assert!(!meets_minimum("5.12.9"));
        assert!(meets_minimum("6.1.0"));
        assert!(!meets_minimum("4.19.0"));
    }

    #[test]
    fn malformed_release_string_is_unavailable() {
        assert!(!meets_minimum("not-a-version"));
        assert!(!meets_minimum("5"));
    }
}
