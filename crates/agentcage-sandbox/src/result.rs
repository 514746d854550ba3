//! Result & config types (§4.A): immutable outcome record, policy levels,
//! network modes.

use serde::{Deserialize, Serialize};

/// Immutable outcome of one `execute()` call.
///
/// Invariants: `timed_out ⇒ exit_code < 0`; `truncated ⇒` at least one of
/// `stdout`/`stderr` exceeded the configured cap before truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub truncated: bool,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            truncated: false,
            timed_out: false,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: "Command timed out.".to_string(),
            exit_code: -1,
            truncated: false,
            timed_out: true,
        }
    }

    /// True iff the command exited with code 0 and did not time out.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Security posture for a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Log dangerous commands, don't block.
    Permissive,
    /// Block known-dangerous patterns.
    Standard,
    /// Allowlist-only, deny by default.
    Paranoid,
}

/// Network access mode for a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    Blocked,
    Allowed,
    Allowlist,
}

impl NetworkMode {
    /// Parse from `AGENTCAGE_NETWORK_MODE`'s value (`"blocked"` / `"allowed"`
    /// / `"allowlist"`, case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, String> {
        match name.trim().to_lowercase().as_str() {
            "blocked" => Ok(Self::Blocked),
            "allowed" => Ok(Self::Allowed),
            "allowlist" => Ok(Self::Allowlist),
            other => Err(format!("unrecognized network mode: {other}")),
        }
    }
}

/// Kernel isolation mechanism in effect for a sandbox handle, computed once
/// at construction and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelIsolation {
    None,
    Seatbelt,
    Landlock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_zero_exit_and_no_timeout() {
        let r = CommandResult::new("ok".into(), String::new(), 0);
        assert!(r.success());

        let r = CommandResult::new(String::new(), "boom".into(), 1);
        assert!(!r.success());

        let r = CommandResult::timed_out();
        assert!(!r.success());
        assert!(r.timed_out);
        assert_eq!(r.exit_code, -1);
    }

    #[test]
    fn timed_out_uses_literal_message() {
        let r = CommandResult::timed_out();
        assert_eq!(r.stderr, "Command timed out.");
    }

    #[test]
    fn network_mode_parses_case_insensitively() {
        assert_eq!(NetworkMode::from_name("Allowlist").unwrap(), NetworkMode::Allowlist);
        assert_eq!(NetworkMode::from_name("BLOCKED").unwrap(), NetworkMode::Blocked);
        assert!(NetworkMode::from_name("nonsense").is_err());
    }
}
