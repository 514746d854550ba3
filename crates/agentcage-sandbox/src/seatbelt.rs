//! Seatbelt profile builder (§4.D), macOS only.
//!
//! A profile string is handed to a setuid `sandbox-exec`-compatible helper
//! which execs the child under its restrictions. The base policy denies
//! everything by default and only opens the holes listed below.

const BASE_POLICY: &str = r#"(version 1)
(deny default)
(allow process-fork)
(allow process-exec)
(allow signal (target self))
(allow file-read* (subpath "/usr/lib"))
(allow file-read* (subpath "/usr/share"))
(allow file-read* (subpath "/System/Library"))
(allow file-read* (subpath "/bin"))
(allow file-read* (subpath "/dev/null"))
(allow file-read* (subpath "/dev/urandom"))
(allow file-read-metadata (subpath "/"))
(allow sysctl-read)
"#;

/// Name of the setuid helper expected on `PATH` (verified present by the
/// backend selector before this isolation is chosen).
pub const HELPER_NAME: &str = "sandbox-exec";

/// Builds Seatbelt profile strings and the argv used to invoke the helper.
pub struct SeatbeltBuilder {
    helper_path: String,
}

impl SeatbeltBuilder {
    pub fn new(helper_path: impl Into<String>) -> Self {
        Self {
            helper_path: helper_path.into(),
        }
    }

    /// Render the full profile text for one execution: read+write under
    /// `workspace`, plus the per-user temp dirs a shell's pipes need, plus
    /// network rules gated by `allow_network`.
    pub fn build_profile(&self, workspace: &str, allow_network: bool) -> String {
        let workspace_rule = format!(
            "(allow file-read* file-write* (subpath \"{}\"))\n",
            escape_profile_string(workspace)
        );
        let tmp_rule = "(allow file-read* file-write* (subpath \"/tmp\"))\n\
             (allow file-read* file-write* (subpath \"/private/var/folders\"))\n\
             (allow file-read* file-write* (subpath \"/private/tmp\"))\n";

        let network_rule = if allow_network {
            "(allow network-outbound)\n(allow network-inbound)\n(allow system-socket)\n"
        } else {
            // Loopback must stay reachable so the filtering proxy can be used.
            "(deny network-outbound (remote unix-socket))\n\
             (allow network-outbound (remote ip \"localhost:*\"))\n\
             (allow network-inbound (local ip \"localhost:*\"))\n\
             (allow system-socket (socket-domain AF_ROUTE))\n"
        };

        format!("{BASE_POLICY}{workspace_rule}{tmp_rule}{network_rule}")
    }

    /// Produce the argv used to spawn: `[helper, "-p", profile, "bash",
    /// "-c", command]`.
    pub fn command_args(&self, workspace: &str, allow_network: bool, command: &str) -> Vec<String> {
        let profile = self.build_profile(workspace, allow_network);
        vec![
            self.helper_path.clone(),
            "-p".to_string(),
            profile,
            "bash".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]
    }
}

/// Escape characters that would break out of a Seatbelt double-quoted
/// string literal.
fn escape_profile_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_shape_matches_helper_contract() {
        let builder = SeatbeltBuilder::new("/usr/bin/sandbox-exec");
        let args = builder.command_args("/ws", false, "echo hi");
        assert_eq!(args[0], "/usr/bin/sandbox-exec");
        assert_eq!(args[1], "-p");
        assert_eq!(args[3], "bash");
        assert_eq!(args[4], "-c");
        assert_eq!(args[5], "echo hi");
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn profile_denies_by_default_and_opens_workspace() {
        let builder = SeatbeltBuilder::new("/usr/bin/sandbox-exec");
        let profile = builder.build_profile("/ws/project", false);
        assert!(profile.contains("(deny default)"));
        assert!(profile.contains("/ws/project"));
    }

    #[test]
    fn network_false_still_allows_loopback() {
        let builder = SeatbeltBuilder::new("/usr/bin/sandbox-exec");
        let profile = builder.build_profile("/ws", false);
        assert!(profile.contains("localhost"));
        assert!(!profile.contains("(allow network-outbound)\n(allow network-inbound)"));
    }

    #[test]
    fn network_true_opens_full_network_access() {
        let builder = SeatbeltBuilder::new("/usr/bin/sandbox-exec");
        let profile = builder.build_profile("/ws", true);
        assert!(profile.contains("(allow network-outbound)"));
        assert!(profile.contains("(allow network-inbound)"));
        assert!(profile.contains("(allow system-socket)"));
    }

    #[test]
    fn workspace_path_is_escaped() {
        let builder = SeatbeltBuilder::new("/usr/bin/sandbox-exec");
        let profile = builder.build_profile(r#"/ws/weird"path"#, false);
        assert!(profile.contains(r#"\"path"#));
    }
}
