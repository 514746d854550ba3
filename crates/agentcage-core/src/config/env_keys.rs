//! Environment variable key constants, with legacy alias support.
//!
//! Primary keys use the `AGENTCAGE_*` prefix. A handful of older
//! `SKILLLITE_*`/`SKILLBOX_*` spellings are recognized as aliases so that
//! hosts migrating from an earlier integration keep working.

/// Workspace and resource configuration.
pub mod sandbox {
    pub const AGENTCAGE_WORKSPACE: &str = "AGENTCAGE_WORKSPACE";
    pub const WORKSPACE_ALIASES: &[&str] = &["SKILLLITE_WORKSPACE"];

    pub const AGENTCAGE_TIMEOUT_SECS: &str = "AGENTCAGE_TIMEOUT_SECS";
    pub const TIMEOUT_SECS_ALIASES: &[&str] = &[];

    pub const AGENTCAGE_SECURITY_LEVEL: &str = "AGENTCAGE_SECURITY_LEVEL";
    pub const SECURITY_LEVEL_ALIASES: &[&str] = &[];

    pub const AGENTCAGE_NETWORK_MODE: &str = "AGENTCAGE_NETWORK_MODE";
    pub const NETWORK_MODE_ALIASES: &[&str] = &[];

    pub const AGENTCAGE_NETWORK_ALLOWLIST: &str = "AGENTCAGE_NETWORK_ALLOWLIST";
    pub const NETWORK_ALLOWLIST_ALIASES: &[&str] = &[];

    pub const AGENTCAGE_MAX_OUTPUT_BYTES: &str = "AGENTCAGE_MAX_OUTPUT_BYTES";
    pub const MAX_OUTPUT_BYTES_ALIASES: &[&str] = &[];
}

/// Observability: quiet mode, log level/format, audit and security-event logs.
pub mod observability {
    pub const AGENTCAGE_QUIET: &str = "AGENTCAGE_QUIET";
    pub const QUIET_ALIASES: &[&str] = &["SKILLLITE_QUIET", "SKILLBOX_QUIET"];

    pub const AGENTCAGE_LOG_LEVEL: &str = "AGENTCAGE_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["SKILLLITE_LOG_LEVEL"];

    pub const AGENTCAGE_LOG_JSON: &str = "AGENTCAGE_LOG_JSON";
    pub const LOG_JSON_ALIASES: &[&str] = &["SKILLLITE_LOG_JSON"];

    pub const AGENTCAGE_AUDIT_LOG: &str = "AGENTCAGE_AUDIT_LOG";
    pub const AUDIT_LOG_ALIASES: &[&str] = &["SKILLLITE_AUDIT_LOG"];

    pub const AGENTCAGE_SECURITY_EVENTS_LOG: &str = "AGENTCAGE_SECURITY_EVENTS_LOG";
    pub const SECURITY_EVENTS_LOG_ALIASES: &[&str] = &[];
}
