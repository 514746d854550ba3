//! Domain-grouped configuration structs, loaded from environment variables
//! with a consistent fallback chain.

use super::env_keys::{observability as obv_keys, sandbox as sbx_keys};
use super::loader::{env_bool, env_optional, env_or, env_u64};

/// Sandbox construction defaults, read once by callers that don't pass an
/// explicit override.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub workspace: Option<String>,
    pub timeout_secs: u64,
    pub security_level: String,
    pub network_mode: String,
    pub network_allowlist: Vec<String>,
    pub max_output_bytes: usize,
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        let workspace = env_optional(sbx_keys::AGENTCAGE_WORKSPACE, sbx_keys::WORKSPACE_ALIASES);
        let timeout_secs = env_u64(
            sbx_keys::AGENTCAGE_TIMEOUT_SECS,
            sbx_keys::TIMEOUT_SECS_ALIASES,
            30,
        );
        let security_level = env_or(
            sbx_keys::AGENTCAGE_SECURITY_LEVEL,
            sbx_keys::SECURITY_LEVEL_ALIASES,
            || "standard".to_string(),
        );
        let network_mode = env_or(
            sbx_keys::AGENTCAGE_NETWORK_MODE,
            sbx_keys::NETWORK_MODE_ALIASES,
            || "blocked".to_string(),
        );
        let network_allowlist = env_optional(
            sbx_keys::AGENTCAGE_NETWORK_ALLOWLIST,
            sbx_keys::NETWORK_ALLOWLIST_ALIASES,
        )
        .map(|s| {
            s.split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect()
        })
        .unwrap_or_default();
        let max_output_bytes = env_u64(
            sbx_keys::AGENTCAGE_MAX_OUTPUT_BYTES,
            sbx_keys::MAX_OUTPUT_BYTES_ALIASES,
            30_000,
        ) as usize;

        Self {
            workspace,
            timeout_secs,
            security_level,
            network_mode,
            network_allowlist,
            max_output_bytes,
        }
    }
}

/// Observability configuration: quiet mode, log level/format, audit and
/// security-event log paths.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
    pub security_events_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            quiet: env_bool(obv_keys::AGENTCAGE_QUIET, obv_keys::QUIET_ALIASES, false),
            log_level: env_or(
                obv_keys::AGENTCAGE_LOG_LEVEL,
                obv_keys::LOG_LEVEL_ALIASES,
                || "agentcage=info".to_string(),
            ),
            log_json: env_bool(
                obv_keys::AGENTCAGE_LOG_JSON,
                obv_keys::LOG_JSON_ALIASES,
                false,
            ),
            audit_log: env_optional(obv_keys::AGENTCAGE_AUDIT_LOG, obv_keys::AUDIT_LOG_ALIASES),
            security_events_log: env_optional(
                obv_keys::AGENTCAGE_SECURITY_EVENTS_LOG,
                obv_keys::SECURITY_EVENTS_LOG_ALIASES,
            ),
        }
    }
}
