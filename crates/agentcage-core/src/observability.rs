//! Observability: tracing init, audit log, security events.
//!
//! Audit: `AGENTCAGE_AUDIT_LOG` (or legacy `SKILLLITE_AUDIT_LOG`).
//! Security events: `AGENTCAGE_SECURITY_EVENTS_LOG`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::ObservabilityConfig;

static AUDIT_PATH: Mutex<Option<Option<String>>> = Mutex::new(None);
static SECURITY_EVENTS_PATH: Mutex<Option<Option<String>>> = Mutex::new(None);

/// Initialize tracing. Call once at process startup.
///
/// When quiet mode is on, only WARN and above are logged regardless of
/// `AGENTCAGE_LOG_LEVEL`.
pub fn init_tracing() {
    let cfg = ObservabilityConfig::from_env();

    let level = if cfg.quiet {
        "agentcage=warn".to_string()
    } else {
        cfg.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init()
    };
}

fn cached_path(cache: &Mutex<Option<Option<String>>>, load: impl FnOnce() -> Option<String>) -> Option<String> {
    let mut guard = cache.lock().ok()?;
    if let Some(cached) = guard.as_ref() {
        return cached.clone();
    }
    let path = load();
    if let Some(ref p) = path {
        if let Some(parent) = Path::new(p).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    *guard = Some(path.clone());
    path
}

fn audit_path() -> Option<String> {
    cached_path(&AUDIT_PATH, || ObservabilityConfig::from_env().audit_log)
}

fn security_events_path() -> Option<String> {
    cached_path(&SECURITY_EVENTS_PATH, || {
        ObservabilityConfig::from_env().security_events_log
    })
}

fn append_jsonl(path: &str, record: &serde_json::Value) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(f, "{}", line);
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Audit: a command was about to be spawned.
pub fn audit_execution_started(command: &str, cwd: &str) {
    if let Some(path) = audit_path() {
        let record = json!({
            "ts": now(),
            "event": "execution_started",
            "command": command,
            "cwd": cwd,
        });
        append_jsonl(&path, &record);
    }
}

/// Audit: a command finished (normally, or via timeout).
pub fn audit_execution_completed(
    command: &str,
    exit_code: i32,
    duration_ms: u64,
    truncated: bool,
    timed_out: bool,
) {
    if let Some(path) = audit_path() {
        let record = json!({
            "ts": now(),
            "event": "execution_completed",
            "command": command,
            "exit_code": exit_code,
            "duration_ms": duration_ms,
            "truncated": truncated,
            "timed_out": timed_out,
            "success": exit_code == 0 && !timed_out,
        });
        append_jsonl(&path, &record);
    }
}

/// Security event: the policy engine rejected a command before it was spawned.
pub fn security_blocked_command(command: &str, reason: &str) {
    tracing::warn!(command = %command, reason = %reason, "policy engine rejected command");
    if let Some(path) = security_events_path() {
        let record = json!({
            "ts": now(),
            "type": "security_blocked",
            "category": "command",
            "command": command,
            "reason": reason,
        });
        append_jsonl(&path, &record);
    }
}

/// Security event: the filtering proxy rejected a connection attempt.
pub fn security_blocked_network(target: &str, reason: &str) {
    tracing::warn!(target = %target, reason = %reason, "proxy rejected connection");
    if let Some(path) = security_events_path() {
        let record = json!({
            "ts": now(),
            "type": "security_blocked",
            "category": "network",
            "target": target,
            "reason": reason,
        });
        append_jsonl(&path, &record);
    }
}

/// Security event: kernel isolation was unavailable and execution fell back
/// to a bare shell.
pub fn security_isolation_fallback(reason: &str) {
    tracing::warn!(reason = %reason, "kernel isolation unavailable, falling back to bare shell");
    if let Some(path) = security_events_path() {
        let record = json!({
            "ts": now(),
            "type": "isolation_fallback",
            "category": "runtime",
            "reason": reason,
        });
        append_jsonl(&path, &record);
    }
}
