//! Shared environment-variable loading helpers.
//!
//! Centralizes the primary-key/alias fallback chain so callers never write
//! a manual `or_else` chain over `std::env::var`.

use std::env;

/// Read `primary`, falling back to each of `aliases` in order, then `default()`.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read `primary`/`aliases`, treating an empty value as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Parse a boolean env var: `1`/`true`/`yes` (case-insensitive) is true,
/// anything else present is false, absence falls back to `default`.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        None => default,
    }
}

/// Parse an integer env var, falling back to `default` on absence or parse failure.
pub fn env_u64(primary: &str, aliases: &[&str], default: u64) -> u64 {
    env_optional(primary, aliases)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}

/// RAII guard that removes an environment variable when dropped.
///
/// Useful for tests that set a variable for the duration of a scope.
pub struct ScopedEnvGuard(pub &'static str);

impl Drop for ScopedEnvGuard {
    fn drop(&mut self) {
        #[allow(unsafe_code)]
        unsafe {
            env::remove_var(self.0);
        }
    }
}
