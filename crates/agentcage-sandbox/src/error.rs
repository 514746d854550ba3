//! Error taxonomy (§7). `Timeout` and non-zero exit are not errors — they
//! are represented as ordinary [`crate::result::CommandResult`] values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid sandbox configuration: {0}")]
    ConfigurationError(String),

    #[error("security violation: {reason} (command: {command})")]
    SecurityViolation { command: String, reason: String },

    #[error("sandbox is closed")]
    Closed,

    #[error("execution failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
