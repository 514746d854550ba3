//! Unified configuration layer.
//!
//! All environment variable reads are centralized here; business logic
//! consumes structured config rather than calling `std::env::var` directly.
//!
//! - `loader`: `env_or`/`env_optional`/`env_bool` and friends
//! - `schema`: `SandboxConfig`, `ObservabilityConfig`
//! - `env_keys`: key constants, including legacy aliases

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, env_u64, ScopedEnvGuard};
pub use schema::{ObservabilityConfig, SandboxConfig};
