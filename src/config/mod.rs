//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/modelroute/config.toml)
//! 3. Project config (.modelroute/config.toml)
//! 4. Environment variables (MODELROUTE_*)
//! 5. Flat deployment variables (PRIMARY_URL, SECONDARY_URL, ...)
//! 6. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::{ConfigLoader, FLAT_ENV_KEYS};
pub use types::*;
