//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config ($XDG_CONFIG_HOME/modelroute/config.toml)
//! 3. Project config (.modelroute/config.toml, or an explicit path)
//! 4. Environment variables (MODELROUTE_* prefix, `__` nests)
//! 5. Flat deployment variables (PRIMARY_URL, SOFT_FALLBACK, ...)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde_json::{Map, Value, json};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{Result, RouteError};

const APP_DIR: &str = "modelroute";
const PROJECT_DIR: &str = ".modelroute";
const ENV_PREFIX: &str = "MODELROUTE_";

/// Flat variables recognized for deployments that configure through the
/// environment only, with the config path each one sets
pub const FLAT_ENV_KEYS: &[(&str, &str)] = &[
    ("PRIMARY_URL", "endpoints.primary.base_url"),
    ("PRIMARY_API_KEY", "endpoints.primary.api_key"),
    ("SECONDARY_URL", "endpoints.secondary.base_url"),
    ("SECONDARY_API_KEY", "endpoints.secondary.api_key"),
    ("BACKOFF_SECONDS", "health.backoff_secs"),
    ("AUTO_POLISH_THRESHOLD", "escalation.auto_polish_threshold"),
    ("SOFT_FALLBACK", "escalation.soft_fallback"),
];

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → MODELROUTE_* → flat env vars
    pub fn load() -> Result<Config> {
        Self::load_with(None)
    }

    /// Same as [`load`](Self::load), with `project_override` replacing the
    /// project config path
    pub fn load_with(project_override: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Merge global config
        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        // Merge project config
        match project_override {
            Some(path) if !path.exists() => {
                return Err(RouteError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => {
                debug!("Loading config from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let project_path = Self::project_config_path();
                if project_path.exists() {
                    debug!("Loading project config from: {}", project_path.display());
                    figment = figment.merge(Toml::file(&project_path));
                }
            }
        }

        // Merge environment variables (e.g., MODELROUTE_ESCALATION__SOFT_FALLBACK -> escalation.soft_fallback)
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let overrides = Self::flat_env_overrides(|key| env::var(key).ok())?;
        if !overrides.is_empty() {
            debug!(count = overrides.len(), "Applying flat environment overrides");
            figment = figment.merge(Serialized::defaults(Value::Object(overrides)));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(path)),
        )
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| RouteError::Config(format!("Configuration error: {}", e)))?;

        // Validate configuration after loading
        config.validate()?;

        Ok(config)
    }

    /// Translate the flat variables into a nested override tree.
    ///
    /// Values are typed here so a malformed number fails with the variable
    /// name rather than a deserialization path.
    pub fn flat_env_overrides(lookup: impl Fn(&str) -> Option<String>) -> Result<Map<String, Value>> {
        let mut root = Map::new();

        for (var, path) in FLAT_ENV_KEYS {
            let Some(raw) = lookup(var) else { continue };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            let value = match *var {
                "BACKOFF_SECONDS" => json!(raw.parse::<u64>().map_err(|_| invalid(var, raw))?),
                "AUTO_POLISH_THRESHOLD" => {
                    json!(raw.parse::<f64>().map_err(|_| invalid(var, raw))?)
                }
                "SOFT_FALLBACK" => json!(parse_bool(raw).ok_or_else(|| invalid(var, raw))?),
                _ => json!(raw),
            };

            insert_path(&mut root, path, value);
        }

        Ok(root)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/modelroute/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join(APP_DIR))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(PROJECT_DIR)
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Describe config paths and whether each exists
    pub fn describe_paths() -> Vec<(&'static str, Option<PathBuf>, bool)> {
        let global = Self::global_config_path();
        let global_exists = global.as_ref().is_some_and(|p| p.exists());
        let project = Self::project_config_path();
        let project_exists = project.exists();
        vec![
            ("Global", global, global_exists),
            ("Project", Some(project), project_exists),
        ]
    }

    /// Render the effective configuration
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| RouteError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a default config into the global directory
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            RouteError::Config("Cannot determine global config directory".to_string())
        })?;
        Self::write_default(&global_dir.join("config.toml"), force)
    }

    /// Write a default config into `.modelroute/` under the current directory
    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::write_default(&Self::project_config_path(), force)
    }

    /// Write the default config template to `path` unless it exists
    pub fn write_default(path: &Path, force: bool) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !path.exists() || force {
            fs::write(path, Self::default_config_template())?;
            info!("Created config: {}", path.display());
        } else {
            info!("Config exists: {}", path.display());
        }

        Ok(path.to_path_buf())
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Default config content (TOML)
    fn default_config_template() -> String {
        r#"# modelroute configuration
# Project settings in .modelroute/config.toml override the global file.
# Environment: MODELROUTE_<SECTION>__<KEY>, or PRIMARY_URL / SECONDARY_URL /
# PRIMARY_API_KEY / SECONDARY_API_KEY / BACKOFF_SECONDS /
# AUTO_POLISH_THRESHOLD / SOFT_FALLBACK.

version = "1.0"

# Fast/cheap model, tried first for fast-path tasks
[endpoints.primary]
kind = "local"
base_url = "http://localhost:11434"
model = "llama3:latest"
capabilities = ["chat", "summarize", "classify"]
priority = 0
cost = 0.0

# Strong model, used for other tasks and for escalation
[endpoints.secondary]
kind = "hosted"
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
capabilities = ["*"]
priority = 10
cost = 1.0

[routing]
primary = "primary"
fallback = "secondary"
fast_path_tasks = ["chat", "summarize", "classify"]

[escalation]
enabled = true
auto_polish_threshold = 70
soft_fallback = true

[health]
backoff_secs = 10
strategy = "constant"    # or "exponential"
max_backoff_secs = 300
jitter = false

[request]
max_tokens = 1024
timeout_secs = 60
"#
        .to_string()
    }
}

fn invalid(var: &str, raw: &str) -> RouteError {
    RouteError::Config(format!("Invalid value for {}: '{}'", var, raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Insert `value` at a dotted `path`, creating intermediate tables
fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else { return };

    let mut table = root;
    for segment in segments {
        let entry = table
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else { return };
        table = next;
    }
    table.insert(leaf.to_string(), value);
}
