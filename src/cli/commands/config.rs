//! Config Command
//!
//! Manage modelroute configuration.
//!
//! Usage:
//!   modelroute config show [-f json]
//!   modelroute config path
//!   modelroute config init [-g] [--force]

use std::path::Path;

use crate::cli::ui::Output;
use crate::cli::util::wants_json;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration. Credentials are never printed.
pub fn show(config_path: Option<&Path>, format: &str) -> Result<()> {
    let config = ConfigLoader::load_with(config_path)?;
    println!("{}", ConfigLoader::render(&config, wants_json(format))?);
    Ok(())
}

/// Show configuration file locations
pub fn path() -> Result<()> {
    let output = Output::new();
    output.header("Configuration Paths");
    for (label, path, exists) in ConfigLoader::describe_paths() {
        let shown = match path {
            Some(p) if exists => format!("{}", p.display()),
            Some(p) => format!("{} (not found)", p.display()),
            None => "(unavailable)".to_string(),
        };
        output.field(label, &shown);
    }
    Ok(())
}

/// Write a default config file
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::init_global(force)?
    } else {
        ConfigLoader::init_project(force)?
    };

    let output = Output::new();
    output.success(if global {
        "Initialized global configuration"
    } else {
        "Initialized project configuration"
    });
    output.field("Config", &path.display().to_string());
    Ok(())
}
