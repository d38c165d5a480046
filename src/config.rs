//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Report settings
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level for stderr diagnostics: "off", "error", "warn", "info",
    /// "debug" or "trace". RUST_LOG takes precedence.
    pub log_level: String,
}

/// One section of the printed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Part {
    Dos,
    File,
    Optional,
    Sections,
    Exports,
    Imports,
    BoundImports,
    Resources,
    Debug,
}

impl Part {
    pub const ALL: [Part; 9] = [
        Part::Dos,
        Part::File,
        Part::Optional,
        Part::Sections,
        Part::Exports,
        Part::Imports,
        Part::BoundImports,
        Part::Resources,
        Part::Debug,
    ];
}

/// Upper bound on `max_resource_depth`. The resource printer recurses once
/// per level.
pub const MAX_RESOURCE_DEPTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Parts to print, in order
    pub parts: Vec<Part>,
    /// Export slots to list (0 = no limit)
    pub max_exports: usize,
    /// Functions to list per imported library (0 = no limit)
    pub max_functions_per_library: usize,
    /// Deepest resource tree level to descend into, capped at
    /// [`MAX_RESOURCE_DEPTH`]
    pub max_resource_depth: usize,
    /// Walk forwarder chains of imported libraries that have one
    pub show_forwarder_chains: bool,
    /// Print hex digits in upper case
    pub hex_uppercase: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            parts: Part::ALL.to_vec(),
            max_exports: 0,
            max_functions_per_library: 0,
            max_resource_depth: 3,
            show_forwarder_chains: true,
            hex_uppercase: false,
        }
    }
}

impl ReportConfig {
    /// Configured resource depth, capped.
    pub fn resource_depth(&self) -> usize {
        self.max_resource_depth.min(MAX_RESOURCE_DEPTH)
    }
}

/// Get the config directory path for the current platform
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // Windows: %APPDATA%\pew
        std::env::var("APPDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("pew"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        // Check XDG_CONFIG_HOME first, then fall back to ~/.config
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
            .map(|p| p.join("pew"))
    }
}

/// Get the config file path
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.toml"))
}

/// Default config file content with comments
fn default_config() -> &'static str {
    r##"# pew Configuration
# This file is auto-generated. Edit as needed.

[general]
# Diagnostics written to stderr: "off", "error", "warn", "info", "debug", "trace"
# RUST_LOG overrides this value
log_level = "warn"

[report]
# Parts of the report, printed in this order
# Available: "dos", "file", "optional", "sections", "exports", "imports",
#            "bound-imports", "resources", "debug"
parts = ["dos", "file", "optional", "sections", "exports", "imports", "bound-imports", "resources", "debug"]

# Export slots to list (0 = no limit)
max_exports = 0

# Functions to list per imported library (0 = no limit)
max_functions_per_library = 0

# Deepest resource tree level to descend into (type = 0, name = 1, language = 2)
# Values above 16 are treated as 16
max_resource_depth = 3

# Walk forwarder chains of libraries bound the old way
show_forwarder_chains = true

# Print hex digits in upper case
hex_uppercase = false
"##
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml_edit::de::from_str(content).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Load configuration from `path`, or from the per-user config file
    /// (creating the default one if it doesn't exist).
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let Some(p) = config_file() else {
                    eprintln!("Warning: Could not determine config directory");
                    return Config::default();
                };
                if let Err(e) = write_default_if_missing(&p) {
                    eprintln!("Warning: Could not create config file: {}", e);
                    return Config::default();
                }
                p
            }
        };

        match fs::read_to_string(&config_path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: {}", e);
                    eprintln!("Using default configuration");
                    Config::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Could not read config file: {}", e);
                Config::default()
            }
        }
    }
}

fn write_default_if_missing(path: &Path) -> AppResult<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(dir) = path.parent()
        && !dir.exists()
    {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, default_config())?;
    Ok(())
}
