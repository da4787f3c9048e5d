//! Configuration loading and root folder resolution
//!
//! Bootstrap values resolve in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! Runtime tunables live in the database `settings` table and are read by the
//! consolidation crate; this module only covers what is needed before the
//! database can be opened.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "JK_ROOT_FOLDER";

/// Directory name used under the platform data/config directories
pub const APP_DIR_NAME: &str = "joanies-kitchen";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "joanies-kitchen.db";

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional; a missing file yields `TomlConfig::default()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and reports
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External semantic comparator
    #[serde(default)]
    pub comparator: ComparatorConfig,

    /// Consolidation defaults
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Semantic comparator endpoint settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparatorConfig {
    /// Classification endpoint URL; `None` selects the offline comparator
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent to the endpoint
    #[serde(default)]
    pub api_key: Option<String>,

    /// Hard per-call timeout (milliseconds)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Bounded attempts per pair
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Consolidation defaults that may be set from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Variant similarity threshold (0.0-1.0)
    #[serde(default)]
    pub threshold: Option<f64>,

    /// Minimum comparator confidence required to merge an ambiguous pair
    #[serde(default)]
    pub min_semantic_confidence: Option<f64>,

    /// Directory receiving JSON run reports
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root folder resolver
///
/// Resolves the root folder from CLI argument, environment, TOML and
/// compiled default, in that order.
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    env_var_name: String,
}

impl RootFolderResolver {
    /// Create resolver with an optional CLI override
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self {
            cli_arg,
            env_var_name: ROOT_FOLDER_ENV.to_string(),
        }
    }

    /// Override the environment variable consulted (used by tests)
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Resolve root folder
    pub fn resolve(&self, toml_config: &TomlConfig) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            debug!(path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                debug!(path = %path, env = %self.env_var_name, "Root folder from environment");
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &toml_config.root_folder {
            debug!(path = %path.display(), "Root folder from TOML config");
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("./jk_data"))
}

/// Default TOML path for a tool: `<config_dir>/joanies-kitchen/<tool>.toml`
pub fn default_config_path(tool_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(format!("{}.toml", tool_name)))
}

/// Database path inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE_NAME)
}

/// Ensure root folder directory exists
pub fn ensure_directory_exists(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        debug!(path = %root_folder.display(), "Created root folder");
    }
    Ok(())
}

/// Load TOML configuration
///
/// A missing file is not an error: a warning is logged and defaults are used.
/// A file that exists but does not parse is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;

    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}
