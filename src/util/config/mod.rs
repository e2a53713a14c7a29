//! toptask configuration
//!
//! User-level configuration, read once at startup.
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Runtime options on the command line (-level, -logfile)
//! 2. User-level (~/.config/toptask/config.toml)
//! 3. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use toptask::util::config::{load_user_config, TopLevelConfig};
//!
//! let config: TopLevelConfig = load_user_config().unwrap_or_default();
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// User-level configuration for the top-level task
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TopLevelConfig {
    /// Task protocol settings
    #[serde(default)]
    pub task: TaskConfig,
    /// Interactive console settings
    #[serde(default)]
    pub repl: ReplConfig,
    /// Script host settings
    #[serde(default)]
    pub host: HostConfig,
    /// Log settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Task protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    /// Strip runtime-reserved options before the script sees argv
    #[serde(default = "default_true")]
    pub filter_runtime_options: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            filter_runtime_options: true,
        }
    }
}

/// REPL configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplConfig {
    /// History size
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// History file path
    #[serde(default)]
    pub history_file: Option<PathBuf>,
    /// Prompt string
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Prompt shown while a block is still open
    #[serde(default = "default_continuation_prompt")]
    pub continuation_prompt: String,
    /// Printed when the console starts; empty for none
    #[serde(default = "default_banner")]
    pub banner: String,
    /// Colored error output
    #[serde(default = "default_true")]
    pub colors: bool,
    /// vi key bindings instead of emacs
    #[serde(default)]
    pub vi_mode: bool,
}

fn default_history_size() -> usize {
    1000
}

fn default_prompt() -> String {
    ">>> ".to_string()
}

fn default_continuation_prompt() -> String {
    "... ".to_string()
}

fn default_banner() -> String {
    format!(
        "toptask {} (tl script). Type :help for commands.",
        env!("CARGO_PKG_VERSION")
    )
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            history_file: None,
            prompt: default_prompt(),
            continuation_prompt: default_continuation_prompt(),
            banner: default_banner(),
            colors: true,
            vi_mode: false,
        }
    }
}

/// Script host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Directories searched by `import` before any script directory
    #[serde(default)]
    pub module_path: Vec<PathBuf>,
    /// Identity the dispatched script is registered under
    #[serde(default = "default_main_module")]
    pub main_module: String,
    /// Identity of the interactive console namespace
    #[serde(default = "default_console_module")]
    pub console_module: String,
}

fn default_main_module() -> String {
    "__main__".to_string()
}

fn default_console_module() -> String {
    "__console__".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            module_path: Vec::new(),
            main_module: default_main_module(),
            console_module: default_console_module(),
        }
    }
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write log lines here instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("toptask"));
    }

    // Fallback to ~/.config/toptask
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("toptask"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("toptask"));
    }

    None
}

/// Get the user config file path (~/.config/toptask/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load user-level configuration
/// Returns default config if file doesn't exist
pub fn load_user_config() -> Result<TopLevelConfig, ConfigError> {
    match get_config_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Ok(TopLevelConfig::default()),
    }
}

/// Load configuration from an explicit file
pub fn load_config_from(path: &Path) -> Result<TopLevelConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
