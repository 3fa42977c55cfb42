//! Configuration management.
//!
//! Configuration is stored in ~/.detti/config.yaml unless a path is given:
//!
//! ```yaml
//! detti_db:
//!   path_of_db: /home/me/.detti/data/detti.json
//!   len_of_key: 64
//!   len_of_val: 1024
//!   log_level: info
//!   log_dir: /home/me/.detti/logs   # optional
//! server:
//!   host: 127.0.0.1
//!   port: 5000
//!   user: ""
//!   password: ""
//!   token_secret: ""             # random per run when empty
//!   token_ttl_secs: 300
//!   limits:
//!     per_second: 10
//!     per_minute: 100
//!     per_hour: 2000
//!     per_day: 10000
//! ```

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use detti_kv::persist::create_owner_only;
use detti_kv::{Limits, Options};

use crate::paths::Paths;

/// Errors from loading or writing the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config: file not found: {0}")]
    Missing(PathBuf),

    #[error("config: file already exists: {0}")]
    Exists(PathBuf),

    #[error("config: cannot determine home directory")]
    NoHome,

    #[error("config: io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config: invalid {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store settings. Every field is required.
    pub detti_db: DbConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Path the config was loaded from (not serialized).
    #[serde(skip)]
    config_path: PathBuf,
}

/// Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database file path.
    pub path_of_db: PathBuf,
    /// Maximum key length in characters.
    pub len_of_key: usize,
    /// Maximum value length in characters.
    pub len_of_val: usize,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Directory for log files. Defaults to ~/.detti/logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Log verbosity.
///
/// Accepts error, warn, info, debug and trace in any case, plus `warning`
/// and `critical` (read as warn and error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Returns the tracing directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" | "critical" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "unknown log level {:?}, expected error, warn, info, debug or trace",
                s
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, String> {
        s.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Tokens are required only when both user and password are set.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Token signing key.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token_secret: String,
    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
    pub limits: RateLimits,
}

/// Requests allowed per client address in each window. Zero disables a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub per_second: u32,
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            user: String::new(),
            password: String::new(),
            token_secret: String::new(),
            token_ttl_secs: 300,
            limits: RateLimits::default(),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_second: 10,
            per_minute: 100,
            per_hour: 2000,
            per_day: 10000,
        }
    }
}

impl ServerConfig {
    /// Returns true if requests must carry a token.
    pub fn auth_enabled(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }

    /// Returns the listen address as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Builds the default configuration, with the database under `paths`.
    pub fn with_paths(paths: &Paths) -> Self {
        Self {
            detti_db: DbConfig {
                path_of_db: paths.data_path("detti.json"),
                len_of_key: 64,
                len_of_val: 1024,
                log_level: LogLevel::Info,
                log_dir: None,
            },
            server: ServerConfig::default(),
            config_path: paths.config_file(),
        }
    }

    /// Returns the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the store's key and value limits.
    pub fn limits(&self) -> Limits {
        Limits::new(self.detti_db.len_of_key, self.detti_db.len_of_val)
    }

    /// Returns the log directory: `detti_db.log_dir`, else ~/.detti/logs.
    pub fn log_dir(&self) -> Option<PathBuf> {
        match &self.detti_db.log_dir {
            Some(dir) => Some(dir.clone()),
            None => Paths::new().ok().map(|p| p.log_dir()),
        }
    }

    /// Returns the options for opening the store.
    pub fn db_options(&self) -> Options {
        Options::new(&self.detti_db.path_of_db, self.limits())
    }

    /// Writes the configuration to its path with owner-only permissions.
    pub fn save(&self) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self).map_err(|source| ConfigError::Invalid {
            path: self.config_path.clone(),
            source,
        })?;
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }
        // Created owner-only before the password is written.
        let mut file = create_owner_only(&self.config_path).map_err(|e| self.io_err(e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn io_err(&self, source: io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.config_path.clone(),
            source,
        }
    }
}

/// Resolves the config path: `custom_path` if given, else ~/.detti/config.yaml.
pub fn resolve_path(custom_path: Option<&str>) -> Result<PathBuf, ConfigError> {
    match custom_path {
        Some(p) => Ok(PathBuf::from(p)),
        None => Paths::new()
            .map(|p| p.config_file())
            .map_err(|_| ConfigError::NoHome),
    }
}

/// Loads the configuration file.
///
/// A missing file is an error; nothing is created. A file readable by group
/// or others is loaded with a warning.
pub fn load_config(custom_path: Option<&str>) -> Result<Config, ConfigError> {
    let config_path = resolve_path(custom_path)?;
    if !config_path.is_file() {
        return Err(ConfigError::Missing(config_path));
    }

    detti_kv::persist::warn_if_exposed(&config_path);

    let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
        path: config_path.clone(),
        source,
    })?;
    let mut cfg: Config =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: config_path.clone(),
            source,
        })?;
    cfg.config_path = config_path;
    Ok(cfg)
}

/// Writes a default configuration file and returns it.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn init_config(custom_path: Option<&str>, force: bool) -> Result<Config, ConfigError> {
    let config_path = resolve_path(custom_path)?;
    if config_path.exists() && !force {
        return Err(ConfigError::Exists(config_path));
    }

    let paths = Paths::new().map_err(|_| ConfigError::NoHome)?;
    let mut cfg = Config::with_paths(&paths);
    cfg.config_path = config_path;
    cfg.save()?;
    Ok(cfg)
}

/// Masks a secret for display.
pub fn mask_secret(secret: &str) -> String {
    let n = secret.chars().count();
    if n <= 4 {
        "*".repeat(n)
    } else {
        let head: String = secret.chars().take(2).collect();
        let tail: String = secret.chars().skip(n - 2).collect();
        format!("{}{}{}", head, "*".repeat(n - 4), tail)
    }
}
