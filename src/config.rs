//! Application configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file is valid:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:8080"
//! max_request_size = 8388608
//! keep_alive = true
//!
//! [static_files]
//! enabled = true
//! mount = "/static"
//! directory = "public"
//!
//! [templates]
//! directory = "templates"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JoltConfig {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
    pub templates: TemplatesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Upper bound on a buffered request (head plus body), in bytes.
    pub max_request_size: usize,
    /// Honour HTTP/1.1 persistent connections.
    pub keep_alive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_owned(),
            max_request_size: 8 * 1024 * 1024,
            keep_alive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    pub enabled: bool,
    /// URL prefix the directory is served under.
    pub mount: String,
    pub directory: PathBuf,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mount: "/".to_owned(),
            directory: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Template root; templates are disabled when unset.
    pub directory: Option<PathBuf>,
}

impl JoltConfig {
    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML document. Missing sections take their
    /// defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values `serde` cannot: a non-empty bind address, a positive
    /// request size limit and a mount path starting with `/`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind_address is empty".to_owned()));
        }
        if self.server.max_request_size == 0 {
            return Err(ConfigError::Invalid("server.max_request_size must be positive".to_owned()));
        }
        if !self.static_files.mount.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "static_files.mount `{}` must start with `/`",
                self.static_files.mount
            )));
        }
        Ok(())
    }
}
