//! Process configuration.
//!
//! Settings are gathered from three layers, later ones winning:
//!
//! 1. an optional YAML file,
//! 2. environment variables (`LISTEN`, `API_HOST`, `USER_ID`, `APP_KEY`, `LOG_LEVEL`),
//! 3. command-line overrides applied by the binary.
//!
//! [`Settings::resolve`] validates the merged layers into a [`Config`], which
//! is immutable from then on.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::http::request::Method;

pub const DEFAULT_CONFIG_PATH: &str = "wallet-relay.yaml";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

pub const ENV_LISTEN: &str = "LISTEN";
pub const ENV_API_HOST: &str = "API_HOST";
pub const ENV_USER_ID: &str = "USER_ID";
pub const ENV_APP_KEY: &str = "APP_KEY";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid upstream base URL `{value}`: {reason}")]
    InvalidUrl { value: String, reason: String },

    #[error("`allowed_methods` must not be empty")]
    NoMethods,

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Unvalidated settings, as read from the YAML file and environment.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub listen_addr: Option<String>,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub allowed_methods: Option<Vec<Method>>,
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub app_key: Option<String>,
}

impl Settings {
    /// Parses settings from YAML text. An empty document yields defaults.
    pub fn from_yaml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads a YAML settings file.
    ///
    /// When `required` is false a missing file yields empty settings, so the
    /// relay can run on environment variables alone.
    pub fn read(path: &Path, required: bool) -> Result<Self, ConfigError> {
        if !required && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using environment only");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents, path)
    }

    /// Reads `path`, or the default file when no path is given. Only an
    /// explicitly named file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::read(path, true),
            None => Self::read(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Overlays values found through `lookup` (normally `std::env::var`).
    pub fn merge_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENV_LISTEN) {
            self.listen_addr = Some(v);
        }
        if let Some(v) = lookup(ENV_API_HOST) {
            self.upstream.base_url = Some(v);
        }
        if let Some(v) = lookup(ENV_USER_ID) {
            self.upstream.user_id = Some(v);
        }
        if let Some(v) = lookup(ENV_APP_KEY) {
            self.upstream.app_key = Some(v);
        }
        if let Some(v) = lookup(ENV_LOG_LEVEL) {
            self.log_level = Some(v);
        }
    }

    /// Validates the settings into a [`Config`].
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let base_url = non_empty(self.upstream.base_url).ok_or(ConfigError::Missing("API_HOST"))?;
        let user_id = non_empty(self.upstream.user_id).ok_or(ConfigError::Missing("USER_ID"))?;
        let app_key = non_empty(self.upstream.app_key);

        let allowed_methods = match self.allowed_methods {
            Some(methods) if methods.is_empty() => return Err(ConfigError::NoMethods),
            Some(mut methods) => {
                let mut seen = Vec::with_capacity(methods.len());
                methods.retain(|m| {
                    let first = !seen.contains(m);
                    seen.push(*m);
                    first
                });
                methods
            }
            None => DEFAULT_METHODS.to_vec(),
        };

        Ok(Config {
            listen_addr: non_empty(self.listen_addr)
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            upstream: UpstreamConfig {
                base_url: parse_base_url(&base_url)?,
                user_id,
                app_key,
            },
            allowed_methods,
            log_level: non_empty(self.log_level).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub upstream: UpstreamConfig,
    pub allowed_methods: Vec<Method>,
    pub log_level: String,
}

impl Config {
    /// Loads settings from `path` (or the default file, if present) and the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`] with an explicit environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut settings = Settings::load(path)?;
        settings.merge_env(lookup);
        settings.resolve()
    }
}

/// Where requests are relayed and the identity injected into them.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Base URL every request target is appended to.
    pub base_url: Url,
    /// Value of the `x-iowallet-user-id` header.
    pub user_id: String,
    /// Value of the `x-functions-key` header, when configured.
    pub app_key: Option<String>,
}

impl UpstreamConfig {
    pub fn new(base_url: &str, user_id: impl Into<String>) -> Result<Self, ConfigError> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(ConfigError::Missing("USER_ID"));
        }
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            user_id,
            app_key: None,
        })
    }

    pub fn with_app_key(mut self, app_key: impl Into<String>) -> Self {
        self.app_key = non_empty(Some(app_key.into()));
        self
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url.as_str())
            .field("user_id", &self.user_id)
            .field("app_key", &self.app_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(value.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed"));
    }
    Ok(url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
