//! Server configuration loaded from JSON.
//!
//! ```json
//! {
//!     "address": "127.0.0.1:8080",
//!     "profile": "standard",
//!     "error_pages": { "301": "/error/", "404": "/missing/" },
//!     "fallback_error_page": "/error/"
//! }
//! ```
//!
//! `http` may replace the profile's buffer sizes with an explicit
//! [`HttpConfig`](commitline_http::config::HttpConfig).

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use commitline_http::config::HttpConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::error_page::{ErrorPageError, ErrorPages};
use crate::profile::ServerProfile;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub address: SocketAddr,
    #[serde(default)]
    pub profile: ServerProfile,
    #[serde(default)]
    pub http: Option<HttpConfig>,
    #[serde(default)]
    pub error_pages: BTreeMap<u16, String>,
    #[serde(default)]
    pub fallback_error_page: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("invalid config: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid http settings: {source}")]
    Http {
        #[from]
        source: commitline_http::config::ConfigError,
    },

    #[error("invalid error page: {source}")]
    ErrorPage {
        #[from]
        source: ErrorPageError,
    },
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.http_config().validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&json)
    }

    /// The explicit `http` section if present, otherwise the profile's sizes.
    pub fn http_config(&self) -> HttpConfig {
        self.http.unwrap_or_else(|| self.profile.http_config())
    }

    pub fn error_pages(&self) -> Result<ErrorPages, ConfigError> {
        let mut builder = ErrorPages::builder();
        for (code, path) in &self.error_pages {
            builder = builder.page(*code, path.as_str());
        }
        if let Some(fallback) = &self.fallback_error_page {
            builder = builder.fallback(fallback.as_str());
        }
        Ok(builder.build()?)
    }
}
