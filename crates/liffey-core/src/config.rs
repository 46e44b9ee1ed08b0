use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override the registry URL.
pub const REGISTRY_ENV: &str = "LIFFEY_REGISTRY";

/// Environment variable to override the tarball cache directory.
pub const CACHE_DIR_ENV: &str = "LIFFEY_CACHE_DIR";

/// Connect timeout for all HTTP requests.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Static, process-wide installer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory of the content-addressed tarball cache.
    pub cache_dir: PathBuf,

    /// Base URL of the package registry.
    pub registry_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            registry_url: std::env::var(REGISTRY_ENV)
                .unwrap_or_else(|_| DEFAULT_REGISTRY.to_string()),
        }
    }
}

impl Config {
    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    /// Set the registry URL.
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Build the HTTP client used for tarball downloads.
    ///
    /// Registry metadata requests use their own client (see
    /// `RegistryClient`); this one carries no overall request timeout
    /// because archive streaming time is bounded per request by the
    /// downloader.
    ///
    /// # Errors
    /// Returns an error if the client cannot be constructed.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("liffey/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }
}

/// Default tarball cache directory.
///
/// Respects `LIFFEY_CACHE_DIR`, then falls back to the platform cache
/// location:
/// - Linux: `$XDG_CACHE_HOME/liffey/tarballs` or `~/.cache/liffey/tarballs`
/// - macOS: `~/Library/Caches/liffey/tarballs`
/// - Windows: `%LOCALAPPDATA%\liffey\tarballs`
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }

    let base = dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".liffey-cache"),
                |p| p.join(".cache").join("liffey"),
            )
        },
        |p| p.join("liffey"),
    );

    base.join("tarballs")
}
