//! Registry metadata lookup.

use async_trait::async_trait;
use semver::{Version, VersionReq};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::manifest::Manifest;

/// Connect timeout for metadata requests.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Overall timeout for metadata requests.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Registry collaborator: best version match for a dependency request.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Resolve `name`/`range` to the manifest of the best matching
    /// published version.
    async fn matching(&self, name: &str, range: &str) -> Result<Manifest>;
}

/// npm registry client over HTTP.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Create a client for the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn new(base_url: &str) -> Result<Self> {
        // Url::join drops the last segment of a base without a trailing
        // slash, so normalize here.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::Registry(format!("invalid registry URL '{normalized}': {e}")))?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("liffey/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { base_url, http })
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the configured URL is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.registry_url)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the packument (full package metadata document) for a package.
    ///
    /// # Errors
    /// Returns `PackageNotFound` on a 404 and `Registry` on any other
    /// non-success status.
    pub async fn fetch_packument(&self, name: &str) -> Result<Value> {
        // Scoped names keep the @ but URL-encode the separating slash.
        let encoded = if name.starts_with('@') {
            name.replace('/', "%2F")
        } else {
            name.to_string()
        };

        let url = self
            .base_url
            .join(&encoded)
            .map_err(|e| Error::Registry(format!("failed to build URL for '{name}': {e}")))?;

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::PackageNotFound(name.to_string()));
        }

        if !response.status().is_success() {
            return Err(Error::Registry(format!(
                "registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        Ok(json)
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn matching(&self, name: &str, range: &str) -> Result<Manifest> {
        let packument = self.fetch_packument(name).await?;
        let version = select_version(&packument, name, range)?;

        let doc = packument
            .get("versions")
            .and_then(|v| v.get(&version))
            .cloned()
            .ok_or_else(|| Error::NoMatchingVersion {
                name: name.to_string(),
                range: range.to_string(),
            })?;

        let manifest: Manifest = serde_json::from_value(doc)?;
        tracing::debug!(name, range, version = %version, "resolved from registry");
        Ok(manifest)
    }
}

/// Pick the version of `name` best matching `range` from a packument.
///
/// Rules: an exactly published version wins; `""`, `"*"` and `"latest"`
/// take `dist-tags.latest` (falling back to the highest version); anything
/// else is parsed as a semver range and the highest satisfying version
/// wins.
///
/// # Errors
/// Returns `InvalidRange` for an unparseable range and `NoMatchingVersion`
/// when nothing satisfies it.
pub fn select_version(packument: &Value, name: &str, range: &str) -> Result<String> {
    let versions: Vec<&str> = packument
        .get("versions")
        .and_then(Value::as_object)
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default();

    if versions.contains(&range) {
        return Ok(range.to_string());
    }

    let mut parsed: Vec<Version> = versions
        .iter()
        .filter_map(|v| Version::parse(v).ok())
        .collect();
    parsed.sort_by(|a, b| b.cmp(a));

    if range.is_empty() || range == "*" || range == "latest" {
        if let Some(latest) = packument
            .get("dist-tags")
            .and_then(|t| t.get("latest"))
            .and_then(Value::as_str)
        {
            return Ok(latest.to_string());
        }
        return parsed
            .first()
            .map(ToString::to_string)
            .ok_or_else(|| Error::NoMatchingVersion {
                name: name.to_string(),
                range: range.to_string(),
            });
    }

    let req = VersionReq::parse(range).map_err(|_| Error::InvalidRange {
        name: name.to_string(),
        range: range.to_string(),
    })?;

    parsed
        .iter()
        .find(|v| req.matches(v))
        .map(ToString::to_string)
        .ok_or_else(|| Error::NoMatchingVersion {
            name: name.to_string(),
            range: range.to_string(),
        })
}
