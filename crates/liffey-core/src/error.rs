use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for liffey operations.
///
/// Only `NotFound`-class conditions (see [`Error::is_not_found`]) are
/// recoverable control flow; every other variant propagates and aborts the
/// run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no cached tarball for {0}")]
    CacheMiss(String),

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    CorruptedPackage {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("package not found in registry: {0}")]
    PackageNotFound(String),

    #[error("no version of {name} satisfies range: {range}")]
    NoMatchingVersion { name: String, range: String },

    #[error("invalid version range for {name}: {range}")]
    InvalidRange { name: String, range: String },

    #[error("{name} has no distribution metadata")]
    MissingDist { name: String },

    #[error("invalid manifest at {}: {message}", path.display())]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("download of {url} failed with status {status}")]
    Download {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("tarball extraction failed: {0}")]
    Extract(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this is a "not found" condition that callers treat as a
    /// fallback trigger (registry lookup, download, fresh extraction)
    /// rather than a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CacheMiss(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
