#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::return_self_not_must_use)]

//! Core install pipeline for liffey.
//!
//! Given a project `package.json`, [`install`] recursively resolves the
//! dependency graph, fetches each unique package exactly once into a
//! content-addressed tarball store verified by checksum, and materializes
//! a `node_modules` tree out of relative symlinks.

pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod install;
pub mod layout;
pub mod link;
pub mod manifest;
pub mod registry;
pub mod resolve;
pub mod store;

pub use config::{Config, DEFAULT_REGISTRY, REGISTRY_ENV};
pub use download::download;
pub use error::{Error, Result};
pub use fetch::{FetchReport, Fetcher};
pub use install::{install, InstallOptions, InstallReport};
pub use layout::{Layout, TOP_LEVEL_TARGET};
pub use link::Linker;
pub use manifest::{DepField, Manifest, TOP_LEVEL_FIELDS, TRANSITIVE_FIELDS};
pub use registry::{Registry, RegistryClient};
pub use resolve::{ResolvedDependency, Resolver};
pub use store::Store;
