//! Dependency resolution.
//!
//! `resolve_one` prefers an already-installed local package (followed
//! through its direct link, no network) and falls back to the registry on
//! a missing link. `resolve_all` expands the graph in concurrent waves
//! with a shared visited set of content keys breaking cycles.

use futures::stream::{self, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::layout::{self, Layout, TOP_LEVEL_TARGET};
use crate::manifest::{Manifest, TRANSITIVE_FIELDS};
use crate::registry::Registry;

/// Maximum concurrent resolution steps per wave.
const MAX_CONCURRENT_RESOLVES: usize = 32;

/// Maximum expansion depth.
const MAX_DEPTH: usize = 100;

/// A dependency edge joined with the package it resolved to.
///
/// `target` is the content key: the tarball checksum for registry-sourced
/// packages, or the reused on-disk identity for locally-installed ones.
#[derive(Debug, Clone)]
pub struct ResolvedDependency {
    pub name: String,
    pub parent_target: String,
    pub target: String,
    pub manifest: Manifest,
}

/// A dependency request queued for resolution.
#[derive(Debug, Clone)]
struct PendingDep {
    parent_target: String,
    name: String,
    range: String,
    depth: usize,
}

/// Recursive dependency resolver.
pub struct Resolver<R> {
    registry: Arc<R>,
    layout: Layout,
    visited: Mutex<HashSet<String>>,
}

impl<R: Registry> Resolver<R> {
    #[must_use]
    pub fn new(registry: Arc<R>, layout: Layout) -> Self {
        Self {
            registry,
            layout,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Resolve a single dependency request against a location.
    ///
    /// Local first: if the parent's dependency directory has a link named
    /// `name`, the link target supplies the content key and the installed
    /// manifest is read back, with no registry call. Only `NotFound`-class
    /// failures fall through to the registry; anything else propagates.
    ///
    /// # Errors
    /// Propagates registry errors, manifest errors, and missing
    /// distribution metadata.
    pub async fn resolve_one(
        &self,
        parent_target: &str,
        name: &str,
        range: &str,
    ) -> Result<ResolvedDependency> {
        match self.resolve_local(parent_target, name).await {
            Ok(dep) => Ok(dep),
            Err(e) if e.is_not_found() => self.resolve_remote(parent_target, name, range).await,
            Err(e) => Err(e),
        }
    }

    async fn resolve_local(&self, parent_target: &str, name: &str) -> Result<ResolvedDependency> {
        let link = self.layout.deps_dir(parent_target).join(name);
        let dest = tokio::fs::read_link(&link).await?;

        let target = layout::target_of_link(&dest).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected link target {} at {}", dest.display(), link.display()),
            ))
        })?;

        let manifest_path = self.layout.package_dir(&target).join("package.json");
        let manifest = Manifest::load(&manifest_path).await?;

        tracing::debug!(name, target = %target, "reusing installed package");
        Ok(ResolvedDependency {
            name: name.to_string(),
            parent_target: parent_target.to_string(),
            target,
            manifest,
        })
    }

    async fn resolve_remote(
        &self,
        parent_target: &str,
        name: &str,
        range: &str,
    ) -> Result<ResolvedDependency> {
        let manifest = self.registry.matching(name, range).await?;

        let target = manifest
            .dist
            .as_ref()
            .and_then(|dist| dist.shasum.clone())
            .ok_or_else(|| Error::MissingDist {
                name: name.to_string(),
            })?;

        Ok(ResolvedDependency {
            name: name.to_string(),
            parent_target: parent_target.to_string(),
            target,
            manifest,
        })
    }

    /// Expand seed requests of the top-level project into the full graph.
    ///
    /// Returns every resolved edge, including duplicates when the same
    /// package is requested by several parents; only recursion into an
    /// already-visited content key is skipped. The first hard error aborts
    /// the whole run.
    ///
    /// # Errors
    /// Propagates the first resolution failure of any branch.
    pub async fn resolve_all(&self, seeds: &[(String, String)]) -> Result<Vec<ResolvedDependency>> {
        let mut out = Vec::new();

        let mut pending: VecDeque<PendingDep> = seeds
            .iter()
            .map(|(name, range)| PendingDep {
                parent_target: TOP_LEVEL_TARGET.to_string(),
                name: name.clone(),
                range: range.clone(),
                depth: 0,
            })
            .collect();

        while !pending.is_empty() {
            let batch: Vec<PendingDep> = pending.drain(..).collect();

            let results: Vec<Result<(ResolvedDependency, Vec<PendingDep>)>> =
                stream::iter(batch)
                    .map(|dep| self.expand(dep))
                    .buffer_unordered(MAX_CONCURRENT_RESOLVES)
                    .collect()
                    .await;

            for result in results {
                let (resolved, children) = result?;
                out.push(resolved);
                for child in children {
                    if child.depth <= MAX_DEPTH {
                        pending.push_back(child);
                    }
                }
            }
        }

        Ok(out)
    }

    /// Resolve one pending request and, if its content key is new, queue
    /// its production dependencies.
    ///
    /// The insert is the check-and-mark step. Two branches racing the same
    /// key may both resolve it (duplicate work, not incorrectness: store
    /// commits and extraction are idempotent), but at most one expands it.
    async fn expand(&self, dep: PendingDep) -> Result<(ResolvedDependency, Vec<PendingDep>)> {
        let resolved = self
            .resolve_one(&dep.parent_target, &dep.name, &dep.range)
            .await?;

        let fresh = self.visited.lock().await.insert(resolved.target.clone());
        if !fresh {
            return Ok((resolved, Vec::new()));
        }

        let children = resolved
            .manifest
            .deps_for(TRANSITIVE_FIELDS)
            .into_iter()
            .map(|(name, range)| PendingDep {
                parent_target: resolved.target.clone(),
                name,
                range,
                depth: dep.depth + 1,
            })
            .collect();

        Ok((resolved, children))
    }
}
