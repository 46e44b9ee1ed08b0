//! Install orchestration: resolve, fetch, link.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::layout::Layout;
use crate::link::Linker;
use crate::manifest::{Manifest, TOP_LEVEL_FIELDS, TRANSITIVE_FIELDS};
use crate::registry::Registry;
use crate::resolve::Resolver;
use crate::store::Store;

/// Options for a full install run.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Include the project's devDependencies (top level only; transitive
    /// packages always expand production dependencies only).
    pub include_dev: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self { include_dev: true }
    }
}

/// Summary counters of a completed install run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallReport {
    /// Resolved edges, duplicates included.
    pub resolved: u32,
    pub downloaded: u32,
    pub reused_cache: u32,
    pub already_installed: u32,
}

/// Install the project at `project_root`.
///
/// Reads `package.json`, expands the dependency graph, fetches every
/// unique payload, and links the tree. Fetch runs to completion before
/// linking so every link target is populated when this returns.
///
/// # Errors
/// Fail-fast: the first hard error of any stage aborts the run.
pub async fn install<R>(
    project_root: &Path,
    config: &Config,
    registry: Arc<R>,
    options: &InstallOptions,
) -> Result<InstallReport>
where
    R: Registry,
{
    let manifest = Manifest::load(&project_root.join("package.json")).await?;

    let fields = if options.include_dev {
        TOP_LEVEL_FIELDS
    } else {
        TRANSITIVE_FIELDS
    };
    let seeds = manifest.deps_for(fields);

    let modules_dir = project_root.join("node_modules");
    tokio::fs::create_dir_all(&modules_dir).await?;
    let layout = Layout::new(&modules_dir);

    tracing::info!(
        project = %project_root.display(),
        seeds = seeds.len(),
        "resolving dependencies"
    );
    let resolver = Resolver::new(registry, layout.clone());
    let resolved = resolver.resolve_all(&seeds).await?;

    tracing::info!(edges = resolved.len(), "fetching packages");
    let store = Store::from_config(config);
    let fetcher = Fetcher::new(store, config.http_client()?, layout.clone());
    let fetched = fetcher.fetch_all(&resolved).await?;

    tracing::info!("linking tree");
    let linker = Linker::new(layout);
    linker.link_all(&resolved).await?;

    Ok(InstallReport {
        resolved: resolved.len() as u32,
        downloaded: fetched.downloaded,
        reused_cache: fetched.reused_cache,
        already_installed: fetched.already_installed,
    })
}
