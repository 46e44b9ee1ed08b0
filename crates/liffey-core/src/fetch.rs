//! Deduplicated fetch pipeline.
//!
//! Ensures every unique content key in a resolved stream is present on
//! disk: already-installed payloads are left alone, store hits are
//! extracted, and misses are downloaded, verified, and then extracted.
//! Declared executables get their permission bits fixed afterwards.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::io;
use std::path::Path;

use crate::download::download;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::resolve::ResolvedDependency;
use crate::store::Store;

/// Maximum concurrent fetch operations.
const MAX_CONCURRENT_FETCHES: usize = 16;

/// Counters describing how each unique target was satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub downloaded: u32,
    pub reused_cache: u32,
    pub already_installed: u32,
}

enum FetchOutcome {
    AlreadyInstalled,
    FromCache,
    Downloaded,
}

/// Fetch stage of the install pipeline.
pub struct Fetcher {
    store: Store,
    client: reqwest::Client,
    layout: Layout,
}

impl Fetcher {
    #[must_use]
    pub fn new(store: Store, client: reqwest::Client, layout: Layout) -> Self {
        Self {
            store,
            client,
            layout,
        }
    }

    /// Make every unique target of the resolved stream available on disk.
    ///
    /// Deduplicates by content key before spending any I/O: the first
    /// occurrence wins, later duplicates are dropped without side effects.
    ///
    /// # Errors
    /// The first failing target aborts the run.
    pub async fn fetch_all(&self, resolved: &[ResolvedDependency]) -> Result<FetchReport> {
        self.store.ensure_dirs()?;

        let mut seen: HashSet<&str> = HashSet::new();
        let unique: Vec<&ResolvedDependency> = resolved
            .iter()
            .filter(|dep| seen.insert(dep.target.as_str()))
            .collect();

        let outcomes: Vec<Result<FetchOutcome>> = stream::iter(unique)
            .map(|dep| self.fetch_one(dep))
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        let mut report = FetchReport::default();
        for outcome in outcomes {
            match outcome? {
                FetchOutcome::AlreadyInstalled => report.already_installed += 1,
                FetchOutcome::FromCache => report.reused_cache += 1,
                FetchOutcome::Downloaded => report.downloaded += 1,
            }
        }

        Ok(report)
    }

    async fn fetch_one(&self, dep: &ResolvedDependency) -> Result<FetchOutcome> {
        let package_dir = self.layout.package_dir(&dep.target);

        match tokio::fs::metadata(&package_dir).await {
            Ok(_) => {
                tracing::debug!(target = %dep.target, "already installed");
                return Ok(FetchOutcome::AlreadyInstalled);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let outcome = match self.extract(&package_dir, &dep.target).await {
            Ok(()) => FetchOutcome::FromCache,
            Err(e) if e.is_not_found() => {
                let dist = dep.manifest.dist.as_ref().ok_or_else(|| Error::MissingDist {
                    name: dep.name.clone(),
                })?;

                download(&self.client, &self.store, &dist.tarball, dist.shasum.as_deref())
                    .await?;
                self.extract(&package_dir, &dep.target).await?;
                FetchOutcome::Downloaded
            }
            Err(e) => return Err(e),
        };

        self.fix_bin_modes(dep, &package_dir)?;
        tracing::debug!(target = %dep.target, "fetched");
        Ok(outcome)
    }

    async fn extract(&self, package_dir: &Path, key: &str) -> Result<()> {
        let store = self.store.clone();
        let dir = package_dir.to_path_buf();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || store.extract(&dir, &key))
            .await
            .map_err(|e| Error::Extract(e.to_string()))?
    }

    /// Set `0o777 & !umask` on every declared executable of the package.
    fn fix_bin_modes(&self, dep: &ResolvedDependency, package_dir: &Path) -> Result<()> {
        for (_, rel_path) in dep.manifest.bin_entries() {
            make_executable(&package_dir.join(rel_path))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn current_umask() -> u32 {
    use std::sync::OnceLock;

    // umask can only be read by writing it, so cache the first read
    // instead of flapping the process-wide value on every call.
    static UMASK: OnceLock<u32> = OnceLock::new();
    *UMASK.get_or_init(|| unsafe {
        let mask = libc::umask(0);
        libc::umask(mask);
        u32::from(mask as u16)
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = 0o777 & !current_umask();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
