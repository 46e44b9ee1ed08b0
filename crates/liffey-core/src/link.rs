//! Symlink construction for the `node_modules` tree.
//!
//! Every resolved edge gets a direct link exposing the package under its
//! import name inside its parent's dependency directory, plus one `.bin`
//! link per declared executable. Link targets are relative to the link's
//! own directory so the tree stays relocatable.

use futures::stream::{self, StreamExt};
use std::io;
use std::path::Path;

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::resolve::ResolvedDependency;

/// Maximum concurrent link operations.
const MAX_CONCURRENT_LINKS: usize = 32;

/// Link stage of the install pipeline.
pub struct Linker {
    layout: Layout,
}

impl Linker {
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Create the links for every resolved edge.
    ///
    /// # Errors
    /// The first failing edge aborts the run.
    pub async fn link_all(&self, resolved: &[ResolvedDependency]) -> Result<()> {
        let results: Vec<Result<()>> = stream::iter(resolved)
            .map(|dep| self.link_one(dep))
            .buffer_unordered(MAX_CONCURRENT_LINKS)
            .collect()
            .await;

        for result in results {
            result?;
        }
        Ok(())
    }

    /// Create the direct link and bin links for one resolved edge.
    ///
    /// # Errors
    /// Propagates filesystem errors.
    pub async fn link_one(&self, dep: &ResolvedDependency) -> Result<()> {
        let deps_dir = self.layout.deps_dir(&dep.parent_target);
        let package_dir = self.layout.package_dir(&dep.target);

        // Scoped names like @scope/name land under a scope directory;
        // join handles the intermediate component and replace_link creates
        // the parent.
        let link_path = deps_dir.join(&dep.name);
        replace_link(&package_dir, &link_path).await?;

        let bins = dep.manifest.bin_entries();
        if !bins.is_empty() {
            let bin_dir = self.layout.bin_dir(&dep.parent_target);
            for (exe, rel_path) in bins {
                replace_link(&package_dir.join(rel_path), &bin_dir.join(exe)).await?;
            }
        }

        tracing::debug!(name = %dep.name, parent = %dep.parent_target, "linked");
        Ok(())
    }
}

/// Create a relative symlink at `link_path` pointing to `target`,
/// replacing whatever is already there.
async fn replace_link(target: &Path, link_path: &Path) -> Result<()> {
    let link_dir = link_path
        .parent()
        .ok_or_else(|| Error::Io(io::Error::other("link path has no parent")))?;
    tokio::fs::create_dir_all(link_dir).await?;

    let rel = pathdiff::diff_paths(target, link_dir).ok_or_else(|| {
        Error::Io(io::Error::other(format!(
            "cannot relativize {} against {}",
            target.display(),
            link_dir.display()
        )))
    })?;

    remove_existing(link_path).await?;
    create_symlink(target, &rel, link_path).await
}

/// Remove a pre-existing link, file, or directory at `path`, if any.
async fn remove_existing(path: &Path) -> Result<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if meta.file_type().is_symlink() || meta.is_file() {
        tokio::fs::remove_file(path).await?;
    } else {
        tokio::fs::remove_dir_all(path).await?;
    }
    Ok(())
}

#[cfg(unix)]
async fn create_symlink(_target: &Path, rel: &Path, link_path: &Path) -> Result<()> {
    tokio::fs::symlink(rel, link_path).await?;
    Ok(())
}

#[cfg(windows)]
async fn create_symlink(target: &Path, _rel: &Path, link_path: &Path) -> Result<()> {
    // Junctions need absolute targets; bin entries are files and get a
    // file symlink instead.
    let target = target.to_path_buf();
    let link_path = link_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        if target.is_dir() {
            junction::create(&target, &link_path)
        } else {
            std::os::windows::fs::symlink_file(&target, &link_path)
        }
    })
    .await
    .map_err(|e| Error::Io(io::Error::other(e.to_string())))??;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::layout::TOP_LEVEL_TARGET;
    use crate::manifest::{Bin, Manifest};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn edge(name: &str, parent: &str, target: &str, manifest: Manifest) -> ResolvedDependency {
        ResolvedDependency {
            name: name.to_string(),
            parent_target: parent.to_string(),
            target: target.to_string(),
            manifest,
        }
    }

    fn with_payload(modules_dir: &Path, key: &str, files: &[(&str, &str)]) {
        let package_dir = modules_dir.join(key).join("package");
        for (rel, contents) in files {
            let path = package_dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
    }

    #[tokio::test]
    async fn top_level_direct_link_is_relative() {
        let dir = tempdir().unwrap();
        let modules_dir = dir.path().join("node_modules");
        with_payload(&modules_dir, "aaa", &[("package.json", "{}")]);

        let linker = Linker::new(Layout::new(&modules_dir));
        linker
            .link_one(&edge("foo", TOP_LEVEL_TARGET, "aaa", Manifest::default()))
            .await
            .unwrap();

        let link = modules_dir.join("foo");
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("aaa/package"));
        // The link resolves to the payload.
        assert!(link.join("package.json").exists());
    }

    #[tokio::test]
    async fn nested_direct_link_climbs_out_of_parent() {
        let dir = tempdir().unwrap();
        let modules_dir = dir.path().join("node_modules");
        with_payload(&modules_dir, "aaa", &[("package.json", "{}")]);

        let linker = Linker::new(Layout::new(&modules_dir));
        linker
            .link_one(&edge("foo", "p1k", "aaa", Manifest::default()))
            .await
            .unwrap();

        let link = modules_dir.join("p1k/node_modules/foo");
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("../../aaa/package")
        );
        assert!(link.join("package.json").exists());
    }

    #[tokio::test]
    async fn bin_links_point_into_payload() {
        let dir = tempdir().unwrap();
        let modules_dir = dir.path().join("node_modules");
        with_payload(
            &modules_dir,
            "aaa",
            &[("package.json", "{}"), ("bin/tool.js", "#!node")],
        );

        let manifest = Manifest {
            name: Some("tool".to_string()),
            bin: Some(Bin::Map(
                [("tool".to_string(), "bin/tool.js".to_string())]
                    .into_iter()
                    .collect(),
            )),
            ..Manifest::default()
        };

        let linker = Linker::new(Layout::new(&modules_dir));
        linker
            .link_one(&edge("tool", TOP_LEVEL_TARGET, "aaa", manifest.clone()))
            .await
            .unwrap();

        let bin_link = modules_dir.join(".bin/tool");
        assert_eq!(
            fs::read_link(&bin_link).unwrap(),
            PathBuf::from("../aaa/package/bin/tool.js")
        );
        assert!(bin_link.exists());

        // Nested consumer gets its own .bin entry.
        linker
            .link_one(&edge("tool", "p1k", "aaa", manifest))
            .await
            .unwrap();
        assert_eq!(
            fs::read_link(modules_dir.join("p1k/node_modules/.bin/tool")).unwrap(),
            PathBuf::from("../../../aaa/package/bin/tool.js")
        );
    }

    #[tokio::test]
    async fn linking_is_idempotent_and_replaces() {
        let dir = tempdir().unwrap();
        let modules_dir = dir.path().join("node_modules");
        with_payload(&modules_dir, "aaa", &[("package.json", "{}")]);
        with_payload(&modules_dir, "bbb", &[("package.json", "{}")]);

        // A stale real directory sits where the link belongs.
        let stale = modules_dir.join("foo");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("old.txt"), "old").unwrap();

        let linker = Linker::new(Layout::new(&modules_dir));
        linker
            .link_one(&edge("foo", TOP_LEVEL_TARGET, "aaa", Manifest::default()))
            .await
            .unwrap();
        // Re-link to a different target replaces, not errors.
        linker
            .link_one(&edge("foo", TOP_LEVEL_TARGET, "bbb", Manifest::default()))
            .await
            .unwrap();

        let link = modules_dir.join("foo");
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("bbb/package"));
        assert!(!link.join("old.txt").exists());
    }

    #[tokio::test]
    async fn scoped_name_gets_scope_directory() {
        let dir = tempdir().unwrap();
        let modules_dir = dir.path().join("node_modules");
        with_payload(&modules_dir, "aaa", &[("package.json", "{}")]);

        let linker = Linker::new(Layout::new(&modules_dir));
        linker
            .link_one(&edge(
                "@scope/foo",
                TOP_LEVEL_TARGET,
                "aaa",
                Manifest::default(),
            ))
            .await
            .unwrap();

        let link = modules_dir.join("@scope/foo");
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("../aaa/package")
        );
    }
}
