//! Path arithmetic for the `node_modules` tree.
//!
//! Package payloads live at `node_modules/<key>/package`, where `<key>` is
//! the content key (tarball checksum). A consumer exposes its dependencies
//! under its own `node_modules/<key>/node_modules` directory; the
//! top-level project is addressed by the sentinel [`TOP_LEVEL_TARGET`] and
//! its dependency directory is the project `node_modules` itself.

use std::path::{Path, PathBuf};

/// Location sentinel for the top-level project.
pub const TOP_LEVEL_TARGET: &str = "..";

/// Directory name of the extracted payload inside a content-key entry.
pub const PAYLOAD_DIR: &str = "package";

/// Name of the executable-link directory inside a dependency directory.
pub const BIN_DIR: &str = ".bin";

/// Resolved view of one project's `node_modules` tree.
#[derive(Debug, Clone)]
pub struct Layout {
    modules_dir: PathBuf,
}

impl Layout {
    #[must_use]
    pub fn new(modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            modules_dir: modules_dir.into(),
        }
    }

    /// The project `node_modules` directory.
    #[must_use]
    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// The extracted payload directory for a content key.
    #[must_use]
    pub fn package_dir(&self, target: &str) -> PathBuf {
        self.modules_dir.join(target).join(PAYLOAD_DIR)
    }

    /// The dependency directory of a location.
    ///
    /// For the top-level sentinel this is the project `node_modules`
    /// itself, so link paths never carry `..` components.
    #[must_use]
    pub fn deps_dir(&self, parent_target: &str) -> PathBuf {
        if parent_target == TOP_LEVEL_TARGET {
            self.modules_dir.clone()
        } else {
            self.modules_dir.join(parent_target).join("node_modules")
        }
    }

    /// The executable-link directory of a location.
    #[must_use]
    pub fn bin_dir(&self, parent_target: &str) -> PathBuf {
        self.deps_dir(parent_target).join(BIN_DIR)
    }
}

/// Recover the content key from a direct-link target.
///
/// Direct links point at `<...>/<key>/package`, so the key is the
/// second-to-last component.
#[must_use]
pub fn target_of_link(dest: &Path) -> Option<String> {
    if dest.file_name()? != PAYLOAD_DIR {
        return None;
    }
    dest.parent()?
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_deps_dir_is_modules_dir() {
        let layout = Layout::new("/proj/node_modules");
        assert_eq!(
            layout.deps_dir(TOP_LEVEL_TARGET),
            PathBuf::from("/proj/node_modules")
        );
    }

    #[test]
    fn nested_deps_dir_is_under_target() {
        let layout = Layout::new("/proj/node_modules");
        assert_eq!(
            layout.deps_dir("abc123"),
            PathBuf::from("/proj/node_modules/abc123/node_modules")
        );
    }

    #[test]
    fn package_dir_appends_payload() {
        let layout = Layout::new("/proj/node_modules");
        assert_eq!(
            layout.package_dir("abc123"),
            PathBuf::from("/proj/node_modules/abc123/package")
        );
    }

    #[test]
    fn target_of_link_parses_relative_forms() {
        assert_eq!(
            target_of_link(Path::new("abc123/package")),
            Some("abc123".to_string())
        );
        assert_eq!(
            target_of_link(Path::new("../../abc123/package")),
            Some("abc123".to_string())
        );
        assert_eq!(target_of_link(Path::new("abc123/other")), None);
        assert_eq!(target_of_link(Path::new("package")), None);
    }
}
