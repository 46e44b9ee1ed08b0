//! Typed view of a package document.
//!
//! Covers both an on-disk `package.json` and a registry packument version
//! entry. Absent fields default to empty collections; the pipeline never
//! touches raw JSON values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Dependency sections of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepField {
    Dependencies,
    DevDependencies,
}

/// Field set for expanding the top-level project.
pub const TOP_LEVEL_FIELDS: &[DepField] = &[DepField::Dependencies, DepField::DevDependencies];

/// Field set for expanding every transitive package.
pub const TRANSITIVE_FIELDS: &[DepField] = &[DepField::Dependencies];

/// Parsed package document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default)]
    pub bin: Option<Bin>,

    #[serde(default)]
    pub dist: Option<Dist>,
}

/// The `bin` field: either a bare path or a name -> path map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bin {
    Path(String),
    Map(BTreeMap<String, String>),
}

/// Distribution descriptor from a registry version document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dist {
    pub tarball: String,

    #[serde(default)]
    pub shasum: Option<String>,
}

impl Manifest {
    /// Parse a manifest from raw JSON text.
    ///
    /// # Errors
    /// Returns `ManifestInvalid` if the text is not a valid manifest
    /// document.
    pub fn parse(raw: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::ManifestInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read and parse a manifest file.
    ///
    /// # Errors
    /// Propagates IO errors (a missing file surfaces as a `NotFound`-class
    /// error) and parse failures.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::parse(&raw, path)
    }

    /// Dependency requests declared under the given field set.
    ///
    /// Entries are merged across sections with `dependencies` taking
    /// precedence over `devDependencies`, and returned sorted by name.
    #[must_use]
    pub fn deps_for(&self, fields: &[DepField]) -> Vec<(String, String)> {
        let mut merged: BTreeMap<&str, &str> = BTreeMap::new();

        if fields.contains(&DepField::DevDependencies) {
            for (name, range) in &self.dev_dependencies {
                merged.insert(name, range);
            }
        }
        if fields.contains(&DepField::Dependencies) {
            for (name, range) in &self.dependencies {
                merged.insert(name, range);
            }
        }

        merged
            .into_iter()
            .map(|(name, range)| (name.to_string(), range.to_string()))
            .collect()
    }

    /// Canonical executables map: exe name -> path relative to the package
    /// payload.
    ///
    /// The bare-path form of `bin` exposes a single executable under the
    /// package's unscoped name.
    #[must_use]
    pub fn bin_entries(&self) -> Vec<(String, String)> {
        match &self.bin {
            None => Vec::new(),
            Some(Bin::Path(path)) => {
                let Some(name) = self.name.as_deref() else {
                    return Vec::new();
                };
                let bare = name.rsplit('/').next().unwrap_or(name);
                vec![(bare.to_string(), path.clone())]
            }
            Some(Bin::Map(map)) => map
                .iter()
                .map(|(name, path)| (name.clone(), path.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(raw: &str) -> Manifest {
        Manifest::parse(raw, &PathBuf::from("package.json")).unwrap()
    }

    #[test]
    fn absent_fields_default_to_empty() {
        let m = parse(r#"{"name": "a", "version": "1.0.0"}"#);
        assert!(m.dependencies.is_empty());
        assert!(m.dev_dependencies.is_empty());
        assert!(m.bin.is_none());
        assert!(m.dist.is_none());
    }

    #[test]
    fn top_level_fields_include_dev() {
        let m = parse(
            r#"{
                "dependencies": {"a": "^1.0.0"},
                "devDependencies": {"b": "^2.0.0"}
            }"#,
        );

        let top = m.deps_for(TOP_LEVEL_FIELDS);
        assert_eq!(top.len(), 2);

        let transitive = m.deps_for(TRANSITIVE_FIELDS);
        assert_eq!(transitive, vec![("a".to_string(), "^1.0.0".to_string())]);
    }

    #[test]
    fn dependencies_take_precedence_over_dev() {
        let m = parse(
            r#"{
                "dependencies": {"pkg": "1.0.0"},
                "devDependencies": {"pkg": "2.0.0"}
            }"#,
        );

        let deps = m.deps_for(TOP_LEVEL_FIELDS);
        assert_eq!(deps, vec![("pkg".to_string(), "1.0.0".to_string())]);
    }

    #[test]
    fn deps_sorted_by_name() {
        let m = parse(
            r#"{"dependencies": {"zebra": "1", "apple": "1", "mango": "1"}}"#,
        );
        let names: Vec<String> = m
            .deps_for(TRANSITIVE_FIELDS)
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, ["apple", "mango", "zebra"]);
    }

    #[test]
    fn bin_map_form() {
        let m = parse(
            r#"{"name": "tool", "bin": {"tool": "bin/tool.js", "extra": "bin/extra.js"}}"#,
        );
        let bins = m.bin_entries();
        assert_eq!(bins.len(), 2);
        assert!(bins.contains(&("tool".to_string(), "bin/tool.js".to_string())));
    }

    #[test]
    fn bin_string_form_uses_unscoped_name() {
        let m = parse(r#"{"name": "@scope/tool", "bin": "cli.js"}"#);
        assert_eq!(
            m.bin_entries(),
            vec![("tool".to_string(), "cli.js".to_string())]
        );
    }

    #[test]
    fn dist_shasum_optional() {
        let m = parse(
            r#"{"dist": {"tarball": "https://example.com/a-1.0.0.tgz"}}"#,
        );
        let dist = m.dist.unwrap();
        assert_eq!(dist.tarball, "https://example.com/a-1.0.0.tgz");
        assert!(dist.shasum.is_none());
    }

    #[test]
    fn invalid_json_is_manifest_invalid() {
        let err = Manifest::parse("not json {{{", &PathBuf::from("p.json")).unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }));
        assert!(!err.is_not_found());
    }
}
