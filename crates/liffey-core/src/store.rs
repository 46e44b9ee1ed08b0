//! Content-addressed tarball store.
//!
//! Verified package archives live at `<root>/<key>` where `<key>` is the
//! hex checksum of the archive bytes. Writes stage under `<root>/tmp` and
//! land with an atomic rename, so concurrent duplicate downloads of the
//! same key cannot corrupt each other. The store never computes checksums
//! itself; callers hash the stream and pick the final key.

use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::layout::PAYLOAD_DIR;

/// Name of the staging directory inside the store root.
const TMP_DIR: &str = "tmp";

/// Content-addressed store of verified package archives.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

/// An in-progress store write: a staging file the caller streams archive
/// bytes into before deciding the final content key.
#[derive(Debug)]
pub struct StagedTarball {
    path: PathBuf,
    file: tokio::fs::File,
}

impl StagedTarball {
    /// Append a chunk of archive bytes.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await?;
        Ok(())
    }

    /// The staging path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the staged bytes without committing.
    pub async fn discard(self) -> Result<()> {
        drop(self.file);
        tokio::fs::remove_file(&self.path).await?;
        Ok(())
    }

    async fn into_path(self) -> Result<PathBuf> {
        self.file.sync_all().await?;
        drop(self.file);
        Ok(self.path)
    }
}

impl Store {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cache_dir)
    }

    /// Get the store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path of the archive for a content key.
    #[must_use]
    pub fn tarball_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Whether an archive is committed under the given key.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.tarball_path(key).is_file()
    }

    /// Ensure the store and staging directories exist.
    ///
    /// # Errors
    /// Returns an error if the directories cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.root.join(TMP_DIR))?;
        Ok(())
    }

    /// Open a staging sink for a new archive.
    ///
    /// # Errors
    /// Returns an error if the staging file cannot be created.
    pub async fn write(&self) -> Result<StagedTarball> {
        let tmp = self.root.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp).await?;

        let path = tmp.join(format!("stage-{}-{:08x}", std::process::id(), rand_u32()));
        let file = tokio::fs::File::create(&path).await?;
        Ok(StagedTarball { path, file })
    }

    /// Commit a staged archive under its final content key.
    ///
    /// The rename is atomic and overwrite-safe, so racing duplicate
    /// commits of the same key converge on identical bytes.
    ///
    /// # Errors
    /// Returns an error if the staged file cannot be persisted or renamed.
    pub async fn commit(&self, staged: StagedTarball, key: &str) -> Result<PathBuf> {
        let dest = self.tarball_path(key);
        let src = staged.into_path().await?;
        tokio::fs::rename(&src, &dest).await?;
        tracing::debug!(key, "committed tarball");
        Ok(dest)
    }

    /// Extract the archive for `key` so that `package_dir` holds the
    /// package payload.
    ///
    /// Idempotent: an existing destination (including one that appeared
    /// while racing another extraction) is success. The payload is staged
    /// next to the destination and renamed into place.
    ///
    /// # Errors
    /// Returns `CacheMiss` when no archive is committed under `key`;
    /// extraction failures and IO errors propagate.
    pub fn extract(&self, package_dir: &Path, key: &str) -> Result<()> {
        let tarball = self.tarball_path(key);
        let file = match fs::File::open(&tarball) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::CacheMiss(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        extract_tgz_atomic(file, package_dir)
    }

    /// List committed archives as `(key, size_bytes)` pairs.
    ///
    /// # Errors
    /// Returns an error if the store directory cannot be read.
    pub fn list(&self) -> Result<Vec<(String, u64)>> {
        let mut result = Vec::new();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(result),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            result.push((entry.file_name().to_string_lossy().into_owned(), meta.len()));
        }

        result.sort();
        Ok(result)
    }

    /// Delete every committed archive and staged file.
    ///
    /// # Errors
    /// Returns an error if an entry cannot be removed.
    pub fn prune(&self) -> Result<usize> {
        let mut removed = 0;

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if entry.metadata()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            } else if entry.file_name() == TMP_DIR {
                fs::remove_dir_all(entry.path())?;
                fs::create_dir_all(entry.path())?;
            }
        }

        Ok(removed)
    }
}

/// Extract a gzipped tarball so that `dest_package_dir` holds the package
/// payload, atomically.
///
/// Extraction goes to a temp sibling first, then renames into place. An
/// existing destination, before or after extraction, is success: payloads
/// are immutable per key, so losing the race means the same bytes are
/// already there.
fn extract_tgz_atomic(reader: impl Read, dest_package_dir: &Path) -> Result<()> {
    let entry_dir = dest_package_dir
        .parent()
        .ok_or_else(|| Error::Extract("destination has no parent".to_string()))?;

    fs::create_dir_all(entry_dir)?;

    if dest_package_dir.exists() {
        return Ok(());
    }

    let temp_dir = entry_dir.join(format!(".tmp-{}-{:08x}", std::process::id(), rand_u32()));
    if temp_dir.exists() {
        let _ = fs::remove_dir_all(&temp_dir);
    }
    fs::create_dir_all(&temp_dir)?;

    if let Err(e) = extract_tgz_to(reader, &temp_dir) {
        let _ = fs::remove_dir_all(&temp_dir);
        return Err(e);
    }

    let extracted_root = find_extracted_root(&temp_dir)?;

    match fs::rename(&extracted_root, dest_package_dir) {
        Ok(()) => {
            let _ = fs::remove_dir_all(&temp_dir);
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_dir_all(&temp_dir);
            if dest_package_dir.exists() {
                return Ok(());
            }
            Err(e.into())
        }
    }
}

/// Find the single top-level directory of an extracted tarball.
///
/// npm tarballs normally use a `package/` root, but some publish under the
/// bare package name instead.
fn find_extracted_root(temp_dir: &Path) -> Result<PathBuf> {
    let package_dir = temp_dir.join(PAYLOAD_DIR);
    if package_dir.is_dir() {
        return Ok(package_dir);
    }

    let entries: Vec<_> = fs::read_dir(temp_dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| {
            e.file_type().map(|ft| ft.is_dir()).unwrap_or(false)
                && !e.file_name().to_string_lossy().starts_with('.')
        })
        .collect();

    match entries.len() {
        1 => Ok(entries[0].path()),
        0 => Err(Error::Extract(
            "tarball does not contain a top-level directory".to_string(),
        )),
        n => Err(Error::Extract(format!(
            "tarball contains {n} top-level directories, expected 1"
        ))),
    }
}

fn extract_tgz_to(reader: impl Read, dest: &Path) -> Result<()> {
    let gz = GzDecoder::new(reader);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| Error::Extract(format!("failed to read tarball entries: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| Error::Extract(format!("failed to read tarball entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| Error::Extract(format!("failed to read entry path: {e}")))?
            .into_owned();
        let path_str = path.to_string_lossy().into_owned();

        if path.is_absolute() {
            return Err(Error::Extract(format!(
                "tarball contains absolute path: {path_str}"
            )));
        }

        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(Error::Extract(format!(
                "tarball contains path traversal: {path_str}"
            )));
        }

        let dest_path = dest.join(&path);
        if !dest_path.starts_with(dest) {
            return Err(Error::Extract(format!(
                "tarball entry escapes destination: {path_str}"
            )));
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry.header().entry_type().is_file() {
            let mut file = fs::File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let perms = fs::Permissions::from_mode(mode);
                    let _ = fs::set_permissions(&dest_path, perms);
                }
            }
        }
        // Symlinks and other special entries are skipped.
    }

    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    hasher.finish() as u32
}

/// Build a gzipped tarball fixture from `(path, contents)` pairs.
#[cfg(test)]
pub(crate) fn test_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tar::Builder;

    let mut tar_bytes = Vec::new();
    {
        let mut builder = Builder::new(&mut tar_bytes);
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}
