//! Streaming archive download with checksum verification.

use sha1::{Digest, Sha1};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::store::Store;

/// Per-request download timeout.
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Download an archive into the store, returning the content key it was
/// committed under.
///
/// The response is consumed in a single pass: every chunk goes to the
/// store's staging sink and into a SHA-1 digest simultaneously, so the
/// persisted bytes and the checksum derive from the identical stream. When
/// `expected_shasum` is supplied and the actual digest differs, the staged
/// bytes are discarded and nothing is committed under either checksum.
/// Either way the commit key is the *actual* digest.
///
/// # Errors
/// Returns `Download` on a non-success HTTP status, `CorruptedPackage` on
/// a checksum mismatch, and propagates network/IO errors.
pub async fn download(
    client: &reqwest::Client,
    store: &Store,
    url: &str,
    expected_shasum: Option<&str>,
) -> Result<String> {
    tracing::debug!(url, "downloading tarball");

    let mut response = client
        .get(url)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Download {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let mut staged = store.write().await?;
    let mut hasher = Sha1::new();

    while let Some(chunk) = response.chunk().await? {
        hasher.update(&chunk);
        if let Err(e) = staged.write_chunk(&chunk).await {
            let _ = staged.discard().await;
            return Err(e);
        }
    }

    let actual = format!("{:x}", hasher.finalize());

    if let Some(expected) = expected_shasum {
        if expected != actual {
            staged.discard().await?;
            return Err(Error::CorruptedPackage {
                url: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    store.commit(staged, &actual).await?;
    tracing::debug!(url, key = %actual, "tarball verified and committed");
    Ok(actual)
}
