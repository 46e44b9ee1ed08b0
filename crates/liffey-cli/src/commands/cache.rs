//! `liffey cache` command implementation.

use liffey_core::{Config, Store};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

/// Cached tarball entry for JSON output.
#[derive(Serialize)]
struct CachedTarball {
    key: String,
    size_bytes: u64,
}

/// Cache list result for JSON output.
#[derive(Serialize)]
struct CacheListResult {
    ok: bool,
    tarballs: Vec<CachedTarball>,
    total_size_bytes: u64,
}

/// Cache prune result for JSON output.
#[derive(Serialize)]
struct CachePruneResult {
    ok: bool,
    removed_count: usize,
}

/// List cached tarballs.
pub fn list(json: bool) -> Result<()> {
    let store = Store::from_config(&Config::default());
    let entries = store.list().into_diagnostic()?;
    let total: u64 = entries.iter().map(|(_, size)| size).sum();

    if json {
        let out = CacheListResult {
            ok: true,
            tarballs: entries
                .into_iter()
                .map(|(key, size_bytes)| CachedTarball { key, size_bytes })
                .collect(),
            total_size_bytes: total,
        };
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
    } else {
        for (key, size) in &entries {
            println!("{key}  {size}");
        }
        println!("{} tarballs, {total} bytes total", entries.len());
    }

    Ok(())
}

/// Delete all cached tarballs.
pub fn prune(json: bool) -> Result<()> {
    let store = Store::from_config(&Config::default());
    let removed = store.prune().into_diagnostic()?;

    if json {
        let out = CachePruneResult {
            ok: true,
            removed_count: removed,
        };
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
    } else {
        println!("Removed {removed} cached tarballs");
    }

    Ok(())
}
