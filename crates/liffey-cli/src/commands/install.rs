//! `liffey install` command implementation.

use liffey_core::{install, Config, InstallOptions, InstallReport, RegistryClient};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Install summary for JSON output.
#[derive(Serialize)]
struct InstallSummary {
    resolved: u32,
    downloaded: u32,
    reused_cache: u32,
    already_installed: u32,
}

impl From<InstallReport> for InstallSummary {
    fn from(report: InstallReport) -> Self {
        Self {
            resolved: report.resolved,
            downloaded: report.downloaded,
            reused_cache: report.reused_cache,
            already_installed: report.already_installed,
        }
    }
}

/// Install result for JSON output (locked format: { ok, install, error? }).
#[derive(Serialize)]
struct InstallJsonResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    install: Option<InstallSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the install command.
pub async fn run(cwd: &Path, include_dev: bool, json: bool) -> Result<()> {
    let config = Config::default();

    let result = match RegistryClient::from_config(&config) {
        Ok(registry) => {
            install(cwd, &config, Arc::new(registry), &InstallOptions { include_dev }).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            if json {
                let out = InstallJsonResult {
                    ok: true,
                    install: Some(report.into()),
                    error: None,
                };
                println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
            } else {
                println!(
                    "Installed {} packages ({} downloaded, {} from cache, {} already present)",
                    report.resolved,
                    report.downloaded,
                    report.reused_cache,
                    report.already_installed
                );
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let out = InstallJsonResult {
                    ok: false,
                    install: None,
                    error: Some(e.to_string()),
                };
                println!(
                    "{}",
                    serde_json::to_string_pretty(&out).unwrap_or_default()
                );
                std::process::exit(1);
            }
            Err(e).into_diagnostic()
        }
    }
}
