//! Integration tests for the `liffey install` command.

use flate2::write::GzEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "liffey-cli", "--bin", "liffey", "--"]);
    cmd
}

fn write_package_json(dir: &Path, content: &str) {
    fs::write(dir.join("package.json"), content).unwrap();
}

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(path).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, data.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

fn shasum(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[test]
fn install_help_shows_options() {
    let output = cargo_bin()
        .args(["install", "--help"])
        .output()
        .expect("failed to run liffey install --help");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("--no-dev"),
        "help should show --no-dev option: {stdout}"
    );
}

#[test]
fn empty_project_reports_zero_packages() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("app");
    fs::create_dir_all(&project).unwrap();
    write_package_json(
        &project,
        r#"{"name": "app", "version": "1.0.0", "dependencies": {}}"#,
    );

    let output = cargo_bin()
        .args(["--json", "install", "--cwd"])
        .arg(&project)
        .env("LIFFEY_CACHE_DIR", dir.path().join("cache"))
        .env("LIFFEY_REGISTRY", "http://127.0.0.1:9/")
        .output()
        .expect("failed to run liffey install");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|_| panic!("stdout should be valid JSON: {stdout}"));

    assert_eq!(json["ok"].as_bool(), Some(true));
    assert_eq!(json["install"]["resolved"].as_u64(), Some(0));
    assert!(output.status.success());
}

#[test]
fn install_links_package_from_fixture_registry() {
    let mut server = mockito::Server::new();

    let foo_tgz = tarball(&[
        ("package/package.json", r#"{"name":"foo","version":"1.0.0"}"#),
        ("package/index.js", "module.exports = 42;"),
    ]);
    let key = shasum(&foo_tgz);

    let packument = format!(
        r#"{{
            "name": "foo",
            "dist-tags": {{"latest": "1.0.0"}},
            "versions": {{
                "1.0.0": {{
                    "name": "foo",
                    "version": "1.0.0",
                    "dist": {{"tarball": "{url}/foo.tgz", "shasum": "{key}"}}
                }}
            }}
        }}"#,
        url = server.url()
    );

    server
        .mock("GET", "/foo")
        .with_status(200)
        .with_body(packument)
        .create();
    server
        .mock("GET", "/foo.tgz")
        .with_status(200)
        .with_body(foo_tgz)
        .create();

    let dir = tempdir().unwrap();
    let project = dir.path().join("app");
    fs::create_dir_all(&project).unwrap();
    write_package_json(
        &project,
        r#"{"name": "app", "version": "1.0.0", "dependencies": {"foo": "1.0.0"}}"#,
    );

    let output = cargo_bin()
        .args(["--json", "install", "--cwd"])
        .arg(&project)
        .env("LIFFEY_CACHE_DIR", dir.path().join("cache"))
        .env("LIFFEY_REGISTRY", server.url())
        .output()
        .expect("failed to run liffey install");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "install failed: {stderr}");

    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|_| panic!("stdout should be valid JSON: {stdout}"));
    assert_eq!(json["ok"].as_bool(), Some(true));
    assert_eq!(json["install"]["downloaded"].as_u64(), Some(1));

    let link = project.join("node_modules").join("foo");
    assert!(
        link.join("index.js").exists(),
        "direct link should resolve into the payload"
    );
    assert!(dir.path().join("cache").join(&key).is_file());
}

#[test]
fn missing_package_json_fails_with_json_error() {
    let dir = tempdir().unwrap();

    let output = cargo_bin()
        .args(["--json", "install", "--cwd"])
        .arg(dir.path())
        .env("LIFFEY_CACHE_DIR", dir.path().join("cache"))
        .env("LIFFEY_REGISTRY", "http://127.0.0.1:9/")
        .output()
        .expect("failed to run liffey install");

    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|_| panic!("stdout should be valid JSON even on error: {stdout}"));
    assert_eq!(json["ok"].as_bool(), Some(false));
    assert!(json["error"].is_string());
}
