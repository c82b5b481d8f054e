//! Integration tests for the download pipeline
//!
//! These tests run the orchestrator end to end against a mock forge:
//! release listing, asset transfer, extraction, tracking files and pruning.

use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Duration;

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use release_fetcher::app::downloader::LatestReleaseRecord;
use release_fetcher::app::orchestrator::{FileType, NeverProceed, RetryReport};
use release_fetcher::app::{Orchestrator, Shutdown};
use release_fetcher::config::AppConfig;

const FIRMWARE_RELEASES: &str = "/repos/meshtastic/firmware/releases";

/// Create integration test configuration
///
/// Firmware only, pointed at the mock server, with fast retries.
fn create_test_config(server: &ServerGuard, temp_dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default().with_download_dir(temp_dir.path().join("mirror"));
    config.client.api_base_url = server.url();
    config.client.max_api_retries = 0;
    config.transfer.max_retries = 0;
    config.transfer.retry_delay = Duration::from_millis(1);
    config.app.enabled = false;
    config.firmware.include_patterns = vec!["rak4631".to_string()];
    config.firmware.keep_count = 2;
    config
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn asset_json(server: &ServerGuard, name: &str, content: &[u8]) -> serde_json::Value {
    json!({
        "name": name,
        "browser_download_url": format!("{}/dl/{}", server.url(), name),
        "size": content.len(),
        "digest": format!("sha256:{}", hex::encode(Sha256::digest(content))),
    })
}

async fn mock_releases(server: &mut ServerGuard, releases: serde_json::Value) -> Mock {
    server
        .mock("GET", FIRMWARE_RELEASES)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(releases.to_string())
        .create_async()
        .await
}

fn firmware_dir(temp_dir: &TempDir) -> std::path::PathBuf {
    temp_dir.path().join("mirror").join("firmware")
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).unwrap().permissions().mode() & 0o111 == 0o111
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Test a full run: asset download, script extraction and tracking file
#[tokio::test]
async fn test_pipeline_downloads_and_extracts() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let zip = build_zip(&[
        ("device-install.sh", b"#!/bin/sh\necho install\n"),
        ("firmware-rak4631-1.0.0.bin", b"firmware image"),
    ]);
    let releases = json!([{
        "tag_name": "v1.0.0",
        "name": "Firmware 1.0.0",
        "published_at": "2024-05-01T12:00:00Z",
        "assets": [
            asset_json(&server, "firmware-rak4631-1.0.0.zip", &zip),
            asset_json(&server, "firmware-tbeam-1.0.0.zip", b"unwanted"),
        ]
    }]);
    let _releases = mock_releases(&mut server, releases).await;
    let asset = server
        .mock("GET", "/dl/firmware-rak4631-1.0.0.zip")
        .with_body(zip.clone())
        .expect(1)
        .create_async()
        .await;
    let unwanted = server
        .mock("GET", "/dl/firmware-tbeam-1.0.0.zip")
        .expect(0)
        .create_async()
        .await;

    let mut config = create_test_config(&server, &temp_dir);
    config.firmware.auto_extract = true;
    config.firmware.extract_patterns = vec!["device-install.sh".to_string()];
    let orchestrator = Orchestrator::new(config).unwrap();

    let outcome = orchestrator.run_download_pipeline().await.unwrap();
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert!(!outcome.aborted && !outcome.cancelled);

    let release_dir = firmware_dir(&temp_dir).join("v1.0.0");
    assert!(release_dir.join("firmware-rak4631-1.0.0.zip").is_file());
    assert!(!release_dir.join("firmware-tbeam-1.0.0.zip").exists());
    let script = release_dir.join("device-install.sh");
    assert!(script.is_file());
    assert!(is_executable(&script));
    assert!(!release_dir.join("firmware-rak4631-1.0.0.bin").exists());

    let record = LatestReleaseRecord::load(&firmware_dir(&temp_dir).join("latest_release.json"))
        .await
        .unwrap();
    assert_eq!(record.latest_version, "v1.0.0");

    let stats = orchestrator.get_download_statistics();
    assert_eq!(stats.count(FileType::Firmware), 1);
    assert_eq!(stats.count(FileType::Extraction), 1);
    assert_eq!(stats.failed_downloads, 0);

    let versions = orchestrator.get_latest_versions().await;
    assert_eq!(versions.get("firmware").map(String::as_str), Some("v1.0.0"));

    asset.assert_async().await;
    unwanted.assert_async().await;
}

/// Test that a second run over unchanged releases transfers nothing
#[tokio::test]
async fn test_pipeline_is_idempotent() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let content = b"firmware zip bytes";
    let releases = json!([{
        "tag_name": "v1.0.0",
        "assets": [asset_json(&server, "firmware-rak4631-1.0.0.zip", content)]
    }]);
    let _releases = mock_releases(&mut server, releases).await;
    let asset = server
        .mock("GET", "/dl/firmware-rak4631-1.0.0.zip")
        .with_body(content)
        .expect(1)
        .create_async()
        .await;

    let config = create_test_config(&server, &temp_dir);
    let orchestrator = Orchestrator::new(config).unwrap();

    let first = orchestrator.run_download_pipeline().await.unwrap();
    assert_eq!(first.downloaded().count(), 1);

    let second = orchestrator.run_download_pipeline().await.unwrap();
    assert!(second.failures.is_empty());
    assert_eq!(second.downloaded().count(), 0);
    assert_eq!(second.skipped().count(), 1);

    asset.assert_async().await;
}

/// Test that old version directories are pruned and user directories survive
#[tokio::test]
async fn test_pipeline_prunes_old_versions() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let releases = json!([
        {"tag_name": "v3.0.0", "assets": [asset_json(&server, "firmware-rak4631-3.0.0.zip", b"v3")]},
        {"tag_name": "v2.0.0", "assets": [asset_json(&server, "firmware-rak4631-2.0.0.zip", b"v2")]},
    ]);
    let _releases = mock_releases(&mut server, releases).await;
    let _v3 = server
        .mock("GET", "/dl/firmware-rak4631-3.0.0.zip")
        .with_body("v3")
        .create_async()
        .await;
    let _v2 = server
        .mock("GET", "/dl/firmware-rak4631-2.0.0.zip")
        .with_body("v2")
        .create_async()
        .await;

    let firmware = firmware_dir(&temp_dir);
    std::fs::create_dir_all(firmware.join("v1.0.0")).unwrap();
    std::fs::write(firmware.join("v1.0.0").join("old.zip"), b"old").unwrap();
    std::fs::create_dir_all(firmware.join("notes")).unwrap();
    std::fs::create_dir_all(firmware.join("v1-backup")).unwrap();

    let orchestrator = Orchestrator::new(create_test_config(&server, &temp_dir)).unwrap();
    let outcome = orchestrator.run_download_pipeline().await.unwrap();
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);

    assert!(!firmware.join("v1.0.0").exists());
    assert!(firmware.join("notes").is_dir());
    assert!(firmware.join("v1-backup").is_dir());
    assert!(firmware.join("v3.0.0").join("firmware-rak4631-3.0.0.zip").is_file());
    assert!(firmware.join("v2.0.0").join("firmware-rak4631-2.0.0.zip").is_file());
}

/// Test that a failing pre-flight gate leaves the mirror untouched
#[tokio::test]
async fn test_preflight_abort_makes_no_requests() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let listing = server
        .mock("GET", FIRMWARE_RELEASES)
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let orchestrator = Orchestrator::new(create_test_config(&server, &temp_dir))
        .unwrap()
        .with_preflight(NeverProceed);
    let outcome = orchestrator.run_download_pipeline().await.unwrap();

    assert!(outcome.aborted);
    assert!(!temp_dir.path().join("mirror").exists());
    assert!(orchestrator.get_download_statistics().summary().contains("aborted"));
    listing.assert_async().await;
}

/// Test that a run cancelled before it starts stops without downloading
#[tokio::test]
async fn test_cancelled_run_stops_early() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let listing = server
        .mock("GET", FIRMWARE_RELEASES)
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let shutdown = Shutdown::new();
    shutdown.trigger();
    let orchestrator =
        Orchestrator::with_shutdown(create_test_config(&server, &temp_dir), shutdown).unwrap();
    let outcome = orchestrator.run_download_pipeline().await.unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.successes.is_empty() && outcome.failures.is_empty());
    assert!(orchestrator.get_download_statistics().cancelled);
    listing.assert_async().await;
}

/// Test that an unreachable listing becomes a failure, not an error
#[tokio::test]
async fn test_listing_failure_reported_in_outcome() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let _listing = server
        .mock("GET", FIRMWARE_RELEASES)
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let orchestrator = Orchestrator::new(create_test_config(&server, &temp_dir)).unwrap();
    let outcome = orchestrator.run_download_pipeline().await.unwrap();

    assert!(!outcome.failures.is_empty());
    assert_eq!(outcome.failures[0].release_tag, "meshtastic/firmware");
    assert!(orchestrator.get_download_statistics().success_rate < 100.0);
}

/// Test that a server error on the first pass is recovered by the retry pass
#[tokio::test]
async fn test_retry_pass_recovers_server_error() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let content = b"firmware zip bytes";
    let releases = json!([{
        "tag_name": "v1.0.0",
        "assets": [asset_json(&server, "firmware-rak4631-1.0.0.zip", content)]
    }]);
    let _releases = mock_releases(&mut server, releases).await;
    // the first mock answers until its expected hit is used up
    let failing = server
        .mock("GET", "/dl/firmware-rak4631-1.0.0.zip")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let recovering = server
        .mock("GET", "/dl/firmware-rak4631-1.0.0.zip")
        .with_body(content)
        .expect(1)
        .create_async()
        .await;

    let mut config = create_test_config(&server, &temp_dir);
    config.pipeline_retries = 1;
    let orchestrator = Orchestrator::new(config).unwrap();
    let outcome = orchestrator.run_download_pipeline().await.unwrap();

    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.retry.passes, 1);
    assert_eq!(outcome.retry.attempted, 1);
    assert_eq!(outcome.retry.recovered, 1);
    assert_eq!(outcome.retry.still_failing, 0);
    assert!(firmware_dir(&temp_dir)
        .join("v1.0.0")
        .join("firmware-rak4631-1.0.0.zip")
        .is_file());

    failing.assert_async().await;
    recovering.assert_async().await;
}

/// Test that a missing asset is reported once and never retried
#[tokio::test]
async fn test_client_error_not_retried() {
    let mut server = Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();

    let releases = json!([{
        "tag_name": "v1.0.0",
        "assets": [asset_json(&server, "firmware-rak4631-1.0.0.zip", b"gone")]
    }]);
    let _releases = mock_releases(&mut server, releases).await;
    let missing = server
        .mock("GET", "/dl/firmware-rak4631-1.0.0.zip")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let mut config = create_test_config(&server, &temp_dir);
    config.pipeline_retries = 1;
    let orchestrator = Orchestrator::new(config).unwrap();
    let outcome = orchestrator.run_download_pipeline().await.unwrap();

    assert_eq!(outcome.failures.len(), 1);
    assert!(!outcome.failures[0].retryable);
    assert_eq!(outcome.retry, RetryReport::default());
    missing.assert_async().await;
}
