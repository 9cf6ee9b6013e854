//! End-to-end archive downloads over HTTP

mod common;

use archivist::server::ArchiveServer;
use archivist::storage::DirectoryResolver;
use archivist::subprocess::{MockArchiveLauncher, MockStep, TokioArchiveLauncher};
use common::{fast_transfer, wait_for, zip_available, StorageBuilder, TestServer};
use piz::ZipArchive;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

fn vacation_storage() -> tempfile::TempDir {
    StorageBuilder::new()
        .unwrap()
        .with_file("vacation2021/beach.jpg", "sand and sea\n")
        .with_file("vacation2021/sunset.jpg", "orange sky\n")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_download_real_zip_archive() {
    if !zip_available() {
        eprintln!("Skipping: zip is not installed");
        return;
    }
    let storage = vacation_storage();
    let server = TestServer::for_storage(storage.path(), Arc::new(TokioArchiveLauncher::zip()))
        .await
        .unwrap();

    let response = reqwest::get(server.url("/archive/vacation2021/"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"vacation2021.zip\""
    );
    let bytes = response.bytes().await.unwrap();

    let archive = ZipArchive::new(&bytes).unwrap();
    let mut files = BTreeMap::new();
    for entry in archive.entries().iter().filter(|entry| entry.is_file()) {
        let mut content = String::new();
        archive
            .read(entry)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        files.insert(entry.path.as_str().to_string(), content);
    }

    let expected = BTreeMap::from([
        ("vacation2021/beach.jpg".to_string(), "sand and sea\n".to_string()),
        ("vacation2021/sunset.jpg".to_string(), "orange sky\n".to_string()),
    ]);
    assert_eq!(files, expected);
}

#[tokio::test]
async fn test_route_without_trailing_slash() {
    let storage = vacation_storage();
    let launcher = MockArchiveLauncher::new(vec![MockStep::Data(b"PK".to_vec())]);
    let server = TestServer::for_storage(storage.path(), Arc::new(launcher.clone()))
        .await
        .unwrap();

    let response = reqwest::get(server.url("/archive/vacation2021"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"PK");

    let history = launcher.get_call_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].archive_name(), "vacation2021");
    assert_eq!(
        history[0].working_dir().canonicalize().unwrap(),
        storage.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn test_missing_archive_is_not_found() {
    let storage = vacation_storage();
    let launcher = MockArchiveLauncher::default();
    let server = TestServer::for_storage(storage.path(), Arc::new(launcher.clone()))
        .await
        .unwrap();

    let response = reqwest::get(server.url("/archive/doesnotexist/"))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert_eq!(
        response.text().await.unwrap(),
        "Archive does not exist or was deleted"
    );
    assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test]
async fn test_empty_and_malformed_identifiers_are_not_found() {
    let storage = vacation_storage();
    let launcher = MockArchiveLauncher::default();
    let server = TestServer::for_storage(storage.path(), Arc::new(launcher.clone()))
        .await
        .unwrap();

    for path in ["/archive/", "/archive", "/archive/..%2Fvacation2021/", "/archive/.hidden/"] {
        let response = reqwest::get(server.url(path)).await.unwrap();
        assert_eq!(response.status(), 404, "{path}");
    }
    assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test]
async fn test_launch_failure_is_server_error() {
    let storage = vacation_storage();
    let server = TestServer::for_storage(storage.path(), Arc::new(MockArchiveLauncher::failing()))
        .await
        .unwrap();

    let response = reqwest::get(server.url("/archive/vacation2021/"))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn test_sequential_requests_get_identical_bytes() {
    let storage = vacation_storage();
    let payload: Vec<u8> = (0..=255u8).cycle().take(50_000).collect();
    let launcher = MockArchiveLauncher::new(vec![MockStep::Data(payload.clone())]);
    let server = TestServer::for_storage(storage.path(), Arc::new(launcher.clone()))
        .await
        .unwrap();

    let first = reqwest::get(server.url("/archive/vacation2021/"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let second = reqwest::get(server.url("/archive/vacation2021/"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    assert_eq!(first.as_ref(), payload.as_slice());
    assert_eq!(first, second);
    assert_eq!(launcher.launch_count(), 2);
    assert!(launcher.launched_stats().iter().all(|stats| stats.is_stopped()));
}

#[tokio::test]
async fn test_failure_mid_stream_truncates_body() {
    let storage = vacation_storage();
    let launcher = MockArchiveLauncher::new(vec![
        MockStep::Data(b"PK\x03\x04 partial".to_vec()),
        MockStep::Fail(12),
    ]);
    let server = TestServer::for_storage(storage.path(), Arc::new(launcher.clone()))
        .await
        .unwrap();

    let response = reqwest::get(server.url("/archive/vacation2021/"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(
        response.bytes().await.is_err(),
        "a failed archive must not look complete to the client"
    );
    assert!(wait_for(Duration::from_secs(2), || launcher.launched_stats()[0].is_stopped()).await);
}

#[tokio::test]
async fn test_client_disconnect_stops_archiver() {
    let storage = vacation_storage();
    let launcher = MockArchiveLauncher::new(vec![MockStep::Data(vec![0u8; 8 * 1024 * 1024])]);
    let server = ArchiveServer::with_parts(
        Arc::new(DirectoryResolver::new(storage.path())),
        Arc::new(launcher.clone()),
        archivist::transfer::TransferSettings {
            chunk_size: 4096,
            delay: Duration::from_millis(5),
        },
    );
    let server = TestServer::spawn(server).await.unwrap();

    let mut response = reqwest::get(server.url("/archive/vacation2021/"))
        .await
        .unwrap();
    assert!(response.chunk().await.unwrap().is_some());
    drop(response);

    let stats = Arc::clone(&launcher.launched_stats()[0]);
    assert!(
        wait_for(Duration::from_secs(10), || stats.is_stopped()).await,
        "archiver kept running after the client went away"
    );
    assert!(stats.bytes_read() < 8 * 1024 * 1024);
}

#[tokio::test]
async fn test_debug_index_page_only_in_debug_mode() {
    let storage = vacation_storage();
    let templates = StorageBuilder::new()
        .unwrap()
        .with_file("index.html", "<h1>archivist</h1>")
        .build()
        .unwrap();

    let plain = TestServer::for_storage(storage.path(), Arc::new(MockArchiveLauncher::default()))
        .await
        .unwrap();
    assert_eq!(reqwest::get(plain.url("/")).await.unwrap().status(), 404);

    let debug = ArchiveServer::with_parts(
        Arc::new(DirectoryResolver::new(storage.path())),
        Arc::new(MockArchiveLauncher::default()),
        fast_transfer(),
    )
    .with_debug_index(templates.path().to_path_buf());
    let debug = TestServer::spawn(debug).await.unwrap();

    let response = reqwest::get(debug.url("/")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<h1>archivist</h1>");
}
