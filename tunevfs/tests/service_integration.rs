//! Integration tests for the VFS service and scanner.
//!
//! These tests exercise the public API over a real directory tree:
//! - Bootstrap from configuration with all roots registered
//! - Listing, parents, search and file queries through the dispatcher
//! - Background scans through directories, archives and playlists
//!
//! Run with: `cargo test --test service_integration`

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use url::Url;

use tunevfs::blob::BlobCache;
use tunevfs::config::ConfigFile;
use tunevfs::decoder::{ProbeDecoder, PROPERTY_TITLE};
use tunevfs::operation::{EngineConfig, QueryResult, Row};
use tunevfs::scanner::{ScanEvent, ScanSummary};
use tunevfs::vfs::root_uri;
use tunevfs::{Identifier, Request, VfsService};

// ============================================================================
// Helper Functions
// ============================================================================

/// Minimal ProTracker 3 header carrying `title`.
fn pt3(title: &str) -> Vec<u8> {
    let mut data = vec![b' '; 0x70];
    let signature = b"ProTracker 3.5 compilation of ";
    data[..signature.len()].copy_from_slice(signature);
    data[0x1e..0x1e + title.len()].copy_from_slice(title.as_bytes());
    data
}

/// Minimal PSID header with `songs` songs.
fn psid(title: &str, songs: u16) -> Vec<u8> {
    let mut data = vec![0u8; 0x7c];
    data[..4].copy_from_slice(b"PSID");
    data[0x0e..0x10].copy_from_slice(&songs.to_be_bytes());
    data[0x16..0x16 + title.len()].copy_from_slice(title.as_bytes());
    data
}

fn zip(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in members {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn uri_of(path: &Path) -> Url {
    Url::from_file_path(path).unwrap()
}

/// Music library used by most tests:
///
/// ```text
/// music/
///   Demo/
///     intro.pt3
///   pack.zip       (b.pt3, a.pt3)
///   best.ayl       (-> Demo/intro.pt3, solo.pt3)
///   solo.pt3
/// ```
fn library(root: &Path) -> std::path::PathBuf {
    let music = root.join("music");
    fs::create_dir_all(music.join("Demo")).unwrap();
    fs::write(music.join("Demo").join("intro.pt3"), pt3("Intro")).unwrap();
    fs::write(
        music.join("pack.zip"),
        zip(&[("b.pt3", pt3("Zip B")), ("a.pt3", pt3("Zip A"))]),
    )
    .unwrap();
    fs::write(
        music.join("best.ayl"),
        "ZX Spectrum Sound Chip Emulator Play List File v1.\r\nDemo\\intro.pt3\r\nsolo.pt3\r\n",
    )
    .unwrap();
    fs::write(music.join("solo.pt3"), pt3("Solo")).unwrap();
    music
}

fn service(cache: &Path) -> VfsService {
    VfsService::builder()
        .with_local_root()
        .with_blob_cache(Arc::new(BlobCache::new(cache).with_min_size(1)))
        .with_engine_config(EngineConfig::default().with_initial_wait(Duration::from_secs(10)))
        .build()
        .unwrap()
}

async fn finished(result: QueryResult) -> Vec<Row> {
    match result {
        QueryResult::Finished(rows) => rows,
        other => panic!("expected finished result, got {:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_bootstrap_from_config() {
    let temp = TempDir::new().unwrap();
    let mut config = ConfigFile::default();
    config.cache.directory = temp.path().join("cache");

    let service = VfsService::from_config(&config).unwrap();
    assert!(config.database_path("zxart").exists());
    assert!(config.database_path("zxtunes").exists());
    assert!(!config.database_path("modarchive").exists());

    let rows = finished(service.list(&root_uri()).await).await;
    let uris: Vec<_> = rows.iter().filter_map(Row::uri).collect();
    assert_eq!(uris.len(), 3);
    assert_eq!(uris[0], "file:///");
    assert!(uris.iter().any(|uri| uri.starts_with("zxart:")));
    assert!(uris.iter().any(|uri| uri.starts_with("zxtunes:")));
    service.shutdown();
}

#[tokio::test]
async fn test_bootstrap_with_modarchive_key() {
    let temp = TempDir::new().unwrap();
    let mut config = ConfigFile::default();
    config.cache.directory = temp.path().join("cache");
    config.catalog.modarchive_key = "key".to_string();

    let service = VfsService::from_config(&config).unwrap();
    assert!(config.database_path("modarchive").exists());

    let rows = finished(service.list(&root_uri()).await).await;
    let uris: Vec<_> = rows.iter().filter_map(Row::uri).collect();
    assert_eq!(uris.len(), 4);
    assert!(uris.iter().any(|uri| *uri == "modarchive:/"));
    service.shutdown();
}

#[tokio::test]
async fn test_browse_library() {
    let temp = TempDir::new().unwrap();
    let music = library(temp.path());
    let service = service(&temp.path().join("cache"));

    let rows = finished(service.list(&uri_of(&music)).await).await;
    let names: Vec<_> = rows.iter().filter_map(Row::name).collect();
    assert_eq!(names, vec!["Demo", "best.ayl", "pack.zip", "solo.pt3"]);

    let archive = finished(service.list(&uri_of(&music.join("pack.zip"))).await).await;
    let names: Vec<_> = archive.iter().filter_map(Row::name).collect();
    assert_eq!(names, vec!["a.pt3", "b.pt3"]);

    let chain = finished(service.parents(&uri_of(&music.join("Demo").join("intro.pt3"))).await).await;
    assert_eq!(chain.first().and_then(Row::uri), Some("root:/"));
    assert_eq!(chain.last().and_then(Row::name), Some("intro.pt3"));
}

#[tokio::test]
async fn test_search_and_fetch() {
    let temp = TempDir::new().unwrap();
    let music = library(temp.path());
    let service = service(&temp.path().join("cache"));

    let rows = finished(service.search(&uri_of(&music), "INTRO").await).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name(), Some("intro.pt3"));
    assert_eq!(rows[1], Row::EndOfResults);

    let member = Url::parse(&format!("{}#a.pt3", uri_of(&music.join("pack.zip")))).unwrap();
    let rows = finished(service.query(&Request::file(member.clone())).await).await;
    let [Row::Content { size, path: Some(path), .. }] = rows.as_slice() else {
        panic!("expected one content row, got {:?}", rows);
    };
    assert_eq!(*size, pt3("Zip A").len() as u64);
    assert_eq!(fs::read(path).unwrap(), pt3("Zip A"));
}

#[tokio::test]
async fn test_scan_library() {
    let temp = TempDir::new().unwrap();
    let music = library(temp.path());
    let service = service(&temp.path().join("cache"));

    let scanner = service.scanner(Arc::new(ProbeDecoder::new()));
    let mut handle = scanner.spawn(vec![Identifier::from_url(uri_of(&music))], 2);

    let mut titles = Vec::new();
    let summary: ScanSummary = loop {
        match handle.recv().await.expect("stream ends with Finished") {
            ScanEvent::Module { module, .. } => titles.push(module.property(PROPERTY_TITLE, "")),
            ScanEvent::Error { id, message } => panic!("unexpected error at {}: {}", id, message),
            ScanEvent::Finished(summary) => break summary,
        }
    };

    // Subdirectories first, then files in name order, playlists expanded in place
    assert_eq!(
        titles,
        vec!["Intro", "Intro", "Solo", "Zip A", "Zip B", "Solo"]
    );
    assert_eq!(summary.modules, 6);
    assert!(!summary.cancelled);
    assert_eq!(service.archives().opens(), 1);
}

#[tokio::test]
async fn test_scanned_song_resolves_and_opens() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("songs.sid");
    fs::write(&path, psid("Songs", 3)).unwrap();
    let service = service(&temp.path().join("cache"));

    let scanner = service.scanner(Arc::new(ProbeDecoder::new()));
    let mut handle = scanner.spawn(vec![Identifier::from_url(uri_of(&path))], 4);
    let mut songs = Vec::new();
    loop {
        match handle.recv().await.expect("stream ends with Finished") {
            ScanEvent::Module { id, .. } => songs.push(id),
            ScanEvent::Error { id, message } => panic!("unexpected error at {}: {}", id, message),
            ScanEvent::Finished(_) => break,
        }
    }
    assert_eq!(songs.len(), 3);
    let second = songs[1].full().clone();
    assert_eq!(songs[1].subpath(), "#2");

    let rows = finished(service.resolve(&second).await).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].uri(), Some(second.as_str()));

    let rows = finished(service.file(&second).await).await;
    assert!(matches!(rows.as_slice(), [Row::Content { size: 0x7c, .. }]));

    let mut content = Vec::new();
    service
        .open_file(&second)
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, psid("Songs", 3));
}
