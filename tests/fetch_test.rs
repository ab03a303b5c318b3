use std::{sync::Arc, time::Duration};

use tileflow::{
    ExecutionMode, TaskExecutor,
    resources::{AssetFetcher, HttpHeaders, url::path_to_file_url},
};

use crate::common::test_utils::{init_logger, temp_dir};

mod common;

fn fetcher(mode: ExecutionMode) -> AssetFetcher {
    AssetFetcher::new(Arc::new(TaskExecutor::new(mode)), Duration::from_secs(5))
}

#[test]
fn missing_local_file_is_a_404_with_an_empty_payload() {
    init_logger();
    let dir = temp_dir("fetch-missing");
    let path = dir.join("nothing-here.b3dm");
    let fetcher = fetcher(ExecutionMode::Synchronous);

    let request = futures::executor::block_on(fetcher.get(&path.to_string_lossy(), HttpHeaders::new()));
    assert_eq!(request.method, "GET");
    assert_eq!(request.response.status, 404);
    assert!(request.response.data.is_empty());

    let error = futures::executor::block_on(fetcher.fetch(&path_to_file_url(&path))).unwrap_err();
    assert_eq!(error.status, 404);
    assert!(error.is_not_found());
}

#[test]
fn local_files_are_read_with_a_content_type_from_the_extension() {
    init_logger();
    let dir = temp_dir("fetch-content-type");
    std::fs::write(dir.join("tileset.json"), br#"{"asset":{}}"#).unwrap();
    std::fs::write(dir.join("tile.b3dm"), b"b3dm").unwrap();
    let fetcher = fetcher(ExecutionMode::Queued);

    let json = futures::executor::block_on(fetcher.get(&dir.join("tileset.json").to_string_lossy(), HttpHeaders::new()));
    assert_eq!(json.response.status, 200);
    assert_eq!(json.response.content_type, "application/json");
    assert_eq!(json.response.data, br#"{"asset":{}}"#);

    let tile = futures::executor::block_on(fetcher.fetch(&path_to_file_url(&dir.join("tile.b3dm"))));
    assert_eq!(tile.unwrap(), b"b3dm");
    let tile = futures::executor::block_on(fetcher.get(&dir.join("tile.b3dm").to_string_lossy(), HttpHeaders::new()));
    assert_eq!(tile.response.content_type, "application/octet-stream");
}

#[test]
fn percent_encoded_file_urls_are_decoded() {
    init_logger();
    let dir = temp_dir("fetch-percent");
    let path = dir.join("tile 100%.glb");
    std::fs::write(&path, b"glTF").unwrap();

    let url = path_to_file_url(&path);
    assert!(url.contains("tile%20100%25.glb"), "{}", url);
    let data = futures::executor::block_on(fetcher(ExecutionMode::Synchronous).fetch(&url));
    assert_eq!(data.unwrap(), b"glTF");
}

#[test]
fn relative_urls_resolve_against_the_base_url() {
    init_logger();
    let dir = temp_dir("fetch-relative");
    std::fs::create_dir_all(dir.join("tiles")).unwrap();
    std::fs::write(dir.join("tiles").join("0.b3dm"), b"content").unwrap();

    let fetcher = fetcher(ExecutionMode::Synchronous);
    fetcher.set_base_url(&dir.to_string_lossy()).unwrap();
    assert!(fetcher.base_url().unwrap().ends_with('/'));

    let data = futures::executor::block_on(fetcher.fetch("tiles/0.b3dm"));
    assert_eq!(data.unwrap(), b"content");
    assert!(fetcher.set_base_url("relative/dir").is_err());
}

#[test]
fn transport_failures_have_status_zero() {
    init_logger();
    let fetcher = fetcher(ExecutionMode::Queued);
    // Nothing listens on the discard port of the loopback interface.
    let request = futures::executor::block_on(fetcher.get("http://127.0.0.1:9/tile.b3dm", HttpHeaders::new()));
    assert_eq!(request.response.status, 0);
    assert!(request.response.text().starts_with("Network error"));
    assert_eq!(fetcher.base_url().as_deref(), Some("http://127.0.0.1:9/"));
}

#[test]
fn requests_after_shutdown_are_discarded() {
    init_logger();
    let executor = Arc::new(TaskExecutor::new(ExecutionMode::Queued));
    let fetcher = AssetFetcher::new(executor.clone(), Duration::from_secs(5));
    executor.shutdown();
    let request = futures::executor::block_on(fetcher.get("/does/not/matter.glb", HttpHeaders::new()));
    assert_eq!(request.response.status, 0);
    assert_eq!(request.url, "/does/not/matter.glb");
}
