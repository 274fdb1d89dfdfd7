mod common;

use std::sync::Arc;
use std::time::Duration;

use offline_cache_engine::engine::precache::fetch_all;
use offline_cache_engine::source::traits::Network;
use offline_cache_engine::storage::{CacheStorage, MemoryCacheStorage};
use offline_cache_engine::{AgentError, CacheManager, DeleteMode, Request, Response};

use common::{FlakyStorage, StubNetwork};

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

async fn storage_with(names: &[&str]) -> Arc<MemoryCacheStorage> {
    let storage = Arc::new(MemoryCacheStorage::new());
    for name in names {
        storage.open(name).await.unwrap();
    }
    storage
}

#[tokio::test]
async fn test_delete_include_listed_is_default() {
    assert_eq!(DeleteMode::default(), DeleteMode::IncludeListed);

    let storage = storage_with(&["v1", "v2", "v3"]).await;
    let manager = CacheManager::new(storage.clone());

    let report = manager
        .delete_generations(&ids(&["v1", "v3", "v9"]), DeleteMode::default())
        .await
        .unwrap();

    assert_eq!(report.deleted, ids(&["v1", "v3"]));
    assert!(report.is_clean());
    assert_eq!(manager.list_generation_ids().await.unwrap(), ids(&["v2"]));
}

#[tokio::test]
async fn test_delete_all_except() {
    let storage = storage_with(&["v1", "v2", "v3"]).await;
    let manager = CacheManager::new(storage.clone());

    let report = manager.delete_all_except(&ids(&["v2"])).await.unwrap();

    assert_eq!(report.deleted, ids(&["v1", "v3"]));
    assert_eq!(manager.list_generation_ids().await.unwrap(), ids(&["v2"]));
}

#[tokio::test]
async fn test_delete_reports_individual_failures() {
    let storage = FlakyStorage::new();
    for name in ["v1", "v2", "v3"] {
        storage.open(name).await.unwrap();
    }
    storage.refuse_delete("v2");
    let manager = CacheManager::new(storage.clone());

    let report = manager
        .delete_generations(&ids(&["v3"]), DeleteMode::ExcludeListed)
        .await
        .unwrap();

    assert_eq!(report.deleted, ids(&["v1"]));
    assert!(!report.is_clean());
    assert_eq!(report.failed[0].0, "v2");
    assert_eq!(manager.list_generation_ids().await.unwrap(), ids(&["v2", "v3"]));
}

#[tokio::test]
async fn test_add_entry_creates_generation() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let manager = CacheManager::new(storage.clone());

    manager
        .add_entry("v1", Request::get("/a"), Response::ok("A"))
        .await
        .unwrap();

    assert_eq!(storage.entry_count("v1"), Some(1));
    let hit = manager.match_request(&Request::get("/a")).await.unwrap();
    assert_eq!(hit.body, "A");
}

#[tokio::test]
async fn test_cache_fetched_response_stores_a_copy() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let manager = CacheManager::new(storage.clone());

    let response = Response::ok("payload").with_header("content-type", "text/plain");
    let store = manager.cache_fetched_response("v1", Request::get("/p"), &response);
    store.await.unwrap();

    // The original is still ours to hand out.
    assert_eq!(response.body, "payload");
    let stored = manager.match_request(&Request::get("/p")).await.unwrap();
    assert_eq!(stored.body, response.body);
    assert_eq!(stored.header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn test_create_generation_preserves_item_order() {
    let storage = Arc::new(MemoryCacheStorage::new());
    let manager = CacheManager::new(storage.clone());
    let network = StubNetwork::with_routes([("/c", "C"), ("/a", "A"), ("/b", "B")]);
    let items = ids(&["/c", "/a", "/b"]);

    manager
        .create_generation("v1", &items, network.clone() as Arc<dyn Network>, 2)
        .await
        .unwrap();

    let cache = storage.open("v1").await.unwrap();
    let keys: Vec<String> = cache
        .keys()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(keys, items);
    assert_eq!(network.calls(), 3);
}

#[tokio::test]
async fn test_create_generation_fails_when_store_fails() {
    let storage = FlakyStorage::new();
    storage.fail_puts(true);
    let manager = CacheManager::new(storage.clone());
    let network = StubNetwork::with_routes([("/a", "A")]);

    let result = manager
        .create_generation("v1", &ids(&["/a"]), network as Arc<dyn Network>, 4)
        .await;

    assert!(result.is_err());
    assert!(!storage.has("v1").await.unwrap());
}

#[tokio::test]
async fn test_disabled_manager_is_a_no_op() {
    let manager = CacheManager::unavailable();
    let network = StubNetwork::with_routes([("/a", "A")]);

    assert!(!manager.is_enabled());
    assert!(manager.list_generation_ids().await.unwrap().is_empty());
    manager
        .create_generation("v1", &ids(&["/a"]), network.clone() as Arc<dyn Network>, 4)
        .await
        .unwrap();
    manager
        .add_entry("v1", Request::get("/a"), Response::ok("A"))
        .await
        .unwrap();
    assert!(manager.match_request(&Request::get("/a")).await.is_none());
    let report = manager
        .delete_generations(&ids(&["v1"]), DeleteMode::IncludeListed)
        .await
        .unwrap();
    assert!(report.deleted.is_empty());
    assert_eq!(network.calls(), 0);
}

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{}", prefix, i)).collect()
}

#[tokio::test]
async fn test_eager_fetch_respects_concurrency_bound() {
    let network = StubNetwork::new();
    let items = numbered("/img/", 10);
    for item in &items {
        network.serve(item, "x");
    }
    network.set_latency(Duration::from_millis(20));

    let entries = fetch_all(network.clone(), &items, 3).await.unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(network.calls(), 10);
    assert!(network.peak_in_flight() <= 3, "peak {}", network.peak_in_flight());
    assert!(network.peak_in_flight() > 1, "fetches never overlapped");
}

#[tokio::test]
async fn test_eager_fetch_failure_cancels_the_rest() {
    let network = StubNetwork::new();
    let mut items = vec!["/broken.js".to_string()];
    items.extend(numbered("/slow/", 8));
    for item in &items[1..] {
        network.serve(item, "x");
        network.delay(item, Duration::from_secs(5));
    }
    network.fail("/broken.js");

    let started = std::time::Instant::now();
    let err = fetch_all(network.clone(), &items, 2).await.unwrap_err();

    match err {
        AgentError::Fetch { key, .. } => assert_eq!(key, "/broken.js"),
        other => panic!("expected the failing fetch, got {:?}", other),
    }
    // Only the failing fetch ran to the end; queued items never started.
    assert_eq!(network.completed(), 1);
    assert!(network.calls() < items.len());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_eager_fetch_reports_bad_status_over_cancellations() {
    let network = StubNetwork::new();
    let items = numbered("/slow/", 4);
    for item in &items {
        network.serve(item, "x");
        network.delay(item, Duration::from_secs(5));
    }
    network.serve_status("/gone.css", 410, "gone");
    let mut with_bad = items.clone();
    with_bad.push("/gone.css".to_string());

    // Wide enough that every slow fetch is already in flight when the bad one lands.
    let err = fetch_all(network.clone(), &with_bad, 8).await.unwrap_err();

    assert!(
        matches!(err, AgentError::BadStatus { ref key, status: 410 } if key == "/gone.css"),
        "got {:?}",
        err
    );
    assert_eq!(network.calls(), 5);
    assert_eq!(network.completed(), 1);
}
