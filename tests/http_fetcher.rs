//! Integration tests for HttpFetcher and CachedClient.
//!
//! Uses wiremock for HTTP mocking. Covers status mapping, body decoding,
//! auth headers, timeouts and policy behavior against a real SQLite store.

use std::time::Duration;

use cachewise::config::RemoteConfig;
use cachewise::remote::{HttpFetcher, RemoteFetcher};
use cachewise::{CachedClient, Config, FetchError, PolicyKind, Source};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote_config(mock_server: &MockServer, timeout_secs: u64) -> RemoteConfig {
  RemoteConfig {
    base_url: format!("{}/api/", mock_server.uri()),
    timeout_secs,
  }
}

#[tokio::test]
async fn test_fetch_json_body() {
  let mock_server = MockServer::start().await;

  Mock::given(method("GET"))
    .and(path("/api/users/1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ada"})))
    .mount(&mock_server)
    .await;

  let fetcher = HttpFetcher::new(&remote_config(&mock_server, 5), None).unwrap();
  let value = fetcher.fetch("users/1").await.unwrap();

  assert_eq!(value, json!({"name": "ada"}));
}

#[tokio::test]
async fn test_fetch_plain_text_body() {
  let mock_server = MockServer::start().await;

  Mock::given(method("GET"))
    .and(path("/api/motd"))
    .respond_with(ResponseTemplate::new(200).set_body_string("hello there"))
    .mount(&mock_server)
    .await;

  let fetcher = HttpFetcher::new(&remote_config(&mock_server, 5), None).unwrap();
  let value = fetcher.fetch("/motd").await.unwrap();

  assert_eq!(value, json!("hello there"));
}

#[tokio::test]
async fn test_fetch_sends_bearer_token() {
  let mock_server = MockServer::start().await;

  Mock::given(method("GET"))
    .and(path("/api/private"))
    .and(header("authorization", "Bearer test-token"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
    .mount(&mock_server)
    .await;

  let fetcher = HttpFetcher::new(
    &remote_config(&mock_server, 5),
    Some("test-token".to_string()),
  )
  .unwrap();

  assert_eq!(fetcher.fetch("private").await.unwrap(), json!({"ok": true}));
}

#[tokio::test]
async fn test_absolute_key_does_not_send_token_elsewhere() {
  let mock_server = MockServer::start().await;
  let other_server = MockServer::start().await;

  Mock::given(method("GET"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stolen": true})))
    .expect(0)
    .mount(&other_server)
    .await;

  let fetcher = HttpFetcher::new(
    &remote_config(&mock_server, 5),
    Some("test-token".to_string()),
  )
  .unwrap();

  let key = format!("{}/steal", other_server.uri());
  let err = fetcher.fetch(&key).await.unwrap_err();

  assert!(matches!(err, FetchError::Network(_)));
  other_server.verify().await;
}

#[tokio::test]
async fn test_fetch_maps_non_success_status() {
  let mock_server = MockServer::start().await;

  Mock::given(method("GET"))
    .and(path("/api/missing"))
    .respond_with(ResponseTemplate::new(404))
    .mount(&mock_server)
    .await;

  Mock::given(method("GET"))
    .and(path("/api/broken"))
    .respond_with(ResponseTemplate::new(503))
    .mount(&mock_server)
    .await;

  let fetcher = HttpFetcher::new(&remote_config(&mock_server, 5), None).unwrap();

  assert_eq!(
    fetcher.fetch("missing").await.unwrap_err(),
    FetchError::HttpStatus { code: 404 }
  );
  assert_eq!(
    fetcher.fetch("broken").await.unwrap_err(),
    FetchError::HttpStatus { code: 503 }
  );
}

#[tokio::test]
async fn test_fetch_timeout_is_network_error() {
  let mock_server = MockServer::start().await;

  Mock::given(method("GET"))
    .and(path("/api/slow"))
    .respond_with(
      ResponseTemplate::new(200)
        .set_body_json(json!({}))
        .set_delay(Duration::from_secs(3)),
    )
    .mount(&mock_server)
    .await;

  let fetcher = HttpFetcher::new(&remote_config(&mock_server, 1), None).unwrap();
  let err = fetcher.fetch("slow").await.unwrap_err();

  assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
  let mock_server = MockServer::start().await;
  let config = remote_config(&mock_server, 5);
  drop(mock_server);

  let fetcher = HttpFetcher::new(&config, None).unwrap();
  let err = fetcher.fetch("anything").await.unwrap_err();

  assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
}

fn client_config(mock_server: &MockServer, temp_dir: &TempDir, policy: &str) -> Config {
  let yaml = format!(
    "remote:\n  base_url: {}/api/\n  timeout_secs: 5\ndefault_policy: {}\nstorage:\n  backend: sqlite\n  path: {}\n",
    mock_server.uri(),
    policy,
    temp_dir.path().join("cache.db").display()
  );
  Config::from_yaml(&yaml).unwrap()
}

#[tokio::test]
async fn test_prefer_local_fetches_once() {
  let mock_server = MockServer::start().await;
  let temp_dir = TempDir::new().unwrap();

  Mock::given(method("GET"))
    .and(path("/api/settings"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"theme": "dark"})))
    .expect(1)
    .mount(&mock_server)
    .await;

  let client = CachedClient::new(&client_config(&mock_server, &temp_dir, "prefer-local")).unwrap();

  let first = client.get("settings").await;
  let second = client.get("settings").await;

  assert_eq!(first.source, Source::Remote);
  assert!(first.persisted);
  assert_eq!(second.source, Source::Local);
  assert_eq!(second.value, Some(json!({"theme": "dark"})));
  assert_eq!(second.version, Some(1));
}

#[tokio::test]
async fn test_prefer_remote_serves_stale_when_server_fails() {
  let mock_server = MockServer::start().await;
  let temp_dir = TempDir::new().unwrap();

  Mock::given(method("GET"))
    .and(path("/api/feed"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!(["a", "b"])))
    .up_to_n_times(1)
    .mount(&mock_server)
    .await;

  Mock::given(method("GET"))
    .and(path("/api/feed"))
    .respond_with(ResponseTemplate::new(500))
    .mount(&mock_server)
    .await;

  let client = CachedClient::new(&client_config(&mock_server, &temp_dir, "prefer-remote")).unwrap();

  // Seed the store through a versioned read
  let seeded = client.get_versioned("feed", 1).await;
  assert_eq!(seeded.source, Source::Remote);

  let fallback = client.get_with("feed", PolicyKind::PreferRemote).await;
  assert_eq!(fallback.source, Source::Local);
  assert!(fallback.stale);
  assert!(fallback.error.is_none());
  assert_eq!(fallback.value, Some(json!(["a", "b"])));
}

#[tokio::test]
async fn test_local_then_remote_refetches_on_version_bump() {
  let mock_server = MockServer::start().await;
  let temp_dir = TempDir::new().unwrap();

  Mock::given(method("GET"))
    .and(path("/api/catalog"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rev": "x"})))
    .expect(2)
    .mount(&mock_server)
    .await;

  let client =
    CachedClient::new(&client_config(&mock_server, &temp_dir, "local-then-remote")).unwrap();

  assert_eq!(client.get_versioned("catalog", 1).await.source, Source::Remote);
  assert_eq!(client.get_versioned("catalog", 1).await.source, Source::Local);

  let bumped = client.get_versioned("catalog", 2).await;
  assert_eq!(bumped.source, Source::Remote);
  assert_eq!(bumped.version, Some(2));

  // An older expected version is still satisfied by the stored one
  assert_eq!(client.get_versioned("catalog", 1).await.source, Source::Local);
}
