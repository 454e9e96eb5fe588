use anyhow::Result;
use resilient_fetch::circuit_breaker::{CircuitBreakerConfig, CircuitState};
use resilient_fetch::fetcher::{FetchResult, Fetcher};
use resilient_fetch::outcome::FailureKind;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

mod common;

static FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_path(prefix: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "{}_{}_{}.{}",
        prefix,
        std::process::id(),
        FILE_COUNTER.fetch_add(1, Ordering::SeqCst),
        extension
    ))
}

// Helper function to create a temporary file with one line per entry
async fn create_test_url_file(lines: &[String]) -> Result<PathBuf> {
    let test_file = temp_path("test_urls", "txt");
    let mut file = File::create(&test_file).await?;
    for line in lines {
        file.write_all(format!("{}\n", line).as_bytes()).await?;
    }
    file.flush().await?;
    Ok(test_file)
}

fn test_fetcher(breaker: CircuitBreakerConfig) -> Fetcher {
    Fetcher::new(common::test_client(common::fast_retry_config(), breaker), 4)
}

#[tokio::test]
async fn test_fetch_success_carries_body() -> Result<()> {
    let backend = common::start_mock_backend(200, r#"{"id":1,"name":"Pilot","episode":"S01E01"}"#).await;
    let fetcher = test_fetcher(CircuitBreakerConfig::default());

    let result = fetcher.fetch(&backend.url("/api/episode/1")).await;

    assert!(result.is_success());
    assert_eq!(result.status, Some(200));
    assert_eq!(result.dependency, format!("{}/episode", backend.addr));
    assert_eq!(result.body.unwrap()["episode"], "S01E01");
    assert!(!result.degraded);
    Ok(())
}

#[tokio::test]
async fn test_fetch_invalid_url_never_touches_network() -> Result<()> {
    let fetcher = test_fetcher(CircuitBreakerConfig::default());

    let result = fetcher.fetch("not a url").await;

    assert!(!result.is_success());
    assert_eq!(result.failure, Some(FailureKind::InvalidUrl));
    assert!(!result.degraded);
    assert!(result.dependency.is_empty());
    assert!(result.error.unwrap().starts_with("invalid URL"));
    assert!(fetcher.client().breakers().snapshot().is_empty());

    let rejected = fetcher.fetch("ftp://rickandmortyapi.com/api/character").await;
    assert_eq!(rejected.failure, Some(FailureKind::InvalidUrl));
    let json = serde_json::to_value(&rejected)?;
    assert_eq!(json["failure"]["kind"], "invalid_url");
    Ok(())
}

#[tokio::test]
async fn test_fetch_degrades_when_circuit_is_open() -> Result<()> {
    let backend = common::start_mock_backend(503, "down").await;
    let breaker = CircuitBreakerConfig::default()
        .with_failure_threshold(2)
        .with_open_duration(Duration::from_secs(60));
    let fetcher = test_fetcher(breaker);
    let url = backend.url("/api/character/5");

    for _ in 0..2 {
        let result = fetcher.fetch(&url).await;
        assert_eq!(result.failure, Some(FailureKind::HttpStatus(503)));
        assert_eq!(result.status, Some(503));
        assert!(!result.degraded);
    }
    let hits_before = backend.hit_count();
    assert_eq!(hits_before, 6);

    let result = fetcher.fetch(&url).await;
    assert!(result.degraded);
    assert_eq!(result.failure, Some(FailureKind::CircuitOpen));
    assert_eq!(backend.hit_count(), hits_before);

    let dependency = format!("{}/character", backend.addr);
    assert_eq!(
        fetcher.client().breakers().state_of(&dependency),
        CircuitState::Open
    );
    Ok(())
}

#[tokio::test]
async fn test_fetch_collection_returns_results() -> Result<()> {
    let backend = common::start_mock_backend(
        200,
        r#"{"info":{"count":2,"next":null},"results":[{"id":1},{"id":2}]}"#,
    )
    .await;
    let fetcher = test_fetcher(CircuitBreakerConfig::default());

    let items = fetcher.fetch_collection(&backend.url("/api/episode")).await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["id"], 2);
    Ok(())
}

#[tokio::test]
async fn test_fetch_collection_degrades_to_empty() -> Result<()> {
    let failing = common::start_mock_backend(500, "boom").await;
    let no_results = common::start_mock_backend(200, r#"{"info":{}}"#).await;
    let fetcher = test_fetcher(CircuitBreakerConfig::default());

    assert!(fetcher.fetch_collection(&failing.url("/api/episode")).await.is_empty());
    assert!(fetcher.fetch_collection(&no_results.url("/api/episode")).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_process_batch_writes_json_lines() -> Result<()> {
    let good = common::start_mock_backend(200, r#"{"id":1}"#).await;
    let missing = common::start_mock_backend(404, r#"{"error":"not found"}"#).await;
    let fetcher = test_fetcher(CircuitBreakerConfig::default());

    let lines = vec![
        "# characters to check".to_string(),
        good.url("/api/character/1"),
        String::new(),
        missing.url("/api/character/9999"),
        good.url("/api/character/2"),
    ];
    let input_file = create_test_url_file(&lines).await?;
    let output_file = temp_path("test_results", "jsonl");

    let processed = fetcher
        .process_batch(&input_file, Some(&output_file), 2)
        .await?;
    assert_eq!(processed, 3);

    let content = fs::read_to_string(&output_file)?;
    let results: Vec<serde_json::Value> = content
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(results.len(), 3);

    let failed: Vec<_> = results.iter().filter(|r| !r["error"].is_null()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["url"], missing.url("/api/character/9999"));
    assert_eq!(failed[0]["failure"]["kind"], "http_status");
    assert_eq!(failed[0]["failure"]["status"], 404);

    fs::remove_file(input_file)?;
    fs::remove_file(output_file)?;
    Ok(())
}

#[tokio::test]
async fn test_process_batch_missing_input_file() -> Result<()> {
    let fetcher = test_fetcher(CircuitBreakerConfig::default());
    let missing = temp_path("does_not_exist", "txt");

    let result = fetcher.process_batch(&missing, None, 10).await;

    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_fetch_result_serializes_failure_kind() -> Result<()> {
    let result = FetchResult {
        url: "https://rickandmortyapi.com/api/location/1".to_string(),
        dependency: "rickandmortyapi.com/location".to_string(),
        status: None,
        body: None,
        processing_time_ms: 3,
        error: Some("timeout: attempt 1 exceeded 7s".to_string()),
        failure: Some(FailureKind::Timeout),
        degraded: false,
    };

    let json = serde_json::to_value(&result)?;
    assert_eq!(json["failure"]["kind"], "timeout");
    assert_eq!(json["dependency"], "rickandmortyapi.com/location");
    Ok(())
}
