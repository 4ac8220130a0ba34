/// End-to-end tests of the compile, cache, evaluate, evict pipeline
///
/// Every test starts its own ScriptHost, so hosts never share a cache.
use chrono::{TimeZone, Utc};
use rowscript::config::{CacheConfig, EvaluationConfig, RowscriptConfig};
use rowscript::repository::{
    MemoryRecordRepository, MemoryResultRepository, ResultRepository, ScriptRepository,
};
use rowscript::{Script, ScriptConsumer, ScriptError, ScriptHost, StockQuote};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn quote(id: i64, open: f64, low: f64) -> StockQuote {
    StockQuote {
        id,
        symbol: format!("S{}", id),
        open_price: open,
        high_price: open + 10.0,
        low_price: low,
        close_price: open + 1.0,
        volume: 100 * id,
        market_cap: 1.0e9,
        timestamp: Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap(),
    }
}

fn host(ttl: Option<&str>, timeout: &str) -> ScriptHost {
    ScriptHost::start(RowscriptConfig {
        evaluation: EvaluationConfig {
            timeout: timeout.to_string(),
        },
        cache: CacheConfig {
            ttl: ttl.map(str::to_string),
            sweep_interval: Some("20ms".to_string()),
        },
        ..Default::default()
    })
    .unwrap()
}

fn dataset() -> Arc<MemoryRecordRepository<StockQuote>> {
    Arc::new(
        MemoryRecordRepository::with_records([
            quote(1, 100.0, 90.0),
            quote(2, 50.0, 45.0),
            quote(3, 200.0, 150.0),
        ])
        .unwrap(),
    )
}

#[tokio::test]
async fn test_spread_over_dataset() {
    let host = host(Some("10m"), "10s");
    let scripts = host.script_repository::<StockQuote>();
    let results = Arc::new(MemoryResultRepository::new());
    let service = host.evaluation_service::<StockQuote, _, _>(dataset(), Arc::clone(&results));

    let id = scripts
        .add(Script::new("spread", "return OpenPrice - LowPrice;"))
        .unwrap();
    let script = scripts.get_by_id(id, true).unwrap().unwrap();

    let values = service.evaluate(&script).await.unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[&1], json!(10));
    assert_eq!(values[&2], json!(5));
    assert_eq!(values[&3], json!(50));

    let stored = results.get_all(id).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|row| row.script_id == id));

    // a second run is served from the cache
    service.evaluate(&script).await.unwrap();
    assert_eq!(host.cache().stats().loads, 1);
    assert_eq!(results.get_all(id).unwrap().len(), 6);

    assert_eq!(host.shutdown().await, 1);
}

#[tokio::test]
async fn test_update_reloads_new_source() {
    let host = host(Some("10m"), "10s");
    let scripts = host.script_repository::<StockQuote>();
    let results = Arc::new(MemoryResultRepository::new());
    let service = host.evaluation_service::<StockQuote, _, _>(dataset(), Arc::clone(&results));

    let id = scripts
        .add(Script::new("level", "return round(OpenPrice / 3, 2);"))
        .unwrap();
    let before = scripts.get_by_id(id, true).unwrap().unwrap();
    let values = service.evaluate(&before).await.unwrap();
    assert_eq!(values[&1], json!(33.33));

    let mut edited = before.clone();
    edited.source = "return clamp(ClosePrice, 60, 150);".to_string();
    assert_eq!(scripts.update(edited).unwrap(), 1);
    assert!(!host
        .cache()
        .contains(StockQuote::TYPE_ID, before.script_hash));

    let after = scripts.get_by_id(id, true).unwrap().unwrap();
    let values = service.evaluate(&after).await.unwrap();
    assert_eq!(values[&1], json!(101));
    assert_eq!(values[&2], json!(60));
    assert_eq!(values[&3], json!(150));
    assert_eq!(host.cache().stats().loads, 2);

    host.shutdown().await;
}

#[tokio::test]
async fn test_idle_modules_are_swept() {
    let host = host(Some("50ms"), "10s");
    let scripts = host.script_repository::<StockQuote>();
    let results = Arc::new(MemoryResultRepository::new());
    let service = host.evaluation_service::<StockQuote, _, _>(dataset(), results);

    let id = scripts.add(Script::new("close", "return ClosePrice;")).unwrap();
    let script = scripts.get_by_id(id, true).unwrap().unwrap();
    service.evaluate(&script).await.unwrap();
    assert_eq!(host.cache().len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(host.cache().is_empty());

    // evicted modules are reloaded on demand
    let loads = host.cache().stats().loads;
    service.evaluate(&script).await.unwrap();
    assert!(host.cache().stats().loads > loads);
    assert!(host.cache().stats().evictions >= 1);

    host.shutdown().await;
}

#[tokio::test]
async fn test_disabled_cache_loads_per_record() {
    let host = host(None, "10s");
    let scripts = host.script_repository::<StockQuote>();
    let service = host.evaluation_service::<StockQuote, _, _>(
        dataset(),
        Arc::new(MemoryResultRepository::new()),
    );

    let id = scripts.add(Script::new("vol", "return Volume;")).unwrap();
    let script = scripts.get_by_id(id, true).unwrap().unwrap();
    let values = service.evaluate(&script).await.unwrap();

    assert_eq!(values[&3], json!(300));
    assert_eq!(host.cache().stats().loads, 3);
    assert!(host.cache().is_empty());

    host.shutdown().await;
}

#[tokio::test]
async fn test_runaway_script_times_out_and_persists_nothing() {
    let host = host(Some("10m"), "150ms");
    let scripts = host.script_repository::<StockQuote>();
    let results = Arc::new(MemoryResultRepository::new());
    let service = host.evaluation_service::<StockQuote, _, _>(dataset(), Arc::clone(&results));

    let id = scripts
        .add(Script::new(
            "runaway",
            "if (OpenPrice > 150) { for (;;) {} } return OpenPrice;",
        ))
        .unwrap();
    let script = scripts.get_by_id(id, true).unwrap().unwrap();

    let error = service.evaluate(&script).await.unwrap_err();
    assert!(matches!(error, ScriptError::Timeout { record_id: 3, .. }));
    assert!(results.is_empty());

    host.shutdown().await;
}

#[tokio::test]
async fn test_timestamp_and_dates() {
    let host = host(None, "10s");
    let scripts = host.script_repository::<StockQuote>();
    let service = host.evaluation_service::<StockQuote, _, _>(
        dataset(),
        Arc::new(MemoryResultRepository::new()),
    );

    let id = scripts
        .add(Script::new(
            "year",
            "return { year: Timestamp.getUTCFullYear(), month: Timestamp.getUTCMonth() + 1 };",
        ))
        .unwrap();
    let script = scripts.get_by_id(id, true).unwrap().unwrap();
    let values = service.evaluate(&script).await.unwrap();

    assert_eq!(values[&2], json!({ "year": 2024, "month": 6 }));
    host.shutdown().await;
}
