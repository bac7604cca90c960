//! End-to-end tests of workload runs against fault-injecting stores.
//!
//! All tests run on a paused clock, so rate limiting and write latency are simulated and the
//! measured durations are exact multiples of the configured intervals.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use btwrite::config::Config;
use btwrite::{Error, RunConfig};
use btwrite_store::{InMemoryStore, Provisioned, SharedStore};
use btwrite_test::store::TestStore;

fn run_config(range: &str, rps: u32, records: usize, threads: usize) -> RunConfig {
    Config {
        cidr: range.to_owned(),
        rps,
        records,
        threads,
        seed: Some(7),
        ..Default::default()
    }
    .run_config()
    .unwrap()
}

async fn provisioned(store: TestStore) -> Result<(TestStore, SharedStore)> {
    btwrite::provision(&store).await?;
    let shared: SharedStore = Arc::new(store.clone());
    Ok((store, shared))
}

#[tokio::test]
async fn provisions_once() -> Result<()> {
    let store = InMemoryStore::new();
    assert_eq!(btwrite::provision(&store).await?, Provisioned::Created);
    assert_eq!(btwrite::provision(&store).await?, Provisioned::Existing);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn writes_every_record_once() -> Result<()> {
    btwrite_test::tracing::init();
    let (store, shared) = provisioned(TestStore::new()).await?;

    let report = btwrite::run(shared, &run_config("10.0.0.0/24", 1000, 500, 8)).await?;

    assert_eq!(report.samples(), 500);
    assert_eq!(store.attempts(), 500);
    assert_eq!(store.inner().total_writes(), 500);
    let total: i64 = store.inner().counters().values().sum();
    assert_eq!(total, 500);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn paces_writes_to_the_rate_limit() -> Result<()> {
    let (store, shared) = provisioned(TestStore::new()).await?;

    // 10 writes at 100/s: the first slot opens immediately, the last one after 9 intervals.
    let report = btwrite::run(shared, &run_config("10.0.0.0/8", 100, 10, 2)).await?;

    assert_eq!(report.samples(), 10);
    assert!(report.elapsed() >= Duration::from_millis(90), "{report:?}");
    assert!(report.elapsed() < Duration::from_millis(150), "{report:?}");
    assert_eq!(store.inner().total_writes(), 10);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rate_limit_is_shared_by_all_workers() -> Result<()> {
    let store = TestStore::new().with_latency(Duration::from_millis(20));
    let (_store, shared) = provisioned(store).await?;

    // More workers than writes per interval must not raise the aggregate rate.
    let report = btwrite::run(shared, &run_config("10.0.0.0/8", 100, 20, 16)).await?;

    assert_eq!(report.samples(), 20);
    assert!(report.elapsed() >= Duration::from_millis(190), "{report:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn keys_stay_within_the_range() -> Result<()> {
    let (store, shared) = provisioned(TestStore::new()).await?;

    btwrite::run(shared, &run_config("10.0.0.0/30", 1000, 100, 4)).await?;

    let counters = store.inner().counters();
    let keys: BTreeSet<_> = counters.keys().map(String::as_str).collect();
    assert!(
        keys.is_subset(&BTreeSet::from(["10.0.0.1", "10.0.0.2"])),
        "{keys:?}"
    );
    assert_eq!(counters.values().sum::<i64>(), 100);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn opens_one_connection_per_worker() -> Result<()> {
    let (store, shared) = provisioned(TestStore::new()).await?;

    btwrite::run(shared, &run_config("10.0.0.0/16", 1000, 10, 4)).await?;

    assert_eq!(store.inner().connections(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_workload_succeeds() -> Result<()> {
    let (store, shared) = provisioned(TestStore::new()).await?;

    let report = btwrite::run(shared, &run_config("10.0.0.0/8", 1000, 0, 3)).await?;

    assert_eq!(report.samples(), 0);
    assert_eq!(report.mean(), None);
    assert_eq!(store.attempts(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timestamped_keys() -> Result<()> {
    let (store, shared) = provisioned(TestStore::new()).await?;
    let config = RunConfig {
        timestamped_keys: true,
        ..run_config("192.168.0.0/30", 1000, 5, 1)
    };

    btwrite::run(shared, &config).await?;

    for row_key in store.inner().counters().keys() {
        let (ip, timestamp) = row_key.split_once('#').unwrap();
        assert!(ip == "192.168.0.1" || ip == "192.168.0.2", "{row_key}");
        assert!(timestamp.parse::<i64>()? > 0, "{row_key}");
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn first_failed_write_aborts_the_run() {
    btwrite_test::tracing::init();
    let store = TestStore::new()
        .with_latency(Duration::from_millis(1))
        .fail_on_write(5);
    let (store, shared) = provisioned(store).await.unwrap();

    let err = btwrite::run(shared, &run_config("10.0.0.0/8", 100, 50, 3))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Write { .. }), "{err:?}");
    // Writes stop right after the failure instead of draining the queue.
    assert!(store.attempts() < 10, "{}", store.attempts());
    assert!(store.inner().total_writes() < 50);
}

#[tokio::test(start_paused = true)]
async fn failed_connection_aborts_the_run() {
    let (store, shared) = provisioned(TestStore::new().fail_connect())
        .await
        .unwrap();

    let err = btwrite::run(shared, &run_config("10.0.0.0/8", 1000, 10, 2))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connect { .. }), "{err:?}");
    assert_eq!(store.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_writes_time_out() {
    let store = TestStore::new().with_latency(Duration::from_millis(50));
    let (_store, shared) = provisioned(store).await.unwrap();
    let config = RunConfig {
        write_timeout: Some(Duration::from_millis(10)),
        ..run_config("10.0.0.0/8", 1000, 10, 2)
    };

    let err = btwrite::run(shared, &config).await.unwrap_err();

    assert!(
        matches!(err, Error::WriteTimeout { timeout, .. } if timeout == Duration::from_millis(10)),
        "{err:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn writes_require_a_provisioned_table() {
    let store: SharedStore = Arc::new(TestStore::new());

    let err = btwrite::run(store, &run_config("10.0.0.0/8", 1000, 10, 2))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Write { .. }), "{err:?}");
}
