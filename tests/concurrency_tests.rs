use futures::future::join_all;
use rustfiledb::{Record, RecordMeta, Store, StoreConfig, impl_record};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    #[serde(flatten)]
    meta: RecordMeta,
    sensor: u64,
    value: f64,
}

impl_record!(Reading, meta, sensor: u64);

fn reading(sensor: u64, value: f64) -> Reading {
    Reading {
        meta: RecordMeta::new(),
        sensor,
        value,
    }
}

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new("sensors", dir.path()).table_for::<Reading>()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_leave_well_formed_file() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir)).await.unwrap();

    let tasks = (1..=40u64).map(|sensor| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut r = reading(sensor, sensor as f64 * 0.5);
            store.upsert_one(&mut r, false).await;
            store.get_all::<Reading>(false).await.len()
        })
    });
    for seen in join_all(tasks).await {
        assert!(seen.unwrap() >= 1);
    }

    let path = store.table_path::<Reading>();
    let on_disk: Vec<Reading> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk.len(), 40);
    assert_eq!(store.get_all::<Reading>(false).await.len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_upserts_of_same_key_collapse() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir)).await.unwrap();

    let mut seed = reading(1, 0.0);
    store.upsert_one(&mut seed, false).await;

    let tasks = (1..=20).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut r = reading(1, i as f64);
            store.upsert_one(&mut r, false).await;
            r.id()
        })
    });
    for id in join_all(tasks).await {
        assert_eq!(id.unwrap(), seed.id());
    }

    let all = store.get_all::<Reading>(true).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id(), seed.id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_reads_writes_and_releases() {
    let dir = TempDir::new().unwrap();
    let store = Store::open(config(&dir).tick_period(Duration::from_millis(5)).idle_time(0))
        .await
        .unwrap();

    let writers = (1..=10u64).map(|sensor| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut batch: Vec<Reading> =
                (0..5).map(|i| reading(sensor * 100 + i, i as f64)).collect();
            store.upsert_many(&mut batch, false).await;
        })
    });
    let releasers = (0..5).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            store.release_table_memory::<Reading>().await;
            tokio::time::sleep(Duration::from_millis(3)).await;
        })
    });

    for result in join_all(writers).await {
        result.unwrap();
    }
    for result in join_all(releasers).await {
        result.unwrap();
    }

    // whatever interleaving happened, nothing written was lost
    assert_eq!(store.get_all::<Reading>(false).await.len(), 50);
    store.release_all().await;
}
