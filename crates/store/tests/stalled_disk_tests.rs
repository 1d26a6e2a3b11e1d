#![cfg(unix)]

use anyhow::Result;
use chrono::DateTime;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use tickstore_core::common::time::RealTimeProvider;
use tickstore_core::market::entity::TickRecord;
use tickstore_core::store::entity::DataType;
use tickstore_core::store::port::TickSink;
use tickstore_store::csv::{FlushOutcome, StorageOptions, TickCsvStorage};
use tickstore_store::failure::FailureHandler;
use tickstore_store::schema::{TickKey, TickSchema};

// 以命名管道代替 CSV 文件：没有读端时，以写方式打开会一直阻塞，模拟卡死的磁盘。

const DAY: &str = "20251223";

fn tick(instrument: &str, ms: u32) -> TickRecord {
    TickRecord {
        timestamp: DateTime::parse_from_rfc3339(&format!("2025-12-23T09:00:00.{:03}+08:00", ms))
            .unwrap(),
        trading_day: DAY.into(),
        instrument_id: instrument.into(),
        last_price: dec!(3500.0),
        volume: 1,
        turnover: dec!(35000.0),
        open_interest: dec!(100),
        bids: vec![],
        asks: vec![],
        extra: BTreeMap::new(),
    }
}

fn key(instrument: &str) -> TickKey {
    TickKey {
        trading_day: DAY.into(),
        instrument_id: instrument.into(),
    }
}

fn setup(
    dir: &Path,
    batch_size: usize,
    flush_timeout: Duration,
) -> (Arc<FailureHandler>, Arc<TickCsvStorage>) {
    let failures = Arc::new(FailureHandler::new(
        dir.join("failures"),
        Arc::new(RealTimeProvider),
    ));
    let options = StorageOptions {
        batch_size,
        max_flush_attempts: 3,
        flush_timeout,
        ..StorageOptions::default()
    };
    let storage = Arc::new(TickCsvStorage::new(
        TickSchema::default(),
        dir.join("ticks"),
        options,
        failures.clone(),
    ));
    (failures, storage)
}

fn make_fifo(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let status = std::process::Command::new("mkfifo").arg(path).status()?;
    anyhow::ensure!(status.success(), "mkfifo {} failed", path.display());
    Ok(())
}

/// 打开读端，让阻塞在打开写端的后台线程结束
async fn release_fifo(path: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut reader = std::fs::File::open(&path)?;
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink)?;
        Ok(())
    })
    .await??;
    Ok(())
}

async fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    done()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_record_does_not_wait_for_a_stalled_file() -> Result<()> {
    let dir = tempdir()?;
    let (failures, storage) = setup(dir.path(), 1, Duration::from_secs(2));
    storage.initialize().await?;
    let stalled = storage.path_of(&key("rb2605"));
    make_fifo(&stalled)?;
    storage.spawn_flusher(Duration::from_secs(3600));

    let started = Instant::now();
    storage.store_tick(tick("rb2605", 0)).await?;
    storage.store_tick(tick("hc2605", 1)).await?;
    assert!(started.elapsed() < Duration::from_millis(500));

    assert!(wait_for(|| storage.stats().total_written_rows == 1).await);
    assert!(storage.path_of(&key("hc2605")).exists());

    assert!(wait_for(|| storage.stats().persisted_batches == 1).await);
    assert_eq!(
        failures.stats().await.pending.get(&DataType::Tick),
        Some(&1)
    );
    release_fifo(stalled).await?;
    storage.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_write_goes_straight_to_failure_handler() -> Result<()> {
    let dir = tempdir()?;
    let (failures, storage) = setup(dir.path(), 100, Duration::from_millis(300));
    let stalled = storage.path_of(&key("rb2605"));
    make_fifo(&stalled)?;

    storage.store_tick(tick("rb2605", 0)).await?;
    storage.store_tick(tick("rb2605", 1)).await?;
    // 超时不走重新入队，即使尚未达到最大尝试次数
    assert_eq!(
        storage.flush(&key("rb2605")).await?,
        FlushOutcome::Persisted(2)
    );

    let stats = storage.stats();
    assert_eq!(stats.buffered_rows, 0);
    assert_eq!(stats.requeued_batches, 0);
    assert_eq!(stats.persisted_batches, 1);
    let failure_stats = failures.stats().await;
    assert_eq!(failure_stats.pending_total(), 1);
    assert_eq!(failure_stats.save_count, 1);
    assert_eq!(std::fs::read_dir(failures.dir())?.count(), 1);

    release_fifo(stalled).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_flush_returns_batch_to_buffer() -> Result<()> {
    let dir = tempdir()?;
    let (failures, storage) = setup(dir.path(), 100, Duration::from_secs(30));
    let stalled = storage.path_of(&key("rb2605"));
    make_fifo(&stalled)?;

    storage.store_tick(tick("rb2605", 0)).await?;
    storage.store_tick(tick("rb2605", 1)).await?;
    let cancelled =
        tokio::time::timeout(Duration::from_millis(200), storage.flush(&key("rb2605"))).await;
    assert!(cancelled.is_err());

    let stats = storage.stats();
    assert_eq!(stats.buffered_rows, 2);
    assert_eq!(stats.persisted_batches, 0);
    assert_eq!(failures.stats().await.pending_total(), 0);

    // 磁盘恢复后，被取消的批次照常写入
    release_fifo(stalled.clone()).await?;
    std::fs::remove_file(&stalled)?;
    assert_eq!(
        storage.flush(&key("rb2605")).await?,
        FlushOutcome::Written(2)
    );
    let lines = std::fs::read_to_string(&stalled)?;
    assert_eq!(lines.lines().count(), 3);
    assert!(lines.contains("09:00:00.000+08:00"));
    assert!(lines.contains("09:00:00.001+08:00"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_waits_for_in_flight_flush() -> Result<()> {
    let dir = tempdir()?;
    let (failures, storage) = setup(dir.path(), 100, Duration::from_millis(500));
    storage.initialize().await?;
    let stalled = storage.path_of(&key("rb2605"));
    make_fifo(&stalled)?;
    storage.spawn_flusher(Duration::from_millis(20));

    storage.store_tick(tick("rb2605", 0)).await?;
    // 后台刷盘已开始并卡在打开文件上
    tokio::time::sleep(Duration::from_millis(150)).await;
    storage.close().await;

    let stats = storage.stats();
    assert!(!stats.running);
    assert_eq!(stats.buffered_rows, 0);
    assert_eq!(stats.persisted_batches, 1);
    assert_eq!(failures.stats().await.pending_total(), 1);

    release_fifo(stalled).await?;
    Ok(())
}
