mod intake;
mod logging;
mod settings;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tickstore_cache::MemInstrumentCache;
use tickstore_core::common::time::{RealTimeProvider, TimeProvider};
use tickstore_core::config::AppConfig;
use tickstore_core::market::port::SessionBoundary;
use tickstore_core::store::port::BatchWriter;
use tickstore_market::{KLineBuilder, MarketRecorder};
use tickstore_store::csv::{KLineCsvStorage, StorageOptions, TickCsvStorage};
use tickstore_store::failure::FailureHandler;
use tickstore_store::schema::{KLineSchema, TickSchema};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// # Summary
/// 应用启动入口，纯粹的组装根。
///
/// # Logic
/// 1. 加载配置并初始化日志。
/// 2. 实例化失败处理器与两个 CSV 存储引擎，启动周期刷盘。
/// 3. 组装 K 线合成器、合约过滤与行情记录器。
/// 4. 启动失败重试与过期清理的周期任务。
/// 5. 从标准输入读取 tick，直到输入结束或收到退出信号。
/// 6. 停止周期任务，结束时段、关闭存储，输出最终统计。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 配置与日志
    let config = settings::load_from(&settings::config_path())?;
    let _log_guard = logging::init(&config.log)?;
    info!("Tickstore starting...");

    // 2. 存储层
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);
    let failures = Arc::new(FailureHandler::new(
        config.storage.failure_dir.clone(),
        clock,
    ));
    failures.initialize().await?;

    let options = StorageOptions::from(&config.storage);
    let ticks = Arc::new(TickCsvStorage::new(
        TickSchema::new(config.storage.extra_columns.clone()),
        config.storage.tick_path.clone(),
        options.clone(),
        failures.clone(),
    ));
    let klines = Arc::new(KLineCsvStorage::new(
        KLineSchema,
        config.storage.kline_path.clone(),
        options,
        failures.clone(),
    ));
    ticks.initialize().await?;
    klines.initialize().await?;

    let flush_interval = Duration::from_secs(config.storage.flush_interval_secs);
    ticks.spawn_flusher(flush_interval);
    klines.spawn_flusher(flush_interval);

    // 3. 领域层
    let mut recorder = MarketRecorder::new(ticks.clone());
    if config.kline.enabled {
        recorder = recorder.with_builder(Arc::new(KLineBuilder::new(
            klines.clone(),
            config.kline.parsed_periods()?,
        )));
    }
    if let Some(cache_path) = &config.instruments.cache_path {
        let cache = Arc::new(MemInstrumentCache::new());
        match cache.load_from_file(Path::new(cache_path)).await {
            Ok(_) => {
                recorder = recorder.with_instruments(cache, config.instruments.futures_only);
            }
            Err(e) => warn!("Instrument cache unavailable, no filtering: {}", e),
        }
    }
    let recorder = Arc::new(recorder);

    // 4. 失败重试与清理
    let writers: Vec<Arc<dyn BatchWriter>> = {
        let tick_writer: Arc<dyn BatchWriter> = ticks.clone();
        let kline_writer: Arc<dyn BatchWriter> = klines.clone();
        vec![tick_writer, kline_writer]
    };
    let shutdown = CancellationToken::new();
    let maintenance = spawn_maintenance(
        &config,
        failures.clone(),
        writers.clone(),
        ticks.clone(),
        klines.clone(),
        recorder.builder().cloned(),
        shutdown.clone(),
    );
    let signals = spawn_signal_listener(shutdown.clone());

    // 5. 行情输入
    info!("Reading ticks from stdin. Waiting for signals...");
    intake::run(BufReader::new(tokio::io::stdin()), &recorder, &shutdown).await;

    // 6. 收尾
    shutdown.cancel();
    signals.abort();
    if let Err(e) = maintenance.await {
        warn!("Maintenance task ended abnormally: {}", e);
    }
    match recorder.end_session().await {
        Ok(count) => info!("Completed {} open bars at shutdown", count),
        Err(e) => warn!("Some bars were not stored at shutdown: {}", e),
    }
    ticks.close().await;
    klines.close().await;

    let report = failures.retry_all(&writers).await;
    let failure_stats = failures.stats().await;
    info!(
        "Tickstore stopped. ticks: {:?}, klines: {:?}, recorder: {:?}, last retry: {:?}, failures: {:?}",
        ticks.stats(),
        klines.stats(),
        recorder.stats(),
        report,
        failure_stats
    );
    Ok(())
}

/// # Summary
/// 等待退出信号，收到后通知所有任务停止。
fn spawn_signal_listener(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received."),
            Err(e) => error!("Unable to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    })
}

/// # Summary
/// 周期任务：重试失败批次、清理过期失败文件、输出健康统计。
///
/// # Logic
/// 1. 停止信号只在两轮之间检查，进行中的重试总会完成。
fn spawn_maintenance(
    config: &AppConfig,
    failures: Arc<FailureHandler>,
    writers: Vec<Arc<dyn BatchWriter>>,
    ticks: Arc<TickCsvStorage>,
    klines: Arc<KLineCsvStorage>,
    builder: Option<Arc<KLineBuilder>>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(config.failure.retry_interval_secs);
    let retention = chrono::Duration::days(config.failure.retention_days.into());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            failures.retry_all(&writers).await;
            failures.cleanup(retention).await;

            let failure_stats = failures.stats().await;
            info!(
                "Health: ticks {:?}, klines {:?}, failures pending {} (oldest {:?})",
                ticks.stats(),
                klines.stats(),
                failure_stats.pending_total(),
                failure_stats.oldest_age
            );
            if let Some(builder) = &builder {
                info!("Health: builder {:?}", builder.stats());
            }
        }
    })
}
