use anyhow::Result;
use chrono::DateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tickstore_cache::MemInstrumentCache;
use tickstore_core::cache::entity::InstrumentInfo;
use tickstore_core::common::KLinePeriod;
use tickstore_core::common::time::RealTimeProvider;
use tickstore_core::market::entity::TickRecord;
use tickstore_core::market::port::SessionBoundary;
use tickstore_core::test_utils::{MemKLineSink, MemTickSink};
use tickstore_market::{KLineBuilder, MarketRecorder};
use tickstore_store::csv::{KLineCsvStorage, StorageOptions, TickCsvStorage};
use tickstore_store::failure::FailureHandler;
use tickstore_store::schema::{KLineSchema, TickSchema};

fn tick(instrument: &str, time: &str, price: Decimal, volume: u64) -> TickRecord {
    TickRecord {
        timestamp: DateTime::parse_from_rfc3339(&format!("2025-12-23T{}+08:00", time)).unwrap(),
        trading_day: "20251223".into(),
        instrument_id: instrument.into(),
        last_price: price,
        volume,
        turnover: Decimal::from(volume) * price * dec!(10),
        open_interest: dec!(1200),
        bids: vec![],
        asks: vec![],
        extra: Default::default(),
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_end_to_end_minute_bar_written_on_rollover() -> Result<()> {
    let dir = tempdir()?;
    let failures = Arc::new(FailureHandler::new(
        dir.path().join("failures"),
        Arc::new(RealTimeProvider),
    ));
    let ticks = Arc::new(TickCsvStorage::new(
        TickSchema::default(),
        dir.path().join("ticks"),
        StorageOptions::default(),
        failures.clone(),
    ));
    let klines = Arc::new(KLineCsvStorage::new(
        KLineSchema,
        dir.path().join("klines"),
        StorageOptions::default(),
        failures,
    ));
    let builder = Arc::new(KLineBuilder::new(
        klines.clone(),
        vec![KLinePeriod::Minute1],
    ));
    let recorder = MarketRecorder::new(ticks.clone()).with_builder(builder.clone());

    recorder
        .on_tick(tick("rb2605", "09:00:00.100", dec!(3500.0), 10))
        .await?;
    recorder
        .on_tick(tick("rb2605", "09:00:00.900", dec!(3501.0), 12))
        .await?;
    recorder
        .on_tick(tick("rb2605", "09:00:15.200", dec!(3499.0), 15))
        .await?;
    assert_eq!(builder.stats().total_bars, 0);

    recorder
        .on_tick(tick("rb2605", "09:01:00.050", dec!(3502.0), 16))
        .await?;
    assert_eq!(builder.stats().total_bars, 1);

    klines.close().await;
    ticks.close().await;

    let bars = read_lines(
        &dir.path()
            .join("klines")
            .join("20251223")
            .join("1m")
            .join("rb2605.csv"),
    );
    assert_eq!(bars.len(), 2);
    let cells: Vec<&str> = bars[1].split(',').collect();
    assert_eq!(cells[0], "2025-12-23T09:00:00+08:00");
    assert_eq!(&cells[1..5], &["3500.0", "3501.0", "3499.0", "3499.0"]);
    assert_eq!(cells[5], "15");
    assert_eq!(cells[8], "3");

    let tick_lines = read_lines(&dir.path().join("ticks").join("20251223").join("rb2605.csv"));
    assert_eq!(tick_lines.len(), 5);

    // 时段结束后最后一根 K 线才落盘
    assert_eq!(recorder.end_session().await?, 1);
    klines.close().await;
    let bars = read_lines(
        &dir.path()
            .join("klines")
            .join("20251223")
            .join("1m")
            .join("rb2605.csv"),
    );
    assert_eq!(bars.len(), 3);
    assert!(bars[2].starts_with("2025-12-23T09:01:00+08:00,3502.0"));
    Ok(())
}

#[tokio::test]
async fn test_non_futures_are_filtered_and_unknown_pass() -> Result<()> {
    let cache = Arc::new(MemInstrumentCache::new());
    cache.insert(InstrumentInfo {
        instrument_id: "m2605-C-3000".into(),
        instrument_name: "豆粕期权".into(),
        exchange_id: "DCE".into(),
        product_id: "m_o".into(),
        volume_multiple: 10,
        price_tick: dec!(0.5),
        expire_date: "20260408".into(),
        is_trading: true,
        is_future: false,
    });

    let ticks = Arc::new(MemTickSink::new());
    let klines = Arc::new(MemKLineSink::new());
    let builder = Arc::new(KLineBuilder::new(klines, vec![KLinePeriod::Minute1]));
    let recorder = MarketRecorder::new(ticks.clone())
        .with_builder(builder.clone())
        .with_instruments(cache, true);

    recorder
        .on_tick(tick("m2605-C-3000", "09:00:01", dec!(55.5), 1))
        .await?;
    recorder
        .on_tick(tick("rb2605", "09:00:01", dec!(3500.0), 1))
        .await?;

    assert_eq!(ticks.ticks().len(), 1);
    assert_eq!(ticks.ticks()[0].instrument_id, "rb2605");
    assert!(builder.current_bar("m2605-C-3000", KLinePeriod::Minute1).is_none());
    let stats = recorder.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.stored, 1);
    Ok(())
}

#[tokio::test]
async fn test_malformed_tick_still_reaches_tick_storage() -> Result<()> {
    let ticks = Arc::new(MemTickSink::new());
    let builder = Arc::new(KLineBuilder::new(
        Arc::new(MemKLineSink::new()),
        vec![KLinePeriod::Minute1],
    ));
    let recorder = MarketRecorder::new(ticks.clone()).with_builder(builder.clone());

    let mut bad = tick("rb2605", "09:00:01", dec!(3500.0), 1);
    bad.trading_day = "2025/12/23".into();
    recorder.on_tick(bad).await?;

    assert_eq!(ticks.ticks().len(), 1);
    assert_eq!(recorder.stats().kline_errors, 1);
    assert_eq!(builder.stats().skipped_ticks, 1);
    Ok(())
}

#[tokio::test]
async fn test_recorder_without_builder_ends_session_quietly() -> Result<()> {
    let recorder = MarketRecorder::new(Arc::new(MemTickSink::new()));
    assert!(recorder.builder().is_none());
    assert_eq!(recorder.end_session().await?, 0);
    Ok(())
}
