use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tickstore_core::common::{KLinePeriod, parse_trading_day};
use tickstore_core::market::entity::{KLineBar, TickRecord};
use tickstore_core::market::error::MarketError;
use tickstore_core::market::port::SessionBoundary;
use tickstore_core::store::port::KLineSink;
use tracing::{debug, info, warn};

/// # Summary
/// 单个合约的合成状态。
///
/// # Invariants
/// - 每个启用周期至多一根进行中的 K 线。
/// - `last_volume`/`last_turnover` 是上一笔 tick 的累计值，只用于计算增量。
#[derive(Debug, Default)]
struct InstrumentState {
    bars: BTreeMap<KLinePeriod, KLineBar>,
    last_volume: Option<u64>,
    last_turnover: Option<Decimal>,
}

impl InstrumentState {
    /// # Summary
    /// 计算相对上一笔 tick 的成交量与成交额增量，并更新基准。
    ///
    /// # Logic
    /// 1. 首笔 tick 没有基准，增量取其原始累计值。
    /// 2. 累计值回落（新时段计数器归零）时同样取原始值，增量永不为负。
    fn deltas(&mut self, tick: &TickRecord) -> (u64, Decimal) {
        let volume = match self.last_volume {
            Some(prev) if tick.volume >= prev => tick.volume - prev,
            _ => tick.volume,
        };
        let turnover = match self.last_turnover {
            Some(prev) if tick.turnover >= prev => tick.turnover - prev,
            _ => tick.turnover,
        };
        self.last_volume = Some(tick.volume);
        self.last_turnover = Some(tick.turnover);
        (volume, turnover)
    }
}

/// # Summary
/// K 线合成器统计快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderStats {
    pub total_ticks: u64,
    // 已完成并投递的 K 线数
    pub total_bars: u64,
    // 因字段不合法被跳过的 tick 数
    pub skipped_ticks: u64,
    // 持有进行中 K 线的合约数
    pub active_instruments: usize,
    // 各周期进行中且至少含一笔 tick 的 K 线数
    pub open_bars: BTreeMap<KLinePeriod, usize>,
    pub enabled_periods: Vec<KLinePeriod>,
}

/// # Summary
/// 流式多周期 K 线合成器。
///
/// # Invariants
/// - K 线只在后续 tick 证明窗口已结束时完成（惰性翻转），内部没有任何定时器。
/// - 时段的最后一根 K 线依赖外部调用 `end_session` 完成。
/// - 单笔 tick 的错误只跳过该 tick，不影响任何进行中的 K 线。
/// - 状态锁只在内存计算期间持有，投递下游前已释放。
pub struct KLineBuilder {
    sink: Arc<dyn KLineSink>,
    periods: Vec<KLinePeriod>,
    instruments: DashMap<String, InstrumentState>,
    total_ticks: AtomicU64,
    total_bars: AtomicU64,
    skipped_ticks: AtomicU64,
}

impl KLineBuilder {
    /// # Summary
    /// 创建合成器。
    ///
    /// # Arguments
    /// * `sink`: 完成 K 线的去向。
    /// * `periods`: 启用的周期；为空时启用全部周期。
    pub fn new(sink: Arc<dyn KLineSink>, periods: Vec<KLinePeriod>) -> Self {
        let mut periods = if periods.is_empty() {
            KLinePeriod::all().to_vec()
        } else {
            periods
        };
        periods.sort();
        periods.dedup();
        info!("KLine builder started with periods {:?}", periods);
        Self {
            sink,
            periods,
            instruments: DashMap::new(),
            total_ticks: AtomicU64::new(0),
            total_bars: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
        }
    }

    pub fn periods(&self) -> &[KLinePeriod] {
        &self.periods
    }

    /// # Summary
    /// 处理一笔 tick，更新该合约全部启用周期的 K 线。
    ///
    /// # Logic
    /// 1. 校验合约代码与交易日，计算每个周期的对齐窗口起点。
    /// 2. 在合约状态锁内：计算量额增量；对每个周期，没有 K 线则开新窗口，
    ///    窗口起点严格晚于当前 K 线则取出旧 K 线并开新窗口，否则并入当前 K 线。
    /// 3. 释放锁后，依次将完成的 K 线交给下游。
    ///
    /// # Arguments
    /// * `tick`: 行情快照。
    ///
    /// # Returns
    /// 本次完成并投递的 K 线数量。字段不合法返回 `MalformedTick`（状态未改动）；
    /// 下游拒绝返回 `Sink`（状态已更新）。
    pub async fn on_tick(&self, tick: &TickRecord) -> Result<usize, MarketError> {
        let windows = match self.windows_of(tick) {
            Ok(windows) => windows,
            Err(e) => {
                self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                warn!("Skipping tick for aggregation: {}", e);
                return Err(e);
            }
        };

        let completed = {
            let mut state = self
                .instruments
                .entry(tick.instrument_id.clone())
                .or_default();
            let (volume_delta, turnover_delta) = state.deltas(tick);

            let mut completed = Vec::new();
            for (period, window_start) in windows {
                let bar = match state.bars.remove(&period) {
                    Some(bar) if window_start > bar.window_start => {
                        completed.push(bar);
                        KLineBar::open_window(tick, period, window_start)
                    }
                    // 乱序 tick 并入当前 K 线
                    Some(bar) => bar,
                    None => KLineBar::open_window(tick, period, window_start),
                };
                let bar = state.bars.entry(period).or_insert(bar);
                bar.apply(tick, volume_delta, turnover_delta);
            }
            completed
        };
        self.total_ticks.fetch_add(1, Ordering::Relaxed);

        self.emit(completed).await
    }

    /// # Summary
    /// 获取某合约某周期进行中 K 线的快照。
    pub fn current_bar(&self, instrument_id: &str, period: KLinePeriod) -> Option<KLineBar> {
        self.instruments
            .get(instrument_id)
            .and_then(|state| state.bars.get(&period).cloned())
    }

    /// # Summary
    /// 生成统计快照。
    pub fn stats(&self) -> BuilderStats {
        let mut open_bars: BTreeMap<KLinePeriod, usize> =
            self.periods.iter().map(|p| (*p, 0)).collect();
        for state in self.instruments.iter() {
            for (period, bar) in &state.bars {
                if bar.tick_count > 0 {
                    *open_bars.entry(*period).or_insert(0) += 1;
                }
            }
        }
        BuilderStats {
            total_ticks: self.total_ticks.load(Ordering::Relaxed),
            total_bars: self.total_bars.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            active_instruments: self
                .instruments
                .iter()
                .filter(|state| !state.bars.is_empty())
                .count(),
            open_bars,
            enabled_periods: self.periods.clone(),
        }
    }

    /// # Summary
    /// 关闭合成器：完成全部进行中的 K 线并输出最终统计。
    pub async fn close(&self) -> Result<usize, MarketError> {
        let flushed = self.end_session().await;
        let stats = self.stats();
        info!(
            "KLine builder closed: {} ticks, {} bars, {} skipped",
            stats.total_ticks, stats.total_bars, stats.skipped_ticks
        );
        flushed
    }

    fn windows_of(
        &self,
        tick: &TickRecord,
    ) -> Result<Vec<(KLinePeriod, DateTime<FixedOffset>)>, MarketError> {
        if tick.instrument_id.is_empty() {
            return Err(MarketError::MalformedTick("missing instrument id".into()));
        }
        let trading_day = parse_trading_day(&tick.trading_day).ok_or_else(|| {
            MarketError::MalformedTick(format!(
                "{}: bad trading day {:?}",
                tick.instrument_id, tick.trading_day
            ))
        })?;
        self.periods
            .iter()
            .map(|period| {
                period
                    .window_start(&tick.timestamp, trading_day)
                    .map(|start| (*period, start))
                    .ok_or_else(|| {
                        MarketError::MalformedTick(format!(
                            "{}: cannot align {} to {}",
                            tick.instrument_id, tick.timestamp, period
                        ))
                    })
            })
            .collect()
    }

    async fn emit(&self, bars: Vec<KLineBar>) -> Result<usize, MarketError> {
        let mut emitted = 0;
        let mut rejected = Vec::new();
        for bar in bars {
            debug!(
                "KLine done: {} {} {} O:{} H:{} L:{} C:{} V:{}",
                bar.instrument_id,
                bar.period,
                bar.window_start,
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            );
            let label = format!("{} {} {}", bar.instrument_id, bar.period, bar.window_start);
            match self.sink.store_kline(bar).await {
                Ok(_) => emitted += 1,
                Err(e) => {
                    warn!("KLine {} rejected by storage: {}", label, e);
                    rejected.push(format!("{}: {}", label, e));
                }
            }
        }
        self.total_bars
            .fetch_add(emitted as u64, Ordering::Relaxed);
        if rejected.is_empty() {
            Ok(emitted)
        } else {
            Err(MarketError::Sink(rejected.join("; ")))
        }
    }
}

#[async_trait]
impl SessionBoundary for KLineBuilder {
    /// # Summary
    /// 完成全部至少含一笔 tick 的进行中 K 线并清空 K 线状态。
    ///
    /// # Invariants
    /// - 量额基准保留：同一交易日的夜盘与日盘共用一组累计计数器。
    async fn end_session(&self) -> Result<usize, MarketError> {
        let mut pending: Vec<KLineBar> = Vec::new();
        for mut state in self.instruments.iter_mut() {
            let bars = std::mem::take(&mut state.bars);
            pending.extend(bars.into_values().filter(|bar| bar.tick_count > 0));
        }
        pending.sort_by(|a, b| {
            (&a.instrument_id, a.period).cmp(&(&b.instrument_id, b.period))
        });

        if !pending.is_empty() {
            info!("Session ended, completing {} open bars", pending.len());
        }
        self.emit(pending).await
    }
}
