use crate::builder::KLineBuilder;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tickstore_core::cache::port::InstrumentLookup;
use tickstore_core::market::entity::TickRecord;
use tickstore_core::market::error::MarketError;
use tickstore_core::market::port::SessionBoundary;
use tickstore_core::store::port::TickSink;
use tracing::{debug, warn};

/// 行情记录器统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub received: u64,
    // 非期货合约被过滤的 tick 数
    pub filtered: u64,
    pub stored: u64,
    pub store_errors: u64,
    pub kline_errors: u64,
}

/// # Summary
/// tick 入口：过滤后同时分发给 tick 存储与 K 线合成器。
///
/// # Invariants
/// - K 线合成失败不影响 tick 落盘，反之亦然。
/// - 未知合约一律放行，只有明确标记为非期货的合约才会被过滤。
pub struct MarketRecorder {
    ticks: Arc<dyn TickSink>,
    builder: Option<Arc<KLineBuilder>>,
    instruments: Option<Arc<dyn InstrumentLookup>>,
    futures_only: bool,
    received: AtomicU64,
    filtered: AtomicU64,
    stored: AtomicU64,
    store_errors: AtomicU64,
    kline_errors: AtomicU64,
}

impl MarketRecorder {
    pub fn new(ticks: Arc<dyn TickSink>) -> Self {
        Self {
            ticks,
            builder: None,
            instruments: None,
            futures_only: false,
            received: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            stored: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            kline_errors: AtomicU64::new(0),
        }
    }

    /// 挂载 K 线合成器
    pub fn with_builder(mut self, builder: Arc<KLineBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// 挂载合约信息查询，`futures_only` 为真时过滤非期货合约
    pub fn with_instruments(
        mut self,
        instruments: Arc<dyn InstrumentLookup>,
        futures_only: bool,
    ) -> Self {
        self.instruments = Some(instruments);
        self.futures_only = futures_only;
        self
    }

    pub fn builder(&self) -> Option<&Arc<KLineBuilder>> {
        self.builder.as_ref()
    }

    /// # Summary
    /// 处理一笔 tick。
    ///
    /// # Logic
    /// 1. 合约被明确标记为非期货且开启过滤时直接丢弃。
    /// 2. 交给 K 线合成器，错误只记录不中断。
    /// 3. 交给 tick 存储。
    ///
    /// # Returns
    /// tick 存储拒绝时返回 `Sink`；K 线侧的错误不会返回。
    pub async fn on_tick(&self, tick: TickRecord) -> Result<(), MarketError> {
        self.received.fetch_add(1, Ordering::Relaxed);

        if self.futures_only
            && let Some(lookup) = &self.instruments
            && lookup.is_future(&tick.instrument_id) == Some(false)
        {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            debug!("Ignoring non-future instrument {}", tick.instrument_id);
            return Ok(());
        }

        if let Some(builder) = &self.builder
            && let Err(e) = builder.on_tick(&tick).await
        {
            self.kline_errors.fetch_add(1, Ordering::Relaxed);
            debug!("KLine update for {} failed: {}", tick.instrument_id, e);
        }

        let instrument = tick.instrument_id.clone();
        match self.ticks.store_tick(tick).await {
            Ok(_) => {
                self.stored.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.store_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Tick of {} rejected by storage: {}", instrument, e);
                Err(MarketError::Sink(e.to_string()))
            }
        }
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            received: self.received.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            kline_errors: self.kline_errors.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SessionBoundary for MarketRecorder {
    async fn end_session(&self) -> Result<usize, MarketError> {
        match &self.builder {
            Some(builder) => builder.end_session().await,
            None => Ok(0),
        }
    }
}
