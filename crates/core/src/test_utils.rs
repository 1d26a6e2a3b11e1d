//! 跨 crate 测试共享的内存实现。

use crate::market::entity::{KLineBar, TickRecord};
use crate::store::error::StoreError;
use crate::store::port::{KLineSink, TickSink};
use async_trait::async_trait;
use std::sync::Mutex;

/// # Summary
/// 收集所有投递 K 线的内存 Sink。
#[derive(Default)]
pub struct MemKLineSink {
    bars: Mutex<Vec<KLineBar>>,
}

impl MemKLineSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已收到的 K 线快照（按投递顺序）
    pub fn bars(&self) -> Vec<KLineBar> {
        self.bars.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl KLineSink for MemKLineSink {
    async fn store_kline(&self, bar: KLineBar) -> Result<usize, StoreError> {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        bars.push(bar);
        Ok(bars.len())
    }
}

/// # Summary
/// 收集所有 tick 的内存 Sink。
#[derive(Default)]
pub struct MemTickSink {
    ticks: Mutex<Vec<TickRecord>>,
}

impl MemTickSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> Vec<TickRecord> {
        self.ticks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TickSink for MemTickSink {
    async fn store_tick(&self, tick: TickRecord) -> Result<usize, StoreError> {
        let mut ticks = self.ticks.lock().unwrap_or_else(|e| e.into_inner());
        ticks.push(tick);
        Ok(ticks.len())
    }
}

/// # Summary
/// 始终拒绝的 K 线 Sink，用于验证下游失败不会破坏合成状态。
pub struct RejectingKLineSink;

#[async_trait]
impl KLineSink for RejectingKLineSink {
    async fn store_kline(&self, bar: KLineBar) -> Result<usize, StoreError> {
        Err(StoreError::InvalidTarget(format!(
            "rejected {} {}",
            bar.instrument_id, bar.period
        )))
    }
}
