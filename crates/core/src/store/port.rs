use super::entity::{DataType, TargetKey};
use super::error::StoreError;
use crate::market::entity::{KLineBar, TickRecord};
use async_trait::async_trait;

/// # Summary
/// Tick 落盘接口。
///
/// # Invariants
/// - 实现者只缓冲不阻塞，从不在调用方任务内等待磁盘 IO；达到批量阈值只会唤醒后台刷盘。
/// - IO 失败不得向调用方传播，只允许返回记录本身不合法一类的错误。
#[async_trait]
pub trait TickSink: Send + Sync {
    /// # Summary
    /// 接收一笔 tick 并放入写缓冲。
    ///
    /// # Returns
    /// 成功返回该键当前的缓冲行数。
    async fn store_tick(&self, tick: TickRecord) -> Result<usize, StoreError>;
}

/// # Summary
/// 已完成 K 线的落盘接口，由 K 线合成器在窗口翻转时调用。
///
/// # Invariants
/// - 每根完成的 K 线只投递一次。
#[async_trait]
pub trait KLineSink: Send + Sync {
    /// # Summary
    /// 接收一根已完成的 K 线。
    ///
    /// # Returns
    /// 成功返回该键当前的缓冲行数。
    async fn store_kline(&self, bar: KLineBar) -> Result<usize, StoreError>;
}

/// # Summary
/// 已渲染数据行的直接写入接口，供失败重试使用。
///
/// # Invariants
/// - 写入路径与正常刷盘一致（含表头判断与超时控制）。
#[async_trait]
pub trait BatchWriter: Send + Sync {
    /// 该写入器负责的数据类别
    fn data_type(&self) -> DataType;

    /// # Summary
    /// 将数据行一次性追加写入目标文件。
    ///
    /// # Arguments
    /// * `target`: 目标定位。
    /// * `rows`: 已渲染的数据行。
    ///
    /// # Returns
    /// 全部写入成功返回 Ok。
    async fn write_rows(&self, target: &TargetKey, rows: &[String]) -> Result<(), StoreError>;
}
