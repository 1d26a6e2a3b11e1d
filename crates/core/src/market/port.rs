use crate::market::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// 交易时段边界契约，由外部的时段/调度协作方调用。
///
/// # Invariants
/// - 核心内部从不依据墙钟推断收盘，交易日历不规则，收盘只能由外部显式通知。
/// - 调用后所有进行中的 K 线被完成并投递，槽位清空。
#[async_trait]
pub trait SessionBoundary: Send + Sync {
    /// # Summary
    /// 结束当前交易时段。
    ///
    /// # Logic
    /// 1. 完成所有至少包含一笔 tick 的进行中 K 线。
    /// 2. 将它们投递给 K 线存储。
    /// 3. 清空内部状态，等待下一时段的首笔 tick。
    ///
    /// # Returns
    /// 投递的 K 线数量。
    async fn end_session(&self) -> Result<usize, MarketError>;
}
