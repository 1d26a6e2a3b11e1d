use crate::cache::entity::InstrumentInfo;

/// # Summary
/// 合约元数据只读查询接口 (Port)。
///
/// # Invariants
/// - 查询为纯内存操作，不触发 IO，可在摄取热路径上调用。
/// - 数据的加载与刷新由外部协作方负责。
pub trait InstrumentLookup: Send + Sync {
    /// # Summary
    /// 按合约代码查询。
    ///
    /// # Returns
    /// 存在则返回合约信息的克隆。
    fn get(&self, instrument_id: &str) -> Option<InstrumentInfo>;

    /// # Summary
    /// 查询合约是否为期货。
    ///
    /// # Logic
    /// 1. 基于 `get` 结果读取 `is_future` 字段。
    ///
    /// # Returns
    /// 未知合约返回 None。
    fn is_future(&self, instrument_id: &str) -> Option<bool> {
        self.get(instrument_id).map(|info| info.is_future)
    }

    /// 查询合约所属交易所
    fn exchange_of(&self, instrument_id: &str) -> Option<String> {
        self.get(instrument_id).map(|info| info.exchange_id)
    }
}
