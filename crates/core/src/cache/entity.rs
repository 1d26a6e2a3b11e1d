use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// # Summary
/// 合约静态信息。
///
/// # Invariants
/// - `instrument_id` 在缓存内唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    // 合约代码
    pub instrument_id: String,
    // 合约名称
    #[serde(default)]
    pub instrument_name: String,
    // 交易所代码 (例如: SHFE, DCE)
    pub exchange_id: String,
    // 品种代码 (例如: rb)
    pub product_id: String,
    // 合约乘数
    #[serde(default = "default_multiple")]
    pub volume_multiple: u32,
    // 最小变动价位
    #[serde(default)]
    pub price_tick: Decimal,
    // 到期日
    #[serde(default)]
    pub expire_date: String,
    // 是否可交易
    #[serde(default)]
    pub is_trading: bool,
    // 是否为期货（期权等其他品类为 false）
    pub is_future: bool,
}

fn default_multiple() -> u32 {
    1
}
