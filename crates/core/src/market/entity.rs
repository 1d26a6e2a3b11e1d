use crate::common::KLinePeriod;
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 盘口深度档位上限
pub const DEPTH_LEVELS: usize = 5;

/// # Summary
/// 单档盘口报价。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub volume: u64,
}

/// # Summary
/// 交易所透传字段的取值。
///
/// # Invariants
/// - 只有 `Float` 可能携带非有限值，格式化时按单字段失败处理。
/// - 反序列化按 `Int` -> `Float` -> `Text` 的顺序匹配；`Decimal` 仅供程序内构造。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Int(i64),
    Float(f64),
    Text(String),
    Decimal(Decimal),
}

/// # Summary
/// 单个合约在某一时刻的行情快照 (Tick)。
///
/// # Invariants
/// - 由上游网关创建后不再修改。
/// - 数值字段使用十进制精确表示，保留输入时的小数位数。
/// - `bids`/`asks` 至多 `DEPTH_LEVELS` 档，缺失档位落盘为空单元格。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    // 行情时间戳，固定东八区偏移
    pub timestamp: DateTime<FixedOffset>,
    // 交易日 (例如: 20251223)
    pub trading_day: String,
    // 合约代码 (例如: rb2605)
    pub instrument_id: String,
    // 最新价
    pub last_price: Decimal,
    // 当日累计成交量
    pub volume: u64,
    // 当日累计成交额
    pub turnover: Decimal,
    // 持仓量
    pub open_interest: Decimal,
    // 买盘，按档位由优到劣
    #[serde(default)]
    pub bids: Vec<DepthLevel>,
    // 卖盘，按档位由优到劣
    #[serde(default)]
    pub asks: Vec<DepthLevel>,
    // 其余交易所字段，按键名有序
    #[serde(default)]
    pub extra: BTreeMap<String, ExtraValue>,
}

impl TickRecord {
    /// # Summary
    /// 获取指定档位的买盘报价（档位从 0 开始）。
    pub fn bid(&self, level: usize) -> Option<&DepthLevel> {
        self.bids.get(level).filter(|_| level < DEPTH_LEVELS)
    }

    /// # Summary
    /// 获取指定档位的卖盘报价（档位从 0 开始）。
    pub fn ask(&self, level: usize) -> Option<&DepthLevel> {
        self.asks.get(level).filter(|_| level < DEPTH_LEVELS)
    }
}

/// # Summary
/// 某合约某周期在一个对齐窗口内的 K 线聚合。
///
/// # Invariants
/// - `high >= max(open, close)`，`low <= min(open, close)`。
/// - `volume`/`turnover` 为窗口内逐笔增量之和，`open_interest` 为窗口内最后一次观测值。
/// - 进行中的 K 线只由合成器持有，对外仅暴露克隆快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KLineBar {
    // 合约代码
    pub instrument_id: String,
    // 首个 tick 的交易日，决定落盘目录
    pub trading_day: String,
    // 周期
    pub period: KLinePeriod,
    // 窗口起点（对齐后）
    pub window_start: DateTime<FixedOffset>,
    // 开盘价
    pub open: Decimal,
    // 最高价
    pub high: Decimal,
    // 最低价
    pub low: Decimal,
    // 收盘价
    pub close: Decimal,
    // 窗口内成交量增量之和
    pub volume: u64,
    // 窗口内成交额增量之和
    pub turnover: Decimal,
    // 最新持仓量
    pub open_interest: Decimal,
    // 窗口内 tick 数
    pub tick_count: u64,
}

impl KLineBar {
    /// # Summary
    /// 以一笔 tick 的价格开启新窗口。
    ///
    /// # Logic
    /// 1. open/high/low/close 均取最新价。
    /// 2. 成交量、成交额与 tick 计数归零，由随后的 `apply` 计入首笔 tick。
    /// 3. 持仓量取该 tick 的持仓量。
    pub fn open_window(
        tick: &TickRecord,
        period: KLinePeriod,
        window_start: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            instrument_id: tick.instrument_id.clone(),
            trading_day: tick.trading_day.clone(),
            period,
            window_start,
            open: tick.last_price,
            high: tick.last_price,
            low: tick.last_price,
            close: tick.last_price,
            volume: 0,
            turnover: Decimal::ZERO,
            open_interest: tick.open_interest,
            tick_count: 0,
        }
    }

    /// # Summary
    /// 将一笔 tick 计入当前窗口。
    ///
    /// # Arguments
    /// * `tick`: 行情快照。
    /// * `volume_delta`: 相对上一笔的成交量增量（已做非负处理）。
    /// * `turnover_delta`: 相对上一笔的成交额增量（已做非负处理）。
    pub fn apply(&mut self, tick: &TickRecord, volume_delta: u64, turnover_delta: Decimal) {
        self.high = self.high.max(tick.last_price);
        self.low = self.low.min(tick.last_price);
        self.close = tick.last_price;
        self.volume = self.volume.saturating_add(volume_delta);
        self.turnover += turnover_delta;
        self.open_interest = tick.open_interest;
        self.tick_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(price: Decimal, oi: Decimal) -> TickRecord {
        TickRecord {
            timestamp: DateTime::parse_from_rfc3339("2025-12-23T09:30:15.500+08:00").unwrap(),
            trading_day: "20251223".into(),
            instrument_id: "rb2505".into(),
            last_price: price,
            volume: 0,
            turnover: Decimal::ZERO,
            open_interest: oi,
            bids: vec![],
            asks: vec![],
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_bar_apply_tracks_extremes_and_latest_open_interest() {
        let first = tick(dec!(3500.0), dec!(1000));
        let mut bar = KLineBar::open_window(&first, KLinePeriod::Minute1, first.timestamp);
        bar.apply(&first, 100, dec!(350000.0));
        bar.apply(&tick(dec!(3510.0), dec!(1050)), 50, dec!(175500.0));
        bar.apply(&tick(dec!(3490.0), dec!(1100)), 50, dec!(174500.0));

        assert_eq!(bar.open, dec!(3500.0));
        assert_eq!(bar.high, dec!(3510.0));
        assert_eq!(bar.low, dec!(3490.0));
        assert_eq!(bar.close, dec!(3490.0));
        assert_eq!(bar.volume, 200);
        assert_eq!(bar.turnover, dec!(700000.0));
        assert_eq!(bar.open_interest, dec!(1100));
        assert_eq!(bar.tick_count, 3);
    }

    #[test]
    fn test_tick_deserializes_with_extras() {
        let json = r#"{
            "timestamp": "2025-12-23T09:30:15.500+08:00",
            "trading_day": "20251223",
            "instrument_id": "rb2505",
            "last_price": "1084.0",
            "volume": 12,
            "turnover": 13008.0,
            "open_interest": 300,
            "bids": [{"price": "1083.5", "volume": 3}],
            "extra": {"ExchangeID": "SHFE", "UpdateMillisec": 500, "AveragePrice": 1084.25}
        }"#;
        let tick: TickRecord = serde_json::from_str(json).unwrap();
        assert_eq!(tick.last_price.to_string(), "1084.0");
        assert_eq!(tick.bid(0).map(|l| l.volume), Some(3));
        assert!(tick.ask(0).is_none());
        assert_eq!(
            tick.extra.get("ExchangeID"),
            Some(&ExtraValue::Text("SHFE".into()))
        );
        assert_eq!(tick.extra.get("UpdateMillisec"), Some(&ExtraValue::Int(500)));
        assert_eq!(
            tick.extra.get("AveragePrice"),
            Some(&ExtraValue::Float(1084.25))
        );
    }
}
