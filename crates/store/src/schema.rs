use crate::buffer::Weighted;
use crate::format::{
    KLINE_TIMESTAMP_FORMAT, TICK_TIMESTAMP_FORMAT, escape_cell, format_extra, push_decimal,
    push_timestamp,
};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::path::{Component, Path, PathBuf};
use tickstore_core::common::KLinePeriod;
use tickstore_core::market::entity::{DEPTH_LEVELS, DepthLevel, KLineBar, TickRecord};
use tickstore_core::store::entity::{DataType, TargetKey};
use tickstore_core::store::error::StoreError;
use tracing::warn;

/// # Summary
/// 一类 CSV 文件的结构描述：列、分文件键、路径与行渲染。
///
/// # Invariants
/// - `key_of` 与 `target`/`key_from_target` 必须互逆，失败重试依赖此映射找回原文件。
/// - `render_row` 只追加一行内容，不含换行符。
pub trait CsvSchema: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Ord + Debug + Display + Send + Sync + 'static;
    type Record: Weighted + Send + Sync + 'static;

    /// 数据类别
    fn data_type(&self) -> DataType;

    /// 表头列名，按输出顺序
    fn columns(&self) -> Vec<String>;

    /// 记录所属的分文件键
    fn key_of(&self, record: &Self::Record) -> Self::Key;

    /// 键对应的相对路径（相对存储根目录）
    fn relative_path(&self, key: &Self::Key) -> PathBuf;

    /// 键转换为可持久化的目标定位
    fn target(&self, key: &Self::Key) -> TargetKey;

    /// 由目标定位还原键，类别不匹配时返回 None
    fn key_from_target(&self, target: &TargetKey) -> Option<Self::Key>;

    /// 渲染一行数据
    fn render_row(&self, record: &Self::Record, out: &mut String);
}

/// # Summary
/// 校验路径片段，拒绝空值、路径分隔符与 `..` 等可能越出存储根目录的取值。
pub fn validate_segment(name: &str, value: &str) -> Result<(), StoreError> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.contains(['/', '\\']) => Ok(()),
        _ => Err(StoreError::InvalidTarget(format!(
            "{} {:?} is not a valid path segment",
            name, value
        ))),
    }
}

/// Tick 文件键：一个交易日一个合约一个文件
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickKey {
    pub trading_day: String,
    pub instrument_id: String,
}

impl Display for TickKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.trading_day, self.instrument_id)
    }
}

/// K 线文件键：交易日 + 周期 + 合约
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KLineKey {
    pub trading_day: String,
    pub period: KLinePeriod,
    pub instrument_id: String,
}

impl Display for KLineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.trading_day, self.period, self.instrument_id
        )
    }
}

/// 固定的 Tick 列
const TICK_FIXED_COLUMNS: [&str; 7] = [
    "Timestamp",
    "TradingDay",
    "InstrumentID",
    "LastPrice",
    "Volume",
    "Turnover",
    "OpenInterest",
];

/// K 线列
const KLINE_COLUMNS: [&str; 9] = [
    "Timestamp",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "Turnover",
    "OpenInterest",
    "TickCount",
];

/// # Summary
/// Tick CSV 结构：`{base}/{trading_day}/{instrument_id}.csv`。
///
/// # Invariants
/// - 列顺序：固定列、五档买价、五档买量、五档卖价、五档卖量、配置的透传列。
/// - 透传列集合在构造时固定，同一文件的表头因此始终一致。
#[derive(Debug, Clone, Default)]
pub struct TickSchema {
    extra_columns: Vec<String>,
}

impl TickSchema {
    pub fn new(extra_columns: Vec<String>) -> Self {
        Self { extra_columns }
    }

    fn push_depth_prices(out: &mut String, levels: &[DepthLevel]) {
        for i in 0..DEPTH_LEVELS {
            out.push(',');
            if let Some(level) = levels.get(i) {
                push_decimal(out, &level.price);
            }
        }
    }

    fn push_depth_volumes(out: &mut String, levels: &[DepthLevel]) {
        for i in 0..DEPTH_LEVELS {
            out.push(',');
            if let Some(level) = levels.get(i) {
                out.push_str(&level.volume.to_string());
            }
        }
    }
}

impl CsvSchema for TickSchema {
    type Key = TickKey;
    type Record = TickRecord;

    fn data_type(&self) -> DataType {
        DataType::Tick
    }

    fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = TICK_FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        for side in ["BidPrice", "BidVolume", "AskPrice", "AskVolume"] {
            columns.extend((1..=DEPTH_LEVELS).map(|i| format!("{}{}", side, i)));
        }
        columns.extend(self.extra_columns.iter().cloned());
        columns
    }

    fn key_of(&self, record: &TickRecord) -> TickKey {
        TickKey {
            trading_day: record.trading_day.clone(),
            instrument_id: record.instrument_id.clone(),
        }
    }

    fn relative_path(&self, key: &TickKey) -> PathBuf {
        PathBuf::from(&key.trading_day).join(format!("{}.csv", key.instrument_id))
    }

    fn target(&self, key: &TickKey) -> TargetKey {
        TargetKey {
            trading_day: key.trading_day.clone(),
            instrument_id: key.instrument_id.clone(),
            period: None,
        }
    }

    fn key_from_target(&self, target: &TargetKey) -> Option<TickKey> {
        match target.period {
            None => Some(TickKey {
                trading_day: target.trading_day.clone(),
                instrument_id: target.instrument_id.clone(),
            }),
            Some(_) => None,
        }
    }

    fn render_row(&self, tick: &TickRecord, out: &mut String) {
        push_timestamp(out, &tick.timestamp, TICK_TIMESTAMP_FORMAT);
        out.push(',');
        out.push_str(&escape_cell(&tick.trading_day));
        out.push(',');
        out.push_str(&escape_cell(&tick.instrument_id));
        out.push(',');
        push_decimal(out, &tick.last_price);
        out.push(',');
        out.push_str(&tick.volume.to_string());
        out.push(',');
        push_decimal(out, &tick.turnover);
        out.push(',');
        push_decimal(out, &tick.open_interest);

        Self::push_depth_prices(out, &tick.bids);
        Self::push_depth_volumes(out, &tick.bids);
        Self::push_depth_prices(out, &tick.asks);
        Self::push_depth_volumes(out, &tick.asks);

        for column in &self.extra_columns {
            out.push(',');
            let Some(value) = tick.extra.get(column) else {
                continue;
            };
            match format_extra(column, value) {
                Ok(text) => out.push_str(&text),
                Err(e) => warn!(
                    "Dropping field of {} {}: {}",
                    tick.instrument_id, tick.timestamp, e
                ),
            }
        }
    }
}

/// # Summary
/// K 线 CSV 结构：`{base}/{trading_day}/{period}/{instrument_id}.csv`。
#[derive(Debug, Clone, Copy, Default)]
pub struct KLineSchema;

impl CsvSchema for KLineSchema {
    type Key = KLineKey;
    type Record = KLineBar;

    fn data_type(&self) -> DataType {
        DataType::KLine
    }

    fn columns(&self) -> Vec<String> {
        KLINE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn key_of(&self, bar: &KLineBar) -> KLineKey {
        KLineKey {
            trading_day: bar.trading_day.clone(),
            period: bar.period,
            instrument_id: bar.instrument_id.clone(),
        }
    }

    fn relative_path(&self, key: &KLineKey) -> PathBuf {
        PathBuf::from(&key.trading_day)
            .join(key.period.to_string())
            .join(format!("{}.csv", key.instrument_id))
    }

    fn target(&self, key: &KLineKey) -> TargetKey {
        TargetKey {
            trading_day: key.trading_day.clone(),
            instrument_id: key.instrument_id.clone(),
            period: Some(key.period),
        }
    }

    fn key_from_target(&self, target: &TargetKey) -> Option<KLineKey> {
        target.period.map(|period| KLineKey {
            trading_day: target.trading_day.clone(),
            period,
            instrument_id: target.instrument_id.clone(),
        })
    }

    fn render_row(&self, bar: &KLineBar, out: &mut String) {
        push_timestamp(out, &bar.window_start, KLINE_TIMESTAMP_FORMAT);
        for price in [&bar.open, &bar.high, &bar.low, &bar.close] {
            out.push(',');
            push_decimal(out, price);
        }
        out.push(',');
        out.push_str(&bar.volume.to_string());
        out.push(',');
        push_decimal(out, &bar.turnover);
        out.push(',');
        push_decimal(out, &bar.open_interest);
        out.push(',');
        out.push_str(&bar.tick_count.to_string());
    }
}

impl Weighted for TickRecord {
    fn estimated_bytes(&self) -> usize {
        // 固定列约 120 字节，二十个盘口单元格各约 8 字节
        280 + self.extra.len() * 12
    }
}

impl Weighted for KLineBar {
    fn estimated_bytes(&self) -> usize {
        96
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tickstore_core::market::entity::ExtraValue;

    fn tick() -> TickRecord {
        let mut extra = BTreeMap::new();
        extra.insert("ExchangeID".to_string(), ExtraValue::Text("SHFE".into()));
        extra.insert("AveragePrice".to_string(), ExtraValue::Float(f64::NAN));
        TickRecord {
            timestamp: DateTime::parse_from_rfc3339("2025-12-23T09:00:00.100+08:00").unwrap(),
            trading_day: "20251223".into(),
            instrument_id: "rb2605".into(),
            last_price: dec!(1084.0),
            volume: 12,
            turnover: dec!(130080),
            open_interest: dec!(300.0),
            bids: vec![DepthLevel {
                price: dec!(1083.5),
                volume: 7,
            }],
            asks: vec![
                DepthLevel {
                    price: dec!(1084.5),
                    volume: 2,
                },
                DepthLevel {
                    price: dec!(1085),
                    volume: 9,
                },
            ],
            extra,
        }
    }

    #[test]
    fn test_tick_columns_order() {
        let schema = TickSchema::new(vec!["ExchangeID".into()]);
        let columns = schema.columns();
        assert_eq!(columns.len(), 7 + 20 + 1);
        assert_eq!(columns[3], "LastPrice");
        assert_eq!(columns[7], "BidPrice1");
        assert_eq!(columns[12], "BidVolume1");
        assert_eq!(columns[17], "AskPrice1");
        assert_eq!(columns[26], "AskVolume5");
        assert_eq!(columns[27], "ExchangeID");
    }

    #[test]
    fn test_tick_row_rendering_preserves_precision() {
        let schema = TickSchema::new(vec!["ExchangeID".into(), "AveragePrice".into()]);
        let mut row = String::new();
        schema.render_row(&tick(), &mut row);
        assert_eq!(
            row,
            "2025-12-23T09:00:00.100+08:00,20251223,rb2605,1084.0,12,130080.0,300.0,\
             1083.5,,,,,7,,,,,1084.5,1085.0,,,,2,9,,,,SHFE,"
        );
        assert_eq!(row.split(',').count(), schema.columns().len());
    }

    #[test]
    fn test_kline_paths_and_targets() {
        let schema = KLineSchema;
        let key = KLineKey {
            trading_day: "20251223".into(),
            period: KLinePeriod::Minute15,
            instrument_id: "rb2605".into(),
        };
        assert_eq!(
            schema.relative_path(&key),
            PathBuf::from("20251223").join("15m").join("rb2605.csv")
        );
        let target = schema.target(&key);
        assert_eq!(schema.key_from_target(&target), Some(key));
        assert!(TickSchema::default().key_from_target(&target).is_none());
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("instrument", "rb2605").is_ok());
        assert!(validate_segment("instrument", "").is_err());
        assert!(validate_segment("instrument", "..").is_err());
        assert!(validate_segment("instrument", "a/b").is_err());
        assert!(validate_segment("trading_day", ".").is_err());
    }
}
