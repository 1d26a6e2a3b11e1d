use crate::common::KLinePeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// # Summary
/// 落盘数据类别，决定失败文件前缀与重试时路由到哪个写入器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Tick,
    KLine,
}

impl DataType {
    /// 失败文件名前缀
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Tick => "tick",
            DataType::KLine => "kline",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// # Summary
/// 一次写入的目标定位信息，足以还原出目标 CSV 文件。
///
/// # Invariants
/// - Tick 数据 `period` 为 None，K 线数据必须携带周期。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub trading_day: String,
    pub instrument_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<KLinePeriod>,
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.period {
            Some(period) => write!(f, "{}/{}/{}", self.trading_day, period, self.instrument_id),
            None => write!(f, "{}/{}", self.trading_day, self.instrument_id),
        }
    }
}

/// # Summary
/// 存储引擎未能写入的一批数据。
///
/// # Invariants
/// - `rows` 为已渲染好的 CSV 数据行（不含表头与换行符），重试时原样写回。
/// - 重试成功后对应文件被删除；失败则保留并累加 `retry_count`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub data_type: DataType,
    pub target: TargetKey,
    pub rows: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

impl FailureRecord {
    pub fn new(
        data_type: DataType,
        target: TargetKey,
        rows: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data_type,
            target,
            rows,
            created_at,
            retry_count: 0,
        }
    }
}
