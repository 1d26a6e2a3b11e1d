pub mod time;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Timelike, Utc};
use crate::market::error::MarketError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 国内期货行情统一使用的东八区偏移（秒）
const CST_OFFSET_SECS: i32 = 8 * 3600;

/// # Summary
/// 返回固定的东八区时区偏移。
pub fn cst() -> FixedOffset {
    FixedOffset::east_opt(CST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// # Summary
/// 解析交易日字符串。
///
/// # Logic
/// 1. 优先按 CTP 原生格式 `YYYYMMDD` 解析。
/// 2. 失败时退化为 ISO 格式 `YYYY-MM-DD`。
///
/// # Arguments
/// * `trading_day`: 交易日字符串。
///
/// # Returns
/// 合法时返回日期，否则返回 None。
pub fn parse_trading_day(trading_day: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(trading_day, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(trading_day, "%Y-%m-%d"))
        .ok()
}

/// # Summary
/// K 线周期枚举，定义 K 线的时间跨度。
///
/// # Invariants
/// - 所有日内周期的秒数都能整除 86400，因此按自然时钟对齐后 15 分钟线必然落在 :00/:15/:30/:45。
/// - 日线的窗口即交易日本身，与日内时间戳无关。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum KLinePeriod {
    // 1分钟
    Minute1,
    // 3分钟
    Minute3,
    // 5分钟
    Minute5,
    // 10分钟
    Minute10,
    // 15分钟
    Minute15,
    // 30分钟
    Minute30,
    // 60分钟
    Minute60,
    // 日线
    Day1,
}

impl KLinePeriod {
    /// # Summary
    /// 返回全部周期，顺序由短到长。
    pub fn all() -> [KLinePeriod; 8] {
        [
            KLinePeriod::Minute1,
            KLinePeriod::Minute3,
            KLinePeriod::Minute5,
            KLinePeriod::Minute10,
            KLinePeriod::Minute15,
            KLinePeriod::Minute30,
            KLinePeriod::Minute60,
            KLinePeriod::Day1,
        ]
    }

    /// # Summary
    /// 周期对应的分钟数，日线按 1440 计。
    pub fn minutes(&self) -> u32 {
        match self {
            KLinePeriod::Minute1 => 1,
            KLinePeriod::Minute3 => 3,
            KLinePeriod::Minute5 => 5,
            KLinePeriod::Minute10 => 10,
            KLinePeriod::Minute15 => 15,
            KLinePeriod::Minute30 => 30,
            KLinePeriod::Minute60 => 60,
            KLinePeriod::Day1 => 1440,
        }
    }

    /// # Summary
    /// 日内周期的秒数；日线按交易日切分，返回 None。
    pub fn duration_secs(&self) -> Option<u32> {
        match self {
            KLinePeriod::Day1 => None,
            other => Some(other.minutes() * 60),
        }
    }

    /// # Summary
    /// 计算给定时间戳所属窗口的起始时间。
    ///
    /// # Logic
    /// 1. 时间戳先换算到东八区。
    /// 2. 日线：窗口为交易日当天东八区 00:00:00。
    /// 3. 日内周期：取东八区距午夜的秒数，向下取整到周期秒数的整数倍。
    ///
    /// # Arguments
    /// * `timestamp`: tick 时间戳（任意固定偏移）。
    /// * `trading_day`: 该 tick 的交易日。
    ///
    /// # Returns
    /// 对齐后的东八区窗口起点；本地时间不唯一时返回 None。
    pub fn window_start(
        &self,
        timestamp: &DateTime<FixedOffset>,
        trading_day: NaiveDate,
    ) -> Option<DateTime<FixedOffset>> {
        let offset = cst();
        let timestamp = timestamp.with_timezone(&offset);
        match self.duration_secs() {
            None => offset
                .from_local_datetime(&trading_day.and_time(NaiveTime::MIN))
                .single(),
            Some(secs) => {
                let local = timestamp.naive_local();
                let since_midnight = local.time().num_seconds_from_midnight();
                let aligned = since_midnight - since_midnight % secs;
                let time = NaiveTime::from_num_seconds_from_midnight_opt(aligned, 0)?;
                offset.from_local_datetime(&local.date().and_time(time)).single()
            }
        }
    }
}

impl FromStr for KLinePeriod {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(KLinePeriod::Minute1),
            "3m" => Ok(KLinePeriod::Minute3),
            "5m" => Ok(KLinePeriod::Minute5),
            "10m" => Ok(KLinePeriod::Minute10),
            "15m" => Ok(KLinePeriod::Minute15),
            "30m" => Ok(KLinePeriod::Minute30),
            "60m" | "1h" => Ok(KLinePeriod::Minute60),
            "1d" => Ok(KLinePeriod::Day1),
            _ => Err(MarketError::UnknownPeriod(s.to_string())),
        }
    }
}

impl TryFrom<String> for KLinePeriod {
    type Error = MarketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<KLinePeriod> for String {
    fn from(value: KLinePeriod) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for KLinePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KLinePeriod::Minute1 => write!(f, "1m"),
            KLinePeriod::Minute3 => write!(f, "3m"),
            KLinePeriod::Minute5 => write!(f, "5m"),
            KLinePeriod::Minute10 => write!(f, "10m"),
            KLinePeriod::Minute15 => write!(f, "15m"),
            KLinePeriod::Minute30 => write!(f, "30m"),
            KLinePeriod::Minute60 => write!(f, "60m"),
            KLinePeriod::Day1 => write!(f, "1d"),
        }
    }
}
