use crate::common::KLinePeriod;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置校验错误，交由配置加载方处理
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub kline: KLineConfig,
    pub failure: FailureConfig,
    pub instruments: InstrumentConfig,
    pub log: LogConfig,
}

/// CSV 落盘配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub tick_path: String,
    pub kline_path: String,
    pub failure_dir: String,
    // 周期刷盘间隔（秒）
    pub flush_interval_secs: u64,
    // 单个文件缓冲行数达到该值立即刷盘
    pub batch_size: usize,
    // 同一文件连续刷盘失败多少次后转交失败处理器
    pub max_flush_attempts: u32,
    pub flush_timeout_secs: u64,
    // flush_all 并发写文件数上限
    pub max_concurrent_flushes: usize,
    // 追加在固定列之后的透传列
    pub extra_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KLineConfig {
    pub enabled: bool,
    pub periods: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    pub retention_days: u32,
    pub retry_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub cache_path: Option<String>,
    pub futures_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tick_path: "./data/ticks".to_string(),
            kline_path: "./data/klines".to_string(),
            failure_dir: "./data/failures".to_string(),
            flush_interval_secs: 1,
            batch_size: 100,
            max_flush_attempts: 3,
            flush_timeout_secs: 10,
            max_concurrent_flushes: 64,
            extra_columns: Vec::new(),
        }
    }
}

impl Default for KLineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            periods: KLinePeriod::all().iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            retention_days: 7,
            retry_interval_secs: 60,
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            futures_only: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: "./logs".to_string(),
            level: "info".to_string(),
        }
    }
}

impl KLineConfig {
    /// # Summary
    /// 解析启用的周期列表。
    ///
    /// # Logic
    /// 1. 逐个解析周期字符串，任一非法即报错。
    /// 2. 去重并按周期由短到长排序。
    ///
    /// # Returns
    /// 周期列表或 `ConfigError`。
    pub fn parsed_periods(&self) -> Result<Vec<KLinePeriod>, ConfigError> {
        let mut periods = self
            .periods
            .iter()
            .map(|p| {
                p.parse::<KLinePeriod>()
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        periods.sort();
        periods.dedup();
        Ok(periods)
    }
}

impl AppConfig {
    /// # Summary
    /// 启动时校验配置。
    ///
    /// # Logic
    /// 1. 批量阈值、刷盘间隔、尝试次数、超时、并发数必须为正。
    /// 2. 启用 K 线时周期列表不得为空且必须全部合法。
    ///
    /// # Returns
    /// 合法返回 Ok，否则返回首个发现的问题。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.storage;
        if s.batch_size == 0 {
            return Err(ConfigError::Invalid("storage.batch_size must be > 0".into()));
        }
        if s.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "storage.flush_interval_secs must be > 0".into(),
            ));
        }
        if s.max_flush_attempts == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_flush_attempts must be > 0".into(),
            ));
        }
        if s.flush_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "storage.flush_timeout_secs must be > 0".into(),
            ));
        }
        if s.max_concurrent_flushes == 0 {
            return Err(ConfigError::Invalid(
                "storage.max_concurrent_flushes must be > 0".into(),
            ));
        }
        if self.failure.retry_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "failure.retry_interval_secs must be > 0".into(),
            ));
        }
        if self.kline.enabled && self.kline.parsed_periods()?.is_empty() {
            return Err(ConfigError::Invalid(
                "kline.periods must not be empty when kline is enabled".into(),
            ));
        }
        Ok(())
    }
}
