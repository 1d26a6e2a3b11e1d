use std::path::PathBuf;
use thiserror::Error;

/// # Summary
/// 数值格式化错误，只影响单个字段。
///
/// # Invariants
/// - 调用方必须将其视为字段级校验失败（写空单元格），不得丢弃整行。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// 非有限数值 (NaN / ±∞)
    #[error("Non-finite value in field {field}")]
    NonFinite { field: String },
}

/// # Summary
/// 存储层错误枚举，处理文件写入、失败持久化与内部不变量问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - `FlushIo`/`Timeout` 在刷盘边界被转换为重新入队或持久化，不向摄取路径传播。
/// - `BufferKey` 表示内部不变量被破坏，属于程序缺陷。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 缓冲区中的记录与其键不一致
    #[error("Buffer key mismatch: expected {expected}, found {found}")]
    BufferKey { expected: String, found: String },
    /// 刷盘时的磁盘/权限错误
    #[error("Flush IO error on {}: {source}", path.display())]
    FlushIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 重试失败文件时再次失败
    #[error("Retry IO error on {file}: {reason}")]
    RetryIo { file: String, reason: String },
    /// 写入超过配置的超时时间
    #[error("Write to {} timed out after {millis}ms", path.display())]
    Timeout { path: PathBuf, millis: u64 },
    /// 写入目标不合法（空交易日、空合约代码、缺少周期等）
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    /// 序列化失败
    #[error("Serialize error: {0}")]
    Serialize(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
}
