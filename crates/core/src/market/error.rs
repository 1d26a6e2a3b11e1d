use thiserror::Error;

/// # Summary
/// 行情聚合域错误枚举，处理单笔 tick 校验失败及下游投递问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 任何变体都只影响单笔 tick，不得破坏其他合约或其他窗口的状态。
#[derive(Error, Debug)]
pub enum MarketError {
    // tick 字段不合法（缺失合约代码、交易日无法解析等）
    #[error("Malformed tick: {0}")]
    MalformedTick(String),
    // 未知的 K 线周期字符串
    #[error("Unknown period: {0}")]
    UnknownPeriod(String),
    // 下游存储拒绝了完成的 K 线
    #[error("Sink error: {0}")]
    Sink(String),
}
