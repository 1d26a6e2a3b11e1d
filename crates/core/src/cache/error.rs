use thiserror::Error;

/// # Summary
/// 合约缓存错误枚举，处理缓存文件读写与解析问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum CacheError {
    // 缓存文件读写失败
    #[error("IO error: {0}")]
    Io(String),
    // 数据序列化失败
    #[error("Serialize error: {0}")]
    Serialize(String),
    // 数据反序列化失败
    #[error("Deserialize error: {0}")]
    Deserialize(String),
}
