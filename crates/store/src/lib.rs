//! CSV 落盘引擎：精度格式化、按文件聚合的写缓冲、批量并发刷盘与失败持久化。

pub mod buffer;
pub mod csv;
pub mod failure;
pub mod format;
pub mod schema;

pub use csv::{CsvStorage, KLineCsvStorage, StorageOptions, TickCsvStorage};
pub use failure::FailureHandler;
