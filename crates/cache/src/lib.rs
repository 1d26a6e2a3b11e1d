//! 合约元数据的内存缓存。

pub mod instrument;

pub use instrument::MemInstrumentCache;
