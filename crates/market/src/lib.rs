//! 行情聚合：多周期 K 线合成与 tick 分发。

pub mod builder;
pub mod recorder;

pub use builder::KLineBuilder;
pub use recorder::MarketRecorder;
