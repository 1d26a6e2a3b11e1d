use std::error::Error;
use tickstore_core::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// 日志文件名前缀，按天滚动
const LOG_FILE_PREFIX: &str = "tickstore.log";

/// # Summary
/// 初始化全局日志：控制台 + 按天滚动的日志文件。
///
/// # Logic
/// 1. `RUST_LOG` 存在时优先使用，否则取配置中的级别。
/// 2. 文件输出经 `tracing-appender` 的非阻塞写入器。
///
/// # Returns
/// 非阻塞写入器的守卫，必须存活到进程退出，否则尾部日志会丢失。
pub fn init(config: &LogConfig) -> Result<WorkerGuard, Box<dyn Error>> {
    std::fs::create_dir_all(&config.dir)?;
    let file = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer),
        )
        .try_init()?;
    Ok(guard)
}
