use tickstore_core::market::entity::TickRecord;
use tickstore_market::MarketRecorder;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 行情输入统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub lines: u64,
    pub accepted: u64,
    pub malformed: u64,
    pub rejected: u64,
}

/// # Summary
/// 逐行读取 JSON 格式的 tick 并交给记录器，直到输入结束或收到停止信号。
///
/// # Logic
/// 1. 只在等待下一行时响应停止信号，已读到的 tick 总会处理完。
/// 2. 空行跳过。
/// 3. 无法解析的行记录告警后跳过，不中断读取。
/// 4. 记录器拒绝的 tick 只计数，不中断读取。
///
/// # Arguments
/// * `reader`: 行输入源（进程中为标准输入）。
/// * `recorder`: tick 记录器。
/// * `shutdown`: 停止信号。
///
/// # Returns
/// 结束时的统计。
pub async fn run<R>(
    reader: R,
    recorder: &MarketRecorder,
    shutdown: &CancellationToken,
) -> IntakeStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = IntakeStats::default();
    let mut lines = reader.lines();
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Tick input stopped by shutdown");
                break;
            }
            next = lines.next_line() => next,
        };
        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Tick input failed: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let tick: TickRecord = match serde_json::from_str(line) {
            Ok(tick) => tick,
            Err(e) => {
                stats.malformed += 1;
                warn!("Skipping malformed tick line {}: {}", stats.lines, e);
                continue;
            }
        };
        match recorder.on_tick(tick).await {
            Ok(()) => stats.accepted += 1,
            Err(_) => stats.rejected += 1,
        }
    }
    info!(
        "Tick input closed: {} lines, {} accepted, {} malformed, {} rejected",
        stats.lines, stats.accepted, stats.malformed, stats.rejected
    );
    stats
}
