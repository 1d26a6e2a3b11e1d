use crate::buffer::{BufferStats, Weighted, WriteBuffer};
use crate::failure::FailureHandler;
use crate::schema::{CsvSchema, KLineSchema, TickSchema, validate_segment};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tickstore_core::config::StorageConfig;
use tickstore_core::market::entity::{KLineBar, TickRecord};
use tickstore_core::store::entity::{DataType, TargetKey};
use tickstore_core::store::error::StoreError;
use tickstore_core::store::port::{BatchWriter, KLineSink, TickSink};
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tick CSV 存储
pub type TickCsvStorage = CsvStorage<TickSchema>;
/// K 线 CSV 存储
pub type KLineCsvStorage = CsvStorage<KLineSchema>;

/// # Summary
/// 存储引擎的运行参数。
#[derive(Debug, Clone)]
pub struct StorageOptions {
    // 单个文件缓冲行数达到该值时立即刷盘
    pub batch_size: usize,
    // 同一文件连续失败多少次后转交失败处理器
    pub max_flush_attempts: u32,
    // 单次写文件的超时
    pub flush_timeout: Duration,
    // flush_all 同时写入的文件数上限
    pub max_concurrent_flushes: usize,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for StorageOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_flush_attempts: config.max_flush_attempts.max(1),
            flush_timeout: Duration::from_secs(config.flush_timeout_secs.max(1)),
            max_concurrent_flushes: config.max_concurrent_flushes.max(1),
        }
    }
}

/// # Summary
/// 单个文件一次刷盘的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// 没有待写入数据
    Empty,
    /// 成功写入的行数
    Written(usize),
    /// 写入失败，批次已放回缓冲头部
    Requeued(usize),
    /// 写入失败，批次已转交失败处理器落盘
    Persisted(usize),
    /// 写入失败且失败处理器也无法落盘，批次被放弃
    Dropped(usize),
}

/// # Summary
/// 一轮 `flush_all` 的汇总。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    // 参与本轮刷盘的文件数
    pub files: usize,
    pub rows_written: usize,
    pub rows_requeued: usize,
    pub rows_persisted: usize,
    pub rows_dropped: usize,
}

impl FlushSummary {
    fn add(&mut self, outcome: FlushOutcome) {
        self.files += 1;
        match outcome {
            FlushOutcome::Empty => {}
            FlushOutcome::Written(n) => self.rows_written += n,
            FlushOutcome::Requeued(n) => self.rows_requeued += n,
            FlushOutcome::Persisted(n) => self.rows_persisted += n,
            FlushOutcome::Dropped(n) => self.rows_dropped += n,
        }
    }
}

/// # Summary
/// 存储引擎统计快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    pub data_type: DataType,
    // 当前有待写入数据的文件数
    pub buffered_files: usize,
    pub buffered_rows: usize,
    pub total_received: u64,
    // 成功的刷盘次数
    pub total_flushes: u64,
    pub total_written_rows: u64,
    pub requeued_batches: u64,
    pub persisted_batches: u64,
    pub dropped_batches: u64,
    pub running: bool,
}

/// 后台刷盘任务的句柄
struct Flusher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 后台刷盘任务被唤醒的原因
enum FlushTrigger {
    Interval,
    Threshold,
}

/// # Summary
/// 按文件聚合、批量追加的 CSV 存储引擎。
///
/// # Invariants
/// - 一个键对应一个 CSV 文件；表头只在文件为空时写入一次。
/// - 同一文件的"取出缓冲 + 写入"在该文件的异步锁内完成，写入顺序与到达顺序一致。
/// - 缓冲的协调锁从不跨越 IO；`record` 从不等待磁盘，阈值刷盘由后台任务完成。
/// - IO 错误与超时在刷盘边界被吸收，转为重新入队或交给失败处理器。
/// - 取出的批次在确定去向前被取消时自动放回缓冲，不会丢失。
pub struct CsvStorage<S: CsvSchema> {
    schema: S,
    base_path: PathBuf,
    // 预先渲染好的表头行（含换行符）
    header: Arc<str>,
    options: StorageOptions,
    buffer: WriteBuffer<S::Key, S::Record>,
    // 各文件的异步写锁
    file_locks: DashMap<S::Key, Arc<tokio::sync::Mutex<()>>>,
    // 已确认写过表头的文件
    headers_written: DashSet<PathBuf>,
    // 各键连续刷盘失败次数
    attempts: DashMap<S::Key, u32>,
    // 达到阈值、等待后台任务立即刷盘的键
    urgent: DashSet<S::Key>,
    wake: Arc<Notify>,
    failures: Arc<FailureHandler>,
    total_flushes: AtomicU64,
    total_written_rows: AtomicU64,
    requeued_batches: AtomicU64,
    persisted_batches: AtomicU64,
    dropped_batches: AtomicU64,
    running: AtomicBool,
    flusher: Mutex<Option<Flusher>>,
}

impl<S: CsvSchema> CsvStorage<S> {
    /// # Summary
    /// 创建存储引擎。
    ///
    /// # Logic
    /// 1. 根据结构描述一次性渲染表头。
    /// 2. 初始化空缓冲与各类缓存，不触碰磁盘。
    ///
    /// # Arguments
    /// * `schema`: 文件结构描述。
    /// * `base_path`: 存储根目录。
    /// * `options`: 运行参数。
    /// * `failures`: 共享的失败处理器。
    pub fn new(
        schema: S,
        base_path: impl Into<PathBuf>,
        options: StorageOptions,
        failures: Arc<FailureHandler>,
    ) -> Self {
        let mut header = schema.columns().join(",");
        header.push('\n');
        Self {
            schema,
            base_path: base_path.into(),
            header: Arc::from(header),
            options,
            buffer: WriteBuffer::new(),
            file_locks: DashMap::new(),
            headers_written: DashSet::new(),
            attempts: DashMap::new(),
            urgent: DashSet::new(),
            wake: Arc::new(Notify::new()),
            failures,
            total_flushes: AtomicU64::new(0),
            total_written_rows: AtomicU64::new(0),
            requeued_batches: AtomicU64::new(0),
            persisted_batches: AtomicU64::new(0),
            dropped_batches: AtomicU64::new(0),
            running: AtomicBool::new(false),
            flusher: Mutex::new(None),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn data_type(&self) -> DataType {
        self.schema.data_type()
    }

    /// # Summary
    /// 创建存储根目录并标记为运行中。
    pub async fn initialize(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| {
                StoreError::InitError(format!("create {}: {}", self.base_path.display(), e))
            })?;
        self.running.store(true, Ordering::SeqCst);
        info!(
            "{} storage initialized at {}",
            self.schema.data_type(),
            self.base_path.display()
        );
        Ok(())
    }

    /// # Summary
    /// 接收一条记录。
    ///
    /// # Logic
    /// 1. 校验目标键，拒绝会越出根目录的交易日或合约代码。
    /// 2. 追加到缓冲。
    /// 3. 该键缓冲行数达到阈值时标记为紧急并唤醒后台刷盘任务，本身不等待 IO。
    ///
    /// # Arguments
    /// * `record`: 待落盘记录。
    ///
    /// # Returns
    /// 追加后该键的缓冲行数。IO 失败不会体现在返回值中。
    pub async fn record(&self, record: S::Record) -> Result<usize, StoreError> {
        let key = self.schema.key_of(&record);
        self.validate(&self.schema.target(&key))?;

        let pending = self.buffer.add(key.clone(), record);
        if pending >= self.options.batch_size {
            if self.urgent.insert(key.clone()) {
                debug!("Buffer for {} reached {} rows, waking flusher", key, pending);
            }
            self.wake.notify_one();
        }
        Ok(pending)
    }

    /// # Summary
    /// 刷盘单个文件。
    ///
    /// # Logic
    /// 1. 获取该文件的异步写锁，保证同一文件的批次按顺序写入。
    /// 2. 原子地取出缓冲，校验每条记录确实属于该键。
    /// 3. 渲染为一整块文本，在超时控制下一次追加写入。
    /// 4. 失败时：超时直接转交失败处理器；IO 错误先放回缓冲，连续失败达到上限再转交。
    /// 5. 本 future 在批次确定去向前被丢弃时，批次回到缓冲头部。
    ///
    /// # Arguments
    /// * `key`: 文件键。
    ///
    /// # Returns
    /// 刷盘结果；只有内部不变量被破坏（`BufferKey`）时返回错误。
    pub async fn flush(&self, key: &S::Key) -> Result<FlushOutcome, StoreError> {
        let lock = self.file_lock(key);
        let _guard = lock.lock().await;

        self.urgent.remove(key);
        let batch = self.buffer.drain_batch(key);
        if batch.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        if let Some(stray) = batch.records().iter().find(|r| self.schema.key_of(r) != *key) {
            let found = self.schema.key_of(stray).to_string();
            batch.requeue();
            error!("Buffer for {} holds a record of {}", key, found);
            return Err(StoreError::BufferKey {
                expected: key.to_string(),
                found,
            });
        }

        let rows: Vec<String> = batch
            .records()
            .iter()
            .map(|r| {
                let mut row = String::with_capacity(r.estimated_bytes());
                self.schema.render_row(r, &mut row);
                row
            })
            .collect();
        let count = rows.len();
        let path = self.path_of(key);

        match self.write_block(&path, &rows).await {
            Ok(()) => {
                batch.settle();
                self.attempts.remove(key);
                self.total_flushes.fetch_add(1, Ordering::Relaxed);
                self.total_written_rows
                    .fetch_add(count as u64, Ordering::Relaxed);
                debug!("Flushed {} rows to {}", count, path.display());
                Ok(FlushOutcome::Written(count))
            }
            Err(e @ StoreError::Timeout { .. }) => {
                warn!("Flush of {} timed out: {}", key, e);
                self.attempts.remove(key);
                let outcome = self.hand_over(key, rows).await;
                batch.settle();
                Ok(outcome)
            }
            Err(e) => {
                let attempt = {
                    let mut attempts = self.attempts.entry(key.clone()).or_insert(0);
                    *attempts += 1;
                    *attempts
                };
                if attempt >= self.options.max_flush_attempts {
                    warn!(
                        "Flush of {} failed {} times, giving up on buffer: {}",
                        key, attempt, e
                    );
                    self.attempts.remove(key);
                    let outcome = self.hand_over(key, rows).await;
                    batch.settle();
                    Ok(outcome)
                } else {
                    warn!(
                        "Flush of {} failed (attempt {}/{}), requeued {} rows: {}",
                        key, attempt, self.options.max_flush_attempts, count, e
                    );
                    batch.requeue();
                    self.requeued_batches.fetch_add(1, Ordering::Relaxed);
                    Ok(FlushOutcome::Requeued(count))
                }
            }
        }
    }

    /// # Summary
    /// 并发刷盘所有有待写入数据的文件。
    ///
    /// # Logic
    /// 1. 快照当前有数据的键。
    /// 2. 以 `max_concurrent_flushes` 为上限并发执行 `flush`。
    /// 3. 单个文件的失败不影响其他文件；`BufferKey` 错误记录日志后继续。
    ///
    /// # Returns
    /// 本轮汇总。
    pub async fn flush_all(&self) -> FlushSummary {
        self.flush_keys(self.buffer.pending_keys()).await
    }

    /// # Summary
    /// 刷盘所有达到阈值的文件，由后台任务在被唤醒时调用。
    pub async fn flush_urgent(&self) -> FlushSummary {
        let keys: Vec<S::Key> = self.urgent.iter().map(|k| k.key().clone()).collect();
        self.flush_keys(keys).await
    }

    async fn flush_keys(&self, keys: Vec<S::Key>) -> FlushSummary {
        if keys.is_empty() {
            return FlushSummary::default();
        }

        let outcomes: Vec<_> = futures::stream::iter(keys)
            .map(|key| async move {
                let outcome = self.flush(&key).await;
                (key, outcome)
            })
            .buffer_unordered(self.options.max_concurrent_flushes)
            .collect()
            .await;

        let mut summary = FlushSummary::default();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(outcome) => summary.add(outcome),
                Err(e) => error!("Flush of {} aborted: {}", key, e),
            }
        }
        if summary.rows_written > 0 {
            debug!(
                "Flushed {} rows across {} {} files",
                summary.rows_written,
                summary.files,
                self.schema.data_type()
            );
        }
        summary
    }

    /// # Summary
    /// 启动后台刷盘任务。
    ///
    /// # Logic
    /// 1. 后台任务只持有弱引用，引擎被释放后自动退出。
    /// 2. 每个周期执行一次 `flush_all`；被 `record` 唤醒时执行 `flush_urgent`。
    /// 3. 停止信号只在两轮刷盘之间检查，进行中的刷盘总会完成。
    /// 4. 重复调用会通知旧任务在当前一轮结束后退出。
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        let wake = self.wake.clone();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let data_type = self.schema.data_type();
        self.running.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            info!("{} flusher started, interval {:?}", data_type, interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即返回
            ticker.tick().await;
            loop {
                let trigger = tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => FlushTrigger::Interval,
                    _ = wake.notified() => FlushTrigger::Threshold,
                };
                let Some(storage) = weak.upgrade() else {
                    break;
                };
                match trigger {
                    FlushTrigger::Interval => storage.flush_all().await,
                    FlushTrigger::Threshold => storage.flush_urgent().await,
                };
            }
            info!("{} flusher stopped", data_type);
        });

        let old = self
            .flusher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Flusher { cancel, handle });
        if let Some(old) = old {
            old.cancel.cancel();
        }
    }

    /// # Summary
    /// 关闭引擎。
    ///
    /// # Logic
    /// 1. 通知后台任务停止，并等待其完成进行中的一轮刷盘。
    /// 2. 执行最后一次 `flush_all`，包括尚未处理的紧急键。
    pub async fn close(&self) -> FlushSummary {
        self.running.store(false, Ordering::SeqCst);
        let flusher = self
            .flusher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(flusher) = flusher {
            flusher.cancel.cancel();
            if let Err(e) = flusher.handle.await {
                warn!("{} flusher ended abnormally: {}", self.schema.data_type(), e);
            }
        }

        let summary = self.flush_all().await;
        info!(
            "{} storage closed, final flush wrote {} rows",
            self.schema.data_type(),
            summary.rows_written
        );
        summary
    }

    /// # Summary
    /// 生成统计快照。
    pub fn stats(&self) -> StorageStats {
        let buffer = self.buffer.snapshot_stats();
        StorageStats {
            data_type: self.schema.data_type(),
            buffered_files: buffer.buffered_keys(),
            buffered_rows: buffer.pending_rows(),
            total_received: buffer.total_received,
            total_flushes: self.total_flushes.load(Ordering::Relaxed),
            total_written_rows: self.total_written_rows.load(Ordering::Relaxed),
            requeued_batches: self.requeued_batches.load(Ordering::Relaxed),
            persisted_batches: self.persisted_batches.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
            running: self.running.load(Ordering::SeqCst),
        }
    }

    /// 缓冲区逐键统计
    pub fn buffer_stats(&self) -> BufferStats<S::Key> {
        self.buffer.snapshot_stats()
    }

    /// 键对应的绝对路径
    pub fn path_of(&self, key: &S::Key) -> PathBuf {
        self.base_path.join(self.schema.relative_path(key))
    }

    fn validate(&self, target: &TargetKey) -> Result<(), StoreError> {
        validate_segment("trading_day", &target.trading_day)?;
        validate_segment("instrument_id", &target.instrument_id)
    }

    fn file_lock(&self, key: &S::Key) -> Arc<tokio::sync::Mutex<()>> {
        self.file_locks.entry(key.clone()).or_default().clone()
    }

    async fn hand_over(&self, key: &S::Key, rows: Vec<String>) -> FlushOutcome {
        let count = rows.len();
        let persisted = self
            .failures
            .persist_rows(self.schema.data_type(), self.schema.target(key), rows)
            .await;
        match persisted {
            Some(_) => {
                self.persisted_batches.fetch_add(1, Ordering::Relaxed);
                FlushOutcome::Persisted(count)
            }
            None => {
                self.dropped_batches.fetch_add(1, Ordering::Relaxed);
                FlushOutcome::Dropped(count)
            }
        }
    }

    /// # Summary
    /// 在超时控制下追加写入一批数据行（调用方已持有该文件的写锁）。
    ///
    /// # Invariants
    /// - 超时只是放弃等待：已开始的阻塞文件操作无法中断，数据行仍可能随后落盘。
    ///   超时批次会交给失败处理器，重试时可能再写一次，此路径为至少一次语义。
    async fn write_block(&self, path: &Path, rows: &[String]) -> Result<(), StoreError> {
        let timeout = self.options.flush_timeout;
        match tokio::time::timeout(timeout, self.append(path, rows)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                path: path.to_path_buf(),
                millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// # Summary
    /// 以追加模式写入数据块，必要时先写表头。
    ///
    /// # Logic
    /// 1. 未确认过表头的文件查询元数据：不存在或长度为 0 则需要表头。
    /// 2. 创建父目录，追加模式打开文件。
    /// 3. 表头与全部数据行拼成一块，一次 `write_all` 写入后刷新。
    async fn append(&self, path: &Path, rows: &[String]) -> Result<(), StoreError> {
        let flush_io = |source: std::io::Error| StoreError::FlushIo {
            path: path.to_path_buf(),
            source,
        };

        let needs_header = if self.headers_written.contains(path) {
            false
        } else {
            match tokio::fs::metadata(path).await {
                Ok(meta) => meta.len() == 0,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                Err(e) => return Err(flush_io(e)),
            }
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(flush_io)?;
        }

        let size: usize = rows.iter().map(|r| r.len() + 1).sum();
        let mut block = String::with_capacity(size + self.header.len());
        if needs_header {
            block.push_str(&self.header);
        }
        for row in rows {
            block.push_str(row);
            block.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(flush_io)?;
        file.write_all(block.as_bytes()).await.map_err(flush_io)?;
        file.flush().await.map_err(flush_io)?;

        self.headers_written.insert(path.to_path_buf());
        Ok(())
    }
}

#[async_trait]
impl<S: CsvSchema> BatchWriter for CsvStorage<S> {
    fn data_type(&self) -> DataType {
        self.schema.data_type()
    }

    /// # Summary
    /// 直接写入已渲染的数据行，供失败重试使用。
    ///
    /// # Logic
    /// 1. 由目标定位还原键；类别不匹配或路径片段非法时拒绝。
    /// 2. 与正常刷盘共用文件写锁、表头判断与超时控制。
    async fn write_rows(&self, target: &TargetKey, rows: &[String]) -> Result<(), StoreError> {
        let key = self.schema.key_from_target(target).ok_or_else(|| {
            StoreError::InvalidTarget(format!(
                "{} is not a {} target",
                target,
                self.schema.data_type()
            ))
        })?;
        self.validate(target)?;
        if rows.is_empty() {
            return Ok(());
        }

        let lock = self.file_lock(&key);
        let _guard = lock.lock().await;
        let path = self.path_of(&key);
        self.write_block(&path, rows).await?;
        self.total_written_rows
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl TickSink for CsvStorage<TickSchema> {
    async fn store_tick(&self, tick: TickRecord) -> Result<usize, StoreError> {
        self.record(tick).await
    }
}

#[async_trait]
impl KLineSink for CsvStorage<KLineSchema> {
    async fn store_kline(&self, bar: KLineBar) -> Result<usize, StoreError> {
        self.record(bar).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tickstore_core::common::time::RealTimeProvider;

    fn tick(day: &str, instrument: &str, ms: u32) -> TickRecord {
        TickRecord {
            timestamp: DateTime::parse_from_rfc3339(&format!(
                "2025-12-23T09:00:00.{:03}+08:00",
                ms
            ))
            .unwrap(),
            trading_day: day.into(),
            instrument_id: instrument.into(),
            last_price: dec!(1084.0),
            volume: 1,
            turnover: dec!(1084.0),
            open_interest: dec!(10),
            bids: vec![],
            asks: vec![],
            extra: BTreeMap::new(),
        }
    }

    fn storage(dir: &Path, batch_size: usize) -> TickCsvStorage {
        let failures = Arc::new(FailureHandler::new(
            dir.join("failures"),
            Arc::new(RealTimeProvider),
        ));
        let options = StorageOptions {
            batch_size,
            ..StorageOptions::default()
        };
        CsvStorage::new(TickSchema::default(), dir.join("ticks"), options, failures)
    }

    #[tokio::test]
    async fn test_record_below_threshold_does_no_io() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), 10);
        for ms in 0..9 {
            storage.record(tick("20251223", "rb2605", ms)).await.unwrap();
        }
        assert!(!dir.path().join("ticks").exists());
        let stats = storage.stats();
        assert_eq!(stats.buffered_rows, 9);
        assert_eq!(stats.total_flushes, 0);
    }

    #[tokio::test]
    async fn test_rejects_path_escaping_targets() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), 10);
        let err = storage.record(tick("20251223", "../x", 0)).await;
        assert!(matches!(err, Err(StoreError::InvalidTarget(_))));
        let err = storage.record(tick("", "rb2605", 0)).await;
        assert!(matches!(err, Err(StoreError::InvalidTarget(_))));
        assert_eq!(storage.stats().total_received, 0);
    }

    #[tokio::test]
    async fn test_flush_empty_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), 10);
        let key = crate::schema::TickKey {
            trading_day: "20251223".into(),
            instrument_id: "rb2605".into(),
        };
        assert_eq!(storage.flush(&key).await.unwrap(), FlushOutcome::Empty);
        assert_eq!(storage.flush_all().await, FlushSummary::default());
    }

    #[tokio::test]
    async fn test_write_rows_rejects_wrong_target_kind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path(), 10);
        let target = TargetKey {
            trading_day: "20251223".into(),
            instrument_id: "rb2605".into(),
            period: Some(tickstore_core::common::KLinePeriod::Minute1),
        };
        let err = storage.write_rows(&target, &["x".into()]).await;
        assert!(matches!(err, Err(StoreError::InvalidTarget(_))));
    }
}
