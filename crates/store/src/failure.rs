use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tickstore_core::common::time::TimeProvider;
use tickstore_core::store::entity::{DataType, FailureRecord, TargetKey};
use tickstore_core::store::error::StoreError;
use tickstore_core::store::port::BatchWriter;
use tracing::{debug, error, info, warn};

/// 失败文件名中的时间戳格式
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const FILE_EXTENSION: &str = "json";

/// # Summary
/// 一轮重试的结果汇总。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    // 本轮读取到的失败文件数
    pub total: usize,
    // 重新写入成功并删除的文件数
    pub success: usize,
    // 仍然失败、保留在磁盘上的文件数
    pub failed: usize,
}

impl RetryReport {
    fn merge(&mut self, other: RetryReport) {
        self.total += other.total;
        self.success += other.success;
        self.failed += other.failed;
    }
}

/// # Summary
/// 失败处理器统计快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureStats {
    // 各数据类别待重试的文件数
    pub pending: BTreeMap<DataType, usize>,
    // 最早一个待重试文件的积压时长
    pub oldest_age: Option<Duration>,
    pub save_count: u64,
    pub retry_success_count: u64,
    pub retry_fail_count: u64,
}

impl FailureStats {
    /// 全部待重试文件数
    pub fn pending_total(&self) -> usize {
        self.pending.values().sum()
    }
}

/// # Summary
/// 存储引擎的兜底通道：把写不进去的批次落成独立的 JSON 文件，之后择机重试。
///
/// # Invariants
/// - 一个失败批次对应一个文件，文件名包含数据类别、时间戳与进程内递增序号，互不冲突。
/// - `persist` 从不返回错误，失败时记录日志并丢弃该批次。
/// - 重试成功的文件被删除；失败的文件保留并累加 `retry_count`。
/// - 所有时间计算都经过 `TimeProvider`，测试可以拨动时钟验证清理逻辑。
pub struct FailureHandler {
    dir: PathBuf,
    clock: Arc<dyn TimeProvider>,
    seq: AtomicU64,
    save_count: AtomicU64,
    retry_success_count: AtomicU64,
    retry_fail_count: AtomicU64,
}

impl FailureHandler {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            dir: dir.into(),
            clock,
            seq: AtomicU64::new(0),
            save_count: AtomicU64::new(0),
            retry_success_count: AtomicU64::new(0),
            retry_fail_count: AtomicU64::new(0),
        }
    }

    /// 失败文件目录
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// # Summary
    /// 创建失败文件目录。
    pub async fn initialize(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::InitError(format!("create {}: {}", self.dir.display(), e))
        })
    }

    /// # Summary
    /// 将一个写入失败的批次持久化到失败目录。
    ///
    /// # Logic
    /// 1. 按 `{类别}_{时间戳}_{序号}.json` 生成文件名。
    /// 2. 先写临时文件再重命名，避免重试扫描读到半个文件。
    /// 3. 任何一步失败都只记录 error 日志，批次被放弃。
    ///
    /// # Arguments
    /// * `record`: 失败批次。
    ///
    /// # Returns
    /// 成功时返回失败文件路径，放弃时返回 None。
    pub async fn persist(&self, record: &FailureRecord) -> Option<PathBuf> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}_{}_{}.{}",
            record.data_type,
            self.clock.now().format(FILE_TIMESTAMP_FORMAT),
            seq,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);

        match self.write_record(&path, record).await {
            Ok(()) => {
                self.save_count.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Persisted failed {} batch for {} ({} rows) to {}",
                    record.data_type,
                    record.target,
                    record.rows.len(),
                    path.display()
                );
                Some(path)
            }
            Err(e) => {
                error!(
                    "Dropping {} batch for {} ({} rows): cannot persist failure: {}",
                    record.data_type,
                    record.target,
                    record.rows.len(),
                    e
                );
                None
            }
        }
    }

    /// # Summary
    /// 便捷入口：由批次内容直接构造失败记录并持久化。
    pub async fn persist_rows(
        &self,
        data_type: DataType,
        target: TargetKey,
        rows: Vec<String>,
    ) -> Option<PathBuf> {
        let record = FailureRecord::new(data_type, target, rows, self.clock.now());
        self.persist(&record).await
    }

    async fn write_record(&self, path: &Path, record: &FailureRecord) -> Result<(), StoreError> {
        let body =
            serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialize(e.to_string()))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| retry_io(&self.dir, e))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| retry_io(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| retry_io(path, e))
    }

    /// # Summary
    /// 重试某一类别的全部失败文件。
    ///
    /// # Logic
    /// 1. 按文件名顺序（即持久化时间顺序）逐个读取。
    /// 2. 交给写入器按原目标写回。
    /// 3. 成功则删除文件；失败则累加重试次数后原地覆盖。
    /// 4. 无法解析的文件计为失败并保留，等待人工处理或过期清理。
    ///
    /// # Arguments
    /// * `writer`: 负责该类别的写入器。
    ///
    /// # Returns
    /// 本轮重试结果。
    pub async fn retry(&self, writer: &dyn BatchWriter) -> RetryReport {
        let data_type = writer.data_type();
        let mut report = RetryReport::default();

        let files = match self.list_files(Some(data_type)).await {
            Ok(files) => files,
            Err(e) => {
                error!("Failed to list failure files for {}: {}", data_type, e);
                return report;
            }
        };

        for path in files {
            report.total += 1;
            match self.retry_file(&path, writer).await {
                Ok(()) => {
                    report.success += 1;
                    self.retry_success_count.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    report.failed += 1;
                    self.retry_fail_count.fetch_add(1, Ordering::Relaxed);
                    warn!("Retry of {} failed: {}", path.display(), e);
                }
            }
        }

        if report.total > 0 {
            info!(
                "Retried {} failures: {} succeeded, {} failed",
                data_type, report.success, report.failed
            );
        }
        report
    }

    /// # Summary
    /// 依次对每个写入器执行 `retry`，汇总结果。
    pub async fn retry_all(&self, writers: &[Arc<dyn BatchWriter>]) -> RetryReport {
        let mut report = RetryReport::default();
        for writer in writers {
            report.merge(self.retry(writer.as_ref()).await);
        }
        report
    }

    async fn retry_file(&self, path: &Path, writer: &dyn BatchWriter) -> Result<(), StoreError> {
        let body = tokio::fs::read(path).await.map_err(|e| retry_io(path, e))?;
        let mut record: FailureRecord = serde_json::from_slice(&body).map_err(|e| {
            StoreError::RetryIo {
                file: path.display().to_string(),
                reason: format!("unreadable failure record: {}", e),
            }
        })?;

        match writer.write_rows(&record.target, &record.rows).await {
            Ok(()) => {
                tokio::fs::remove_file(path)
                    .await
                    .map_err(|e| retry_io(path, e))?;
                debug!(
                    "Recovered {} rows for {} from {}",
                    record.rows.len(),
                    record.target,
                    path.display()
                );
                Ok(())
            }
            Err(e) => {
                record.retry_count = record.retry_count.saturating_add(1);
                if let Err(write_err) = self.write_record(path, &record).await {
                    warn!(
                        "Cannot update retry count of {}: {}",
                        path.display(),
                        write_err
                    );
                }
                Err(StoreError::RetryIo {
                    file: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// # Summary
    /// 统计待重试文件与累计计数，不修改任何文件。
    pub async fn stats(&self) -> FailureStats {
        let now = self.clock.now();
        let mut pending = BTreeMap::new();
        let mut oldest_age: Option<Duration> = None;

        match self.list_files(None).await {
            Ok(files) => {
                for path in files {
                    let Some(data_type) = data_type_of(&path) else {
                        continue;
                    };
                    *pending.entry(data_type).or_insert(0) += 1;
                    if let Some(created) = self.created_at(&path).await {
                        let age = now - created;
                        oldest_age = Some(oldest_age.map_or(age, |current| current.max(age)));
                    }
                }
            }
            Err(e) => warn!("Failed to list failure files: {}", e),
        }

        FailureStats {
            pending,
            oldest_age,
            save_count: self.save_count.load(Ordering::Relaxed),
            retry_success_count: self.retry_success_count.load(Ordering::Relaxed),
            retry_fail_count: self.retry_fail_count.load(Ordering::Relaxed),
        }
    }

    /// # Summary
    /// 删除超过保留期的失败文件，不论其重试结果。
    ///
    /// # Arguments
    /// * `older_than`: 保留期，积压时长严格大于该值的文件被删除。
    ///
    /// # Returns
    /// 删除的文件数。
    pub async fn cleanup(&self, older_than: Duration) -> usize {
        let now = self.clock.now();
        let files = match self.list_files(None).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Failed to list failure files for cleanup: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for path in files {
            let Some(created) = self.created_at(&path).await else {
                continue;
            };
            if now - created <= older_than {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    removed += 1;
                    warn!("Discarded expired failure file {}", path.display());
                }
                Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
        if removed > 0 {
            info!("Cleaned up {} expired failure files", removed);
        }
        removed
    }

    /// 列出失败文件，按文件名排序；目录不存在视为空
    async fn list_files(&self, data_type: Option<DataType>) -> Result<Vec<PathBuf>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(retry_io(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| retry_io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            match (data_type, data_type_of(&path)) {
                (_, None) => continue,
                (Some(wanted), Some(found)) if wanted != found => continue,
                _ => files.push(path),
            }
        }
        files.sort();
        Ok(files)
    }

    /// 文件创建时间：优先解析文件名，退化为文件修改时间
    async fn created_at(&self, path: &Path) -> Option<DateTime<Utc>> {
        if let Some(ts) = timestamp_of(path) {
            return Some(ts);
        }
        let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified))
    }
}

fn retry_io(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::RetryIo {
        file: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

fn data_type_of(path: &Path) -> Option<DataType> {
    let (prefix, _) = file_stem(path)?.split_once('_')?;
    [DataType::Tick, DataType::KLine]
        .into_iter()
        .find(|t| t.as_str() == prefix)
}

fn timestamp_of(path: &Path) -> Option<DateTime<Utc>> {
    let (_, rest) = file_stem(path)?.split_once('_')?;
    let (ts, _seq) = rest.rsplit_once('_')?;
    NaiveDateTime::parse_from_str(ts, FILE_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
