use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use tickstore_core::cache::entity::InstrumentInfo;
use tickstore_core::cache::error::CacheError;
use tickstore_core::cache::port::InstrumentLookup;
use tracing::info;

/// 缓存文件的磁盘格式
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    instruments: Vec<InstrumentInfo>,
}

/// # Summary
/// 基于 DashMap 的合约信息缓存。
///
/// # Invariants
/// - 所有查询都是纯内存操作，可在摄取热路径上并发调用。
/// - 同一合约代码只保留最后一次写入的信息。
pub struct MemInstrumentCache {
    // 合约代码 -> 合约信息
    instruments: DashMap<String, InstrumentInfo>,
    // 最近一次整体刷新的时间
    update_time: RwLock<Option<DateTime<Utc>>>,
}

impl MemInstrumentCache {
    /// # Summary
    /// 创建空缓存。
    pub fn new() -> Self {
        Self {
            instruments: DashMap::new(),
            update_time: RwLock::new(None),
        }
    }

    /// 插入或覆盖单个合约
    pub fn insert(&self, info: InstrumentInfo) {
        self.instruments.insert(info.instrument_id.clone(), info);
    }

    /// # Summary
    /// 以一份完整列表替换缓存内容，并记录刷新时间。
    pub fn replace_all(&self, instruments: Vec<InstrumentInfo>, update_time: DateTime<Utc>) {
        self.instruments.clear();
        for info in instruments {
            self.insert(info);
        }
        *self.update_time.write().unwrap_or_else(|e| e.into_inner()) = Some(update_time);
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn update_time(&self) -> Option<DateTime<Utc>> {
        *self.update_time.read().unwrap_or_else(|e| e.into_inner())
    }

    /// # Summary
    /// 按交易所筛选，结果按合约代码排序。
    pub fn by_exchange(&self, exchange_id: &str) -> Vec<InstrumentInfo> {
        self.filter(|info| info.exchange_id == exchange_id)
    }

    /// # Summary
    /// 按品种筛选，结果按合约代码排序。
    pub fn by_product(&self, product_id: &str) -> Vec<InstrumentInfo> {
        self.filter(|info| info.product_id == product_id)
    }

    /// 全部可交易合约代码（已排序）
    pub fn trading_instruments(&self) -> Vec<String> {
        self.filter(|info| info.is_trading)
            .into_iter()
            .map(|info| info.instrument_id)
            .collect()
    }

    fn filter(&self, predicate: impl Fn(&InstrumentInfo) -> bool) -> Vec<InstrumentInfo> {
        let mut found: Vec<InstrumentInfo> = self
            .instruments
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
        found
    }

    /// # Summary
    /// 从 JSON 缓存文件加载合约信息，替换当前内容。
    ///
    /// # Logic
    /// 1. 读取并解析文件。
    /// 2. 整体替换缓存，刷新时间取文件记录值（缺失时取当前时间）。
    ///
    /// # Arguments
    /// * `path`: 缓存文件路径。
    ///
    /// # Returns
    /// 加载的合约数量；文件不存在或格式错误时返回 `CacheError`。
    pub async fn load_from_file(&self, path: &Path) -> Result<usize, CacheError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| CacheError::Io(format!("{}: {}", path.display(), e)))?;
        let file: CacheFile = serde_json::from_slice(&body)
            .map_err(|e| CacheError::Deserialize(format!("{}: {}", path.display(), e)))?;

        let count = file.instruments.len();
        self.replace_all(file.instruments, file.update_time.unwrap_or_else(Utc::now));
        info!(
            "Loaded {} instruments from {} (updated {:?})",
            count,
            path.display(),
            self.update_time()
        );
        Ok(count)
    }

    /// # Summary
    /// 将当前内容写入 JSON 缓存文件。
    pub async fn save_to_file(&self, path: &Path) -> Result<(), CacheError> {
        let mut instruments: Vec<InstrumentInfo> =
            self.instruments.iter().map(|e| e.value().clone()).collect();
        instruments.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
        let file = CacheFile {
            update_time: self.update_time(),
            total_count: instruments.len(),
            instruments,
        };
        let body =
            serde_json::to_vec_pretty(&file).map_err(|e| CacheError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::Io(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(path, body)
            .await
            .map_err(|e| CacheError::Io(format!("{}: {}", path.display(), e)))?;
        info!("Saved {} instruments to {}", file.total_count, path.display());
        Ok(())
    }
}

impl Default for MemInstrumentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentLookup for MemInstrumentCache {
    fn get(&self, instrument_id: &str) -> Option<InstrumentInfo> {
        self.instruments.get(instrument_id).map(|e| e.value().clone())
    }
}
