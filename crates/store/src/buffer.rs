use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Mutex;
use tracing::warn;

/// # Summary
/// 可估算落盘体积的记录，用于缓冲统计与渲染时预分配。
pub trait Weighted {
    /// 渲染成一行 CSV 后的大致字节数
    fn estimated_bytes(&self) -> usize;
}

/// # Summary
/// 单个键的待写入记录序列。
///
/// # Invariants
/// - 刷盘前只追加；刷盘时清空但不删除，保留已分配的容量以便复用。
#[derive(Debug)]
struct BufferEntry<T> {
    // 按到达顺序排列的待写入记录
    records: Vec<T>,
    // 待写入记录的字节估算
    estimated_bytes: usize,
}

impl<T> BufferEntry<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            estimated_bytes: 0,
        }
    }
}

/// # Summary
/// 单个键的缓冲统计快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryStats {
    pub rows: usize,
    pub estimated_bytes: usize,
}

/// # Summary
/// 整个写缓冲的统计快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats<K: Ord> {
    // 各键的待写入情况（包含已清空但仍保留的条目）
    pub entries: BTreeMap<K, EntryStats>,
    // 累计接收行数
    pub total_received: u64,
    // 累计被取走用于刷盘的行数（重新入队的行会被扣回）
    pub total_drained: u64,
}

impl<K: Ord> BufferStats<K> {
    /// 当前待写入总行数
    pub fn pending_rows(&self) -> usize {
        self.entries.values().map(|e| e.rows).sum()
    }

    /// 当前有待写入数据的键数量
    pub fn buffered_keys(&self) -> usize {
        self.entries.values().filter(|e| e.rows > 0).count()
    }
}

struct BufferState<K, T> {
    entries: HashMap<K, BufferEntry<T>>,
    total_received: u64,
    total_drained: u64,
}

/// # Summary
/// 按键聚合的内存写缓冲，所有操作共用一把协调锁。
///
/// # Invariants
/// - 同一个键任意时刻至多对应一个活跃条目。
/// - 锁的作用域是整个缓冲而非单个键；锁只在内存操作期间持有，绝不跨越 IO。
/// - 没有容量上限，`add` 永不丢弃记录；阈值只作为刷盘触发条件。
/// - 同一键内先进先出。
pub struct WriteBuffer<K, T> {
    state: Mutex<BufferState<K, T>>,
}

impl<K, T> Default for WriteBuffer<K, T>
where
    K: Eq + Hash + Ord + Clone,
    T: Weighted,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> WriteBuffer<K, T>
where
    K: Eq + Hash + Ord + Clone,
    T: Weighted,
{
    /// # Summary
    /// 创建空缓冲。
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BufferState {
                entries: HashMap::new(),
                total_received: 0,
                total_drained: 0,
            }),
        }
    }

    /// # Summary
    /// 追加一条记录。
    ///
    /// # Logic
    /// 1. 获取协调锁。
    /// 2. 若键不存在则创建条目。
    /// 3. 追加记录并累加字节估算。
    ///
    /// # Arguments
    /// * `key`: 缓冲键。
    /// * `record`: 待写入记录。
    ///
    /// # Returns
    /// 追加后该键的待写入行数，供调用方与刷盘阈值比较。
    pub fn add(&self, key: K, record: T) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.total_received += 1;
        let entry = state.entries.entry(key).or_insert_with(BufferEntry::new);
        entry.estimated_bytes += record.estimated_bytes();
        entry.records.push(record);
        entry.records.len()
    }

    /// # Summary
    /// 原子地取走某键的全部待写入记录。
    ///
    /// # Logic
    /// 1. 获取协调锁。
    /// 2. 将记录整体移出，条目本身保留在表中以便复用。
    /// 3. 释放锁后，新到达的记录进入同一条目，不会丢失。
    ///
    /// # Returns
    /// 按到达顺序排列的记录；键不存在时返回空集合。
    pub fn drain(&self, key: &K) -> Vec<T> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let drained = match state.entries.get_mut(key) {
            Some(entry) => {
                entry.estimated_bytes = 0;
                entry.records.drain(..).collect::<Vec<_>>()
            }
            None => Vec::new(),
        };
        state.total_drained += drained.len() as u64;
        drained
    }

    /// # Summary
    /// 取走某键的全部待写入记录，包装为必须确定去向的批次。
    ///
    /// # Logic
    /// 1. 与 `drain` 相同地原子取出记录。
    /// 2. 返回的批次在未确定去向时被释放，会自动放回该键头部。
    pub fn drain_batch(&self, key: &K) -> DrainedBatch<'_, K, T> {
        DrainedBatch {
            buffer: self,
            key: key.clone(),
            records: self.drain(key),
        }
    }

    /// # Summary
    /// 将写入失败的批次放回缓冲头部。
    ///
    /// # Logic
    /// 1. 获取协调锁。
    /// 2. 失败批次排在刷盘期间新到达的记录之前，保持该键的先进先出。
    ///
    /// # Returns
    /// 放回后该键的待写入行数。
    pub fn requeue(&self, key: K, records: Vec<T>) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let count = records.len() as u64;
        state.total_drained = state.total_drained.saturating_sub(count);
        let entry = state.entries.entry(key).or_insert_with(BufferEntry::new);
        entry.estimated_bytes += records.iter().map(Weighted::estimated_bytes).sum::<usize>();
        let newer = std::mem::replace(&mut entry.records, records);
        entry.records.extend(newer);
        entry.records.len()
    }

    /// # Summary
    /// 返回当前有待写入数据的键。
    pub fn pending_keys(&self) -> Vec<K> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.records.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// # Summary
    /// 生成统计快照，不修改任何状态。
    pub fn snapshot_stats(&self) -> BufferStats<K> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let entries = state
            .entries
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    EntryStats {
                        rows: entry.records.len(),
                        estimated_bytes: entry.estimated_bytes,
                    },
                )
            })
            .collect();
        BufferStats {
            entries,
            total_received: state.total_received,
            total_drained: state.total_drained,
        }
    }
}

/// # Summary
/// 已从缓冲取出、尚未确定去向的批次。
///
/// # Invariants
/// - 去向只有三种：`settle`（已写入、已转交或明确放弃）、`requeue`、被释放时自动放回。
/// - 刷盘 future 在写入途中被取消时，批次经由 `Drop` 回到该键头部，不会凭空消失。
pub struct DrainedBatch<'a, K, T>
where
    K: Eq + Hash + Ord + Clone,
    T: Weighted,
{
    buffer: &'a WriteBuffer<K, T>,
    key: K,
    records: Vec<T>,
}

impl<K, T> DrainedBatch<'_, K, T>
where
    K: Eq + Hash + Ord + Clone,
    T: Weighted,
{
    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 批次已有去向，不再放回缓冲
    pub fn settle(mut self) {
        self.records.clear();
    }

    /// 放回缓冲头部，返回放回后该键的待写入行数
    pub fn requeue(mut self) -> usize {
        let records = std::mem::take(&mut self.records);
        self.buffer.requeue(self.key.clone(), records)
    }
}

impl<K, T> Drop for DrainedBatch<'_, K, T>
where
    K: Eq + Hash + Ord + Clone,
    T: Weighted,
{
    fn drop(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let records = std::mem::take(&mut self.records);
        let count = records.len();
        self.buffer.requeue(self.key.clone(), records);
        warn!("Unsettled batch of {} rows returned to buffer", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Weighted for u32 {
        fn estimated_bytes(&self) -> usize {
            4
        }
    }

    #[test]
    fn test_add_returns_entry_size_per_key() {
        let buffer = WriteBuffer::<&str, u32>::new();
        assert_eq!(buffer.add("a", 1), 1);
        assert_eq!(buffer.add("a", 2), 2);
        assert_eq!(buffer.add("b", 3), 1);
        let stats = buffer.snapshot_stats();
        assert_eq!(stats.entries["a"].rows, 2);
        assert_eq!(stats.entries["a"].estimated_bytes, 8);
        assert_eq!(stats.pending_rows(), 3);
        assert_eq!(stats.total_received, 3);
    }

    #[test]
    fn test_drain_keeps_entry_and_accepts_new_records() {
        let buffer = WriteBuffer::<&str, u32>::new();
        buffer.add("a", 1);
        buffer.add("a", 2);
        assert_eq!(buffer.drain(&"a"), vec![1, 2]);

        // 条目清空但仍保留
        let stats = buffer.snapshot_stats();
        assert_eq!(stats.entries.len(), 1);
        assert_eq!(stats.entries["a"], EntryStats::default());
        assert!(buffer.pending_keys().is_empty());

        assert_eq!(buffer.add("a", 3), 1);
        assert_eq!(buffer.drain(&"a"), vec![3]);
        assert!(buffer.drain(&"missing").is_empty());
    }

    #[test]
    fn test_drain_then_readd_is_lossless_fifo() {
        let buffer = WriteBuffer::<&str, u32>::new();
        let input: Vec<u32> = (0..50).collect();
        for v in &input {
            buffer.add("k", *v);
        }
        let first = buffer.drain(&"k");
        for v in &first {
            buffer.add("k", *v);
        }
        let second = buffer.drain(&"k");
        assert_eq!(first, input);
        assert_eq!(second, input);
    }

    #[test]
    fn test_requeue_goes_before_newer_records() {
        let buffer = WriteBuffer::<&str, u32>::new();
        buffer.add("k", 1);
        buffer.add("k", 2);
        let batch = buffer.drain(&"k");
        // 刷盘期间新到达
        buffer.add("k", 3);
        assert_eq!(buffer.requeue("k", batch), 3);
        assert_eq!(buffer.drain(&"k"), vec![1, 2, 3]);
        let stats = buffer.snapshot_stats();
        assert_eq!(stats.total_received, 3);
        assert_eq!(stats.total_drained, 3);
    }

    #[test]
    fn test_unsettled_batch_returns_to_buffer_head() {
        let buffer = WriteBuffer::<&str, u32>::new();
        buffer.add("k", 1);
        buffer.add("k", 2);
        let batch = buffer.drain_batch(&"k");
        assert_eq!(batch.records(), &[1, 2]);
        buffer.add("k", 3);
        drop(batch);
        assert_eq!(buffer.drain(&"k"), vec![1, 2, 3]);

        buffer.add("k", 4);
        buffer.drain_batch(&"k").settle();
        assert!(buffer.pending_keys().is_empty());

        buffer.add("k", 5);
        let batch = buffer.drain_batch(&"k");
        buffer.add("k", 6);
        assert_eq!(batch.requeue(), 2);
        assert_eq!(buffer.drain(&"k"), vec![5, 6]);
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let buffer = std::sync::Arc::new(WriteBuffer::<u32, u32>::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buffer.add(t % 2, i);
                    }
                })
            })
            .collect();
        let mut drained = 0;
        for _ in 0..10 {
            drained += buffer.drain(&0).len() + buffer.drain(&1).len();
        }
        for h in handles {
            h.join().unwrap();
        }
        drained += buffer.drain(&0).len() + buffer.drain(&1).len();
        assert_eq!(drained, 1000);
    }
}
