//! 测试替身：内存实现的行情源、存储、自选列表与通知通道。

use crate::market::entity::{MarketQuote, PriceSample};
use crate::market::error::MarketError;
use crate::market::port::PriceProvider;
use crate::notify::error::NotifyError;
use crate::notify::port::Notifier;
use crate::store::error::StoreError;
use crate::store::port::{HistoryQuery, ItemRecordCount, PriceStore, StoreStatistics};
use crate::watchlist::entity::WatchlistSnapshot;
use crate::watchlist::port::WatchlistSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// # Summary
/// 可编排的行情源替身。
///
/// # Invariants
/// - 每个物品的响应按入队顺序消费，队列耗尽后返回 `fallback`。
/// - 每次调用都会记录物品名与（tokio 虚拟时钟下的）起始时刻。
pub struct MockPriceProvider {
    scripts: DashMap<String, VecDeque<Result<MarketQuote, MarketError>>>,
    fallback: Result<MarketQuote, MarketError>,
    latency: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl MockPriceProvider {
    /// 所有物品默认返回同一报价
    pub fn new(fallback: MarketQuote) -> Self {
        Self {
            scripts: DashMap::new(),
            fallback: Ok(fallback),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 模拟每次请求的耗时
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 为物品追加一条预设响应
    pub fn push(&self, item: &str, result: Result<MarketQuote, MarketError>) {
        self.scripts.entry(item.to_string()).or_default().push_back(result);
    }

    /// 已发起的调用（物品名，起始时刻）
    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl PriceProvider for MockPriceProvider {
    async fn fetch_quote(&self, item: &str) -> Result<MarketQuote, MarketError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((item.to_string(), Instant::now()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.scripts
            .get_mut(item)
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// # Summary
/// 基于内存的价格存储，执行与 SQLite 实现相同的写入校验。
pub struct MemPriceStore {
    rows: Mutex<Vec<PriceSample>>,
    failing: DashSet<String>,
}

impl MemPriceStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            failing: DashSet::new(),
        }
    }

    /// 让指定物品的写入返回数据库错误
    pub fn fail_writes_for(&self, item: &str) {
        self.failing.insert(item.to_string());
    }

    /// 全部已写入样本（按写入顺序）
    pub fn rows(&self) -> Vec<PriceSample> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MemPriceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceStore for MemPriceStore {
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError> {
        sample.validate().map_err(StoreError::Validation)?;
        if self.failing.contains(&sample.item) {
            return Err(StoreError::Database("simulated write failure".into()));
        }

        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = rows.iter().rev().find(|r| r.item == sample.item)
            && sample.timestamp < last.timestamp
        {
            return Err(StoreError::Validation(format!(
                "timestamp {} precedes latest sample {}",
                sample.timestamp, last.timestamp
            )));
        }
        rows.push(sample.clone());
        Ok(())
    }

    async fn latest(&self, item: &str) -> Result<Option<PriceSample>, StoreError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(rows.iter().rev().find(|r| r.item == item).cloned())
    }

    async fn history(&self, item: &str, query: &HistoryQuery) -> Result<Vec<PriceSample>, StoreError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut matched: Vec<PriceSample> = rows
            .iter()
            .filter(|r| r.item == item && query.contains(r.timestamp))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        Ok(matched)
    }

    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();
        rows.retain(|r| r.timestamp >= cutoff);
        Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
    }

    async fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut counts: HashMap<String, u64> = HashMap::new();
        for row in rows.iter() {
            *counts.entry(row.item.clone()).or_default() += 1;
        }
        let mut top_items: Vec<ItemRecordCount> = counts
            .iter()
            .map(|(item, records)| ItemRecordCount {
                item: item.clone(),
                records: *records,
            })
            .collect();
        top_items.sort_by(|a, b| b.records.cmp(&a.records).then_with(|| a.item.cmp(&b.item)));
        top_items.truncate(5);

        Ok(StoreStatistics {
            total_records: u64::try_from(rows.len()).unwrap_or(u64::MAX),
            unique_items: u64::try_from(counts.len()).unwrap_or(u64::MAX),
            first_record: rows.iter().map(|r| r.timestamp).min(),
            last_record: rows.iter().map(|r| r.timestamp).max(),
            schema_version: 0,
            top_items,
        })
    }
}

/// # Summary
/// 可在测试中随时替换内容的自选列表。
pub struct StaticWatchlist {
    snapshot: Mutex<WatchlistSnapshot>,
}

impl StaticWatchlist {
    pub fn new(items: &[&str], thresholds: &[(&str, f64)]) -> Self {
        Self {
            snapshot: Mutex::new(WatchlistSnapshot::new(
                items.iter().map(|s| s.to_string()).collect(),
                thresholds.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            )),
        }
    }

    pub fn replace(&self, snapshot: WatchlistSnapshot) {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }
}

#[async_trait]
impl WatchlistSource for StaticWatchlist {
    async fn snapshot(&self) -> Result<WatchlistSnapshot, StoreError> {
        Ok(self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// # Summary
/// 记录所有投递内容的通知通道，可配置为总是失败。
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Network("simulated outage".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((subject.to_string(), content.to_string()));
        Ok(())
    }
}
