use super::error::StoreError;
use crate::market::entity::PriceSample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 历史查询条件。
///
/// # Invariants
/// - `start` 与 `end` 均为闭区间端点，缺省表示不限。
/// - `limit` 保留最新的 N 条，结果仍按时间升序返回。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// 不限时间范围的完整历史
    pub fn all() -> Self {
        Self::default()
    }

    /// 从指定时刻起至今
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            ..Self::default()
        }
    }

    /// 闭区间 `[start, end]`
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            limit: None,
        }
    }

    /// 仅保留最新的 `limit` 条
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 判断时间戳是否落在查询区间内
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| ts >= s) && self.end.is_none_or(|e| ts <= e)
    }
}

/// # Summary
/// 单个物品的记录数统计。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecordCount {
    pub item: String,
    pub records: u64,
}

/// # Summary
/// 存储整体统计信息，用于启动诊断与 `db-stats` 命令。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_records: u64,
    pub unique_items: u64,
    pub first_record: Option<DateTime<Utc>>,
    pub last_record: Option<DateTime<Utc>>,
    pub schema_version: u32,
    // 记录数最多的前 5 个物品
    pub top_items: Vec<ItemRecordCount>,
}

/// # Summary
/// 价格样本存储接口，负责样本的追加写入与读取。
///
/// # Invariants
/// - 只追加，不修改已写入的样本。
/// - 单条写入原子化，并发写入不会交错出半行数据。
/// - 违反非负或中位价不变量的样本在写入时被拒绝。
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// # Summary
    /// 追加一条价格样本。
    ///
    /// # Logic
    /// 1. 校验样本不变量。
    /// 2. 在事务内确认时间戳不早于该物品最新样本。
    /// 3. 插入一行并提交。
    ///
    /// # Arguments
    /// * `sample`: 待写入的样本。
    ///
    /// # Returns
    /// 成功返回 Ok，校验失败返回 `StoreError::Validation`。
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError>;

    /// # Summary
    /// 获取物品的最新样本。
    ///
    /// # Arguments
    /// * `item`: 物品名称。
    ///
    /// # Returns
    /// 无历史时返回 `None`。
    async fn latest(&self, item: &str) -> Result<Option<PriceSample>, StoreError>;

    /// # Summary
    /// 按时间区间读取物品历史。
    ///
    /// # Logic
    /// 1. 按区间过滤。
    /// 2. 若设置 limit，仅保留最新的 N 条。
    /// 3. 按时间升序（同一时间按写入顺序）返回。
    ///
    /// # Arguments
    /// * `item`: 物品名称。
    /// * `query`: 查询条件。
    ///
    /// # Returns
    /// 样本列表，未知物品返回空列表。
    async fn history(&self, item: &str, query: &HistoryQuery) -> Result<Vec<PriceSample>, StoreError>;

    /// # Summary
    /// 保留期清理：删除早于截止时间的样本。
    ///
    /// # Arguments
    /// * `cutoff`: 截止时间（不含）。
    ///
    /// # Returns
    /// 删除的行数。
    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// # Summary
    /// 汇总存储统计信息。
    async fn statistics(&self) -> Result<StoreStatistics, StoreError>;
}
