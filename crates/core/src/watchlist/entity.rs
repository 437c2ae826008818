use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// # Summary
/// 自选列表与告警阈值在某一时刻的不可变快照。
///
/// # Invariants
/// - 后台刷新在每轮开始时获取一次快照，本轮内不再读取外部配置。
/// - 对外部配置的修改只在下一轮生效。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchlistSnapshot {
    // 按用户添加顺序排列的物品名
    pub items: Vec<String>,
    // 物品名 -> 目标价
    pub thresholds: HashMap<String, f64>,
}

impl WatchlistSnapshot {
    pub fn new(items: Vec<String>, thresholds: HashMap<String, f64>) -> Self {
        Self { items, thresholds }
    }

    /// 查询物品的目标价
    pub fn threshold(&self, item: &str) -> Option<f64> {
        self.thresholds.get(item).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
