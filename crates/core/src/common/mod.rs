pub mod time;

use serde::{Deserialize, Serialize};
use std::fmt;

/// # Summary
/// 被追踪物品实体，以显示名称作为唯一标识。
///
/// # Invariants
/// - `name` 已去除首尾空白且非空。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackedItem {
    name: String,
}

impl TrackedItem {
    /// # Summary
    /// 由用户输入构造物品标识。
    ///
    /// # Logic
    /// 1. 去除首尾空白。
    /// 2. 空名称视为非法。
    ///
    /// # Arguments
    /// * `raw`: 原始名称。
    ///
    /// # Returns
    /// 合法时返回 `Some(TrackedItem)`，否则返回 `None`。
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            name: trimmed.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl TryFrom<String> for TrackedItem {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| "item name must not be empty".to_string())
    }
}

impl From<TrackedItem> for String {
    fn from(item: TrackedItem) -> Self {
        item.name
    }
}

impl fmt::Display for TrackedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
