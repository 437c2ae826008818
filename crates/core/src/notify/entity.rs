use crate::market::entity::PriceSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 价格告警事件：某物品最新最低价触及或跌破用户设定的目标价。
///
/// # Invariants
/// - `price <= threshold`。
/// - `price` 恒等于 `sample.lowest_price`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub item: String,
    pub price: f64,
    pub threshold: f64,
    // 触发告警的样本
    pub sample: PriceSample,
    pub triggered_at: DateTime<Utc>,
}

impl AlertEvent {
    /// 通知标题
    pub fn subject(&self) -> String {
        format!("Price alert: {}", self.item)
    }

    /// # Summary
    /// 生成通知正文。
    ///
    /// # Logic
    /// 列出当前价、目标价、中位价、成交量与价差，供各推送渠道直接使用。
    pub fn message(&self) -> String {
        format!(
            "{} is at {:.2} (target {:.2})\nmedian {:.2}, volume {}, spread {:.1}%\n{}",
            self.item,
            self.price,
            self.threshold,
            self.sample.median_price,
            self.sample.volume,
            self.sample.spread_percentage,
            self.sample.timestamp.to_rfc3339(),
        )
    }
}
