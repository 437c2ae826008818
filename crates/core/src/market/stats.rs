use crate::market::entity::PriceSample;
use serde::{Deserialize, Serialize};

/// 判定趋势为平稳的最大均值差
const STABLE_EPSILON: f64 = 0.01;

/// # Summary
/// 价格走势方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
    Stable,
    InsufficientData,
}

/// # Summary
/// 基于最低价序列的统计摘要。
///
/// # Invariants
/// - `min <= average <= max`，`range = max - min`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub range: f64,
    pub latest: f64,
    pub trend: Trend,
    // 后半段均值减去前半段均值
    pub trend_change: f64,
}

impl PriceStatistics {
    /// # Summary
    /// 由按时间升序排列的样本计算统计摘要。
    ///
    /// # Logic
    /// 1. 提取各样本的最低价。
    /// 2. 计算最小、最大、均值、极差与最新值。
    /// 3. 将序列对半切分，比较前后两段均值得出趋势。
    ///
    /// # Arguments
    /// * `samples`: 时间升序的价格样本。
    ///
    /// # Returns
    /// 样本为空时返回 `None`。
    pub fn from_samples(samples: &[PriceSample]) -> Option<Self> {
        let prices: Vec<f64> = samples.iter().map(|s| s.lowest_price).collect();
        let latest = *prices.last()?;

        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let average = mean(&prices);

        let (trend, trend_change) = if prices.len() >= 2 {
            let (first, second) = prices.split_at(prices.len() / 2);
            let change = mean(second) - mean(first);
            let trend = if change.abs() < STABLE_EPSILON {
                Trend::Stable
            } else if change > 0.0 {
                Trend::Rising
            } else {
                Trend::Falling
            };
            (trend, change)
        } else {
            (Trend::InsufficientData, 0.0)
        };

        Some(Self {
            count: prices.len(),
            min,
            max,
            average,
            range: max - min,
            latest,
            trend,
            trend_change,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let len = u32::try_from(values.len()).map(f64::from).unwrap_or(f64::from(u32::MAX));
    values.iter().sum::<f64>() / len
}
