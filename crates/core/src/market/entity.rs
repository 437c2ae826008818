use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单次行情抓取的结构化结果（尚未绑定物品与时间）。
///
/// # Invariants
/// - 所有价格字段均为有限非负数。
/// - `median_price` 为 0 表示上游未给出中位价。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    // 当前最低挂单价
    pub lowest_price: f64,
    // 近期成交中位价
    pub median_price: f64,
    // 24 小时成交量
    pub volume: u64,
    // 中位价与最低价的绝对差
    pub spread_absolute: f64,
    // 绝对差相对最低价的百分比
    pub spread_percentage: f64,
}

impl MarketQuote {
    /// # Summary
    /// 由最低价、中位价与成交量构造报价，并计算价差指标。
    ///
    /// # Logic
    /// 1. 两个价格均大于 0 时，绝对价差为二者之差的绝对值，否则为 0。
    /// 2. 最低价大于 0 时，百分比价差 = 绝对价差 / 最低价 * 100，否则为 0。
    ///
    /// # Arguments
    /// * `lowest_price`: 最低挂单价。
    /// * `median_price`: 成交中位价（未知时为 0）。
    /// * `volume`: 成交量。
    ///
    /// # Returns
    /// 完整的 `MarketQuote`。
    pub fn new(lowest_price: f64, median_price: f64, volume: u64) -> Self {
        let spread_absolute = if lowest_price > 0.0 && median_price > 0.0 {
            (median_price - lowest_price).abs()
        } else {
            0.0
        };
        let spread_percentage = if lowest_price > 0.0 && spread_absolute > 0.0 {
            spread_absolute / lowest_price * 100.0
        } else {
            0.0
        };

        Self {
            lowest_price,
            median_price,
            volume,
            spread_absolute,
            spread_percentage,
        }
    }

    /// 报价是否可用：需要有挂单价且有成交。
    pub fn has_valid_data(&self) -> bool {
        self.lowest_price > 0.0 && self.volume > 0
    }

    /// 绑定物品名与采样时间，生成待持久化的价格样本。
    pub fn into_sample(self, item: impl Into<String>, timestamp: DateTime<Utc>) -> PriceSample {
        PriceSample {
            item: item.into(),
            timestamp,
            lowest_price: self.lowest_price,
            median_price: self.median_price,
            volume: self.volume,
            spread_absolute: self.spread_absolute,
            spread_percentage: self.spread_percentage,
        }
    }
}

/// # Summary
/// 价格样本实体，记录某一物品在某一时刻的一次抓取结果。
///
/// # Invariants
/// - 写入后不可变，只会被更新的样本取代。
/// - 同一物品的样本按时间单调不减追加。
/// - `median_price == 0` 或 `median_price >= lowest_price`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    // 物品显示名称
    pub item: String,
    // 采样时间
    pub timestamp: DateTime<Utc>,
    // 最低挂单价
    pub lowest_price: f64,
    // 成交中位价
    pub median_price: f64,
    // 成交量
    pub volume: u64,
    // 绝对价差
    pub spread_absolute: f64,
    // 百分比价差
    pub spread_percentage: f64,
}

impl PriceSample {
    /// # Summary
    /// 校验样本是否满足存储层不变量。
    ///
    /// # Logic
    /// 1. 物品名不可为空白。
    /// 2. 所有价格字段必须是有限非负数。
    /// 3. 中位价非 0 时不得低于最低价。
    ///
    /// # Returns
    /// 合法返回 `Ok(())`，否则返回描述违规原因的字符串。
    pub fn validate(&self) -> Result<(), String> {
        if self.item.trim().is_empty() {
            return Err("item name must not be empty".into());
        }

        let fields = [
            ("lowest_price", self.lowest_price),
            ("median_price", self.median_price),
            ("spread_absolute", self.spread_absolute),
            ("spread_percentage", self.spread_percentage),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a finite non-negative number, got {}", name, value));
            }
        }

        if self.median_price != 0.0 && self.median_price < self.lowest_price {
            return Err(format!(
                "median_price {} is below lowest_price {}",
                self.median_price, self.lowest_price
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_spread_metrics() {
        let quote = MarketQuote::new(24.50, 25.30, 145);
        assert!((quote.spread_absolute - 0.80).abs() < 1e-9);
        assert!((quote.spread_percentage - 3.265_306).abs() < 1e-4);
        assert!(quote.has_valid_data());
    }

    #[test]
    fn test_quote_without_median_has_no_spread() {
        let quote = MarketQuote::new(10.0, 0.0, 3);
        assert_eq!(quote.spread_absolute, 0.0);
        assert_eq!(quote.spread_percentage, 0.0);
    }

    #[test]
    fn test_quote_without_volume_is_not_usable() {
        assert!(!MarketQuote::new(10.0, 11.0, 0).has_valid_data());
        assert!(!MarketQuote::new(0.0, 11.0, 4).has_valid_data());
    }

    #[test]
    fn test_sample_validation() {
        let ok = MarketQuote::new(10.0, 12.0, 5).into_sample("AK-47 | Redline (Field-Tested)", Utc::now());
        assert!(ok.validate().is_ok());

        let unknown_median = MarketQuote::new(10.0, 0.0, 5).into_sample("x", Utc::now());
        assert!(unknown_median.validate().is_ok());

        let mut below = ok.clone();
        below.median_price = 9.0;
        assert!(below.validate().is_err());

        let mut negative = ok.clone();
        negative.lowest_price = -1.0;
        assert!(negative.validate().is_err());

        let mut nan = ok.clone();
        nan.spread_percentage = f64::NAN;
        assert!(nan.validate().is_err());

        let mut blank = ok;
        blank.item = "   ".into();
        assert!(blank.validate().is_err());
    }
}
