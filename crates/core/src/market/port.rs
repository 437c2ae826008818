use crate::market::entity::MarketQuote;
use crate::market::error::MarketError;
use async_trait::async_trait;

/// # Summary
/// 市场价格提供者接口（原始数据源）。
///
/// # Invariants
/// - 每次调用恰好发起一次出站请求，不做内部重试。
/// - 任意字段解析失败时整条报价被拒绝，不返回部分数据。
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// # Summary
    /// 抓取单个物品的当前报价。
    ///
    /// # Logic
    /// 1. 校验物品名非空。
    /// 2. 构建带市场标识与币种参数的请求。
    /// 3. 执行网络请求并解析本地化价格字符串。
    ///
    /// # Arguments
    /// * `item`: 物品显示名称。
    ///
    /// # Returns
    /// 成功返回 `MarketQuote`，失败返回 `MarketError`。
    async fn fetch_quote(&self, item: &str) -> Result<MarketQuote, MarketError>;
}
