use crate::parse::{parse_price, parse_volume};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use skintrack_core::config::FeedConfig;
use skintrack_core::market::entity::MarketQuote;
use skintrack_core::market::error::MarketError;
use skintrack_core::market::port::PriceProvider;
use tracing::{debug, warn};

/// # Summary
/// Steam 社区市场价格概览接口的行情提供者实现。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯，超时与请求头在构造时固定。
/// - 每次 `fetch_quote` 只发起一次请求，不做内部重试。
#[derive(Clone)]
pub struct SteamMarketProvider {
    /// 内部使用的 HTTP 客户端
    client: Client,
    base_url: String,
    app_id: String,
    currency: String,
}

impl SteamMarketProvider {
    /// # Summary
    /// 按配置创建 SteamMarketProvider。
    ///
    /// # Logic
    /// 1. 设置 User-Agent、Accept 与 Accept-Language 请求头。
    /// 2. 配置请求超时。
    /// 3. 初始化 reqwest 客户端。
    ///
    /// # Arguments
    /// * `config`: 上游接口配置。
    ///
    /// # Returns
    /// 成功返回提供者实例，请求头非法或客户端构建失败返回 `MarketError::Validation`。
    pub fn new(config: &FeedConfig) -> Result<Self, MarketError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !config.accept_language.is_empty() {
            headers.insert(ACCEPT_LANGUAGE, header_value(&config.accept_language)?);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| MarketError::Validation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            app_id: config.app_id.clone(),
            currency: config.currency.clone(),
        })
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, MarketError> {
    HeaderValue::from_str(raw)
        .map_err(|e| MarketError::Validation(format!("invalid header value '{}': {}", raw, e)))
}

/// # Summary
/// 价格概览接口响应结构。
///
/// # Invariants
/// - 价格与成交量均为按区域格式化的字符串，缺失字段反序列化为 `None`。
#[derive(Deserialize, Debug)]
struct PriceOverview {
    #[serde(default)]
    success: bool,
    lowest_price: Option<String>,
    median_price: Option<String>,
    volume: Option<String>,
}

impl PriceOverview {
    /// 将原始字符串字段转换为报价，任一字段失败则整体拒绝
    fn into_quote(self, item: &str) -> Result<MarketQuote, MarketError> {
        if !self.success {
            return Err(MarketError::UpstreamData(format!(
                "market reported failure for '{}'",
                item
            )));
        }

        let lowest_raw = self.lowest_price.ok_or_else(|| {
            MarketError::UpstreamData(format!("no lowest price listed for '{}'", item))
        })?;
        let lowest = parse_price(&lowest_raw)?;
        let median = match self.median_price {
            Some(raw) => parse_price(&raw)?,
            None => 0.0,
        };
        let volume = match self.volume {
            Some(raw) => parse_volume(&raw)?,
            None => 0,
        };

        let quote = MarketQuote::new(lowest, median, volume);
        if !quote.has_valid_data() {
            return Err(MarketError::UpstreamData(format!(
                "no active listings for '{}'",
                item
            )));
        }
        Ok(quote)
    }
}

/// 429 与 5xx 视为瞬时网络错误，其余非成功状态视为上游数据不可用
fn classify_status(status: StatusCode, item: &str) -> MarketError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(item = %item, "rate limited by market (HTTP 429), consider a longer request delay");
        MarketError::Network(format!("HTTP {}", status))
    } else if status.is_server_error() {
        MarketError::Network(format!("HTTP {}", status))
    } else {
        MarketError::UpstreamData(format!("HTTP {}", status))
    }
}

#[async_trait]
impl PriceProvider for SteamMarketProvider {
    /// # Summary
    /// 抓取单个物品的价格概览。
    ///
    /// # Logic
    /// 1. 物品名去空白后为空直接拒绝，不发请求。
    /// 2. 以 appid、currency、market_hash_name 为查询参数发起 GET。
    /// 3. 按状态码分类错误。
    /// 4. 解析 JSON 并将本地化字符串转换为报价。
    ///
    /// # Arguments
    /// * `item`: 物品显示名称。
    ///
    /// # Returns
    /// 成功返回 `MarketQuote`，失败返回 `MarketError`。
    async fn fetch_quote(&self, item: &str) -> Result<MarketQuote, MarketError> {
        let item = item.trim();
        if item.is_empty() {
            return Err(MarketError::Validation("item name is empty".into()));
        }

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("appid", self.app_id.as_str()),
                ("currency", self.currency.as_str()),
                ("market_hash_name", item),
            ])
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, item));
        }

        let overview: PriceOverview = resp
            .json()
            .await
            .map_err(|e| MarketError::UpstreamData(format!("malformed response: {}", e)))?;
        debug!(item = %item, ?overview, "price overview received");

        overview.into_quote(item)
    }
}
