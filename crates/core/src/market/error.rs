use thiserror::Error;

/// # Summary
/// 行情抓取域错误枚举，区分瞬时网络故障、上游数据缺失与字段校验失败。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
/// - 只有 `Network` 属于可在下一轮重试的瞬时错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    // 网络层错误：连接失败、超时、限流或服务端 5xx
    #[error("Network error: {0}")]
    Network(String),
    // 响应结构正常但标记失败、缺少字段或没有可用挂单
    #[error("Upstream data unavailable: {0}")]
    UpstreamData(String),
    // 字段解析或输入校验失败，整条报价被拒绝
    #[error("Validation error: {0}")]
    Validation(String),
}

impl MarketError {
    /// 是否为瞬时错误（调用方可跳过并继续）
    pub fn is_transient(&self) -> bool {
        matches!(self, MarketError::Network(_))
    }
}
