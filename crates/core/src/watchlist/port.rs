use crate::store::error::StoreError;
use crate::watchlist::entity::WatchlistSnapshot;
use async_trait::async_trait;

/// # Summary
/// 外部维护的自选列表与阈值配置来源。
///
/// # Invariants
/// - 对刷新流程只读。
/// - 每次调用返回独立快照，调用方持有期间不受后续修改影响。
#[async_trait]
pub trait WatchlistSource: Send + Sync {
    /// # Summary
    /// 读取当前自选列表与阈值的快照。
    ///
    /// # Returns
    /// 成功返回快照，读取或解析失败返回 `StoreError`。
    async fn snapshot(&self) -> Result<WatchlistSnapshot, StoreError>;
}
