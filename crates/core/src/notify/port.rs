use crate::notify::error::NotifyError;
use async_trait::async_trait;

/// # Summary
/// 价格告警的外部投递通道。
///
/// # Invariants
/// - 实现必须是 `Send` 和 `Sync`，告警分发器会跨任务共享同一实例。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 通道名称，用于日志定位投递失败的渠道。
    fn name(&self) -> &str;

    /// # Summary
    /// 投递一条带标题与正文的通知。
    ///
    /// # Logic
    /// 1. 按目标平台格式化消息。
    /// 2. 通过底层传输发送。
    ///
    /// # Arguments
    /// * `subject` - 通知标题。
    /// * `content` - 通知正文。
    ///
    /// # Returns
    /// * 成功返回 `Ok(())`，失败返回 `Err(NotifyError)`。
    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError>;
}
