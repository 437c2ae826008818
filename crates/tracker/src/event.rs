use skintrack_core::market::entity::PriceSample;
use skintrack_core::notify::entity::AlertEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// 刷新轮次的触发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    Manual,
    Automatic,
}

/// # Summary
/// 单个物品在一轮刷新中的处理结果。
///
/// # Invariants
/// - 除 `Stored` 外的状态都不会中断本轮其余物品。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    // 样本已写入
    Stored,
    // 网络或上游数据问题，下一轮再试
    Skipped(String),
    // 报价字段校验失败，整条丢弃
    Rejected(String),
    // 存储写入失败
    StoreFailed(String),
}

impl ItemStatus {
    pub fn is_stored(&self) -> bool {
        matches!(self, ItemStatus::Stored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub item: String,
    pub status: ItemStatus,
}

/// # Summary
/// 一轮刷新的汇总报告。
///
/// # Invariants
/// - `outcomes` 按处理顺序排列，`successful` 等于其中 `Stored` 的数量。
/// - `cancelled` 为真时 `outcomes.len() < total`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub mode: CycleMode,
    pub total: usize,
    pub successful: usize,
    pub outcomes: Vec<ItemOutcome>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// # Summary
/// 后台刷新向前台推送的事件。
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    CycleStarted { total: usize, mode: CycleMode },
    // `index` 从 1 开始
    Progress { index: usize, total: usize, item: String },
    SampleStored(PriceSample),
    ItemFailed { item: String, status: ItemStatus },
    Alert(AlertEvent),
    CycleCompleted(CycleReport),
}

pub type EventSender = mpsc::UnboundedSender<TrackerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TrackerEvent>;

/// 创建事件通道
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// 推送事件；接收端已关闭时静默丢弃
pub(crate) fn emit(events: &EventSender, event: TrackerEvent) {
    if events.send(event).is_err() {
        trace!("event receiver closed, dropping event");
    }
}
