use crate::alert::{AlertChecker, AlertDispatcher};
use crate::event::{CycleMode, CycleReport, EventSender, ItemOutcome, ItemStatus, TrackerEvent, emit};
use skintrack_core::common::time::TimeProvider;
use skintrack_core::market::entity::PriceSample;
use skintrack_core::market::error::MarketError;
use skintrack_core::market::port::PriceProvider;
use skintrack_core::store::port::PriceStore;
use skintrack_core::watchlist::entity::WatchlistSnapshot;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// # Summary
/// 单轮刷新执行器：顺序抓取、持久化并检查告警。
///
/// # Invariants
/// - 同一时刻至多一个出站请求。
/// - 相邻两次请求的起始时刻间隔不小于 `min_delay`，跨轮次同样成立。
/// - 单个物品失败不会中断本轮。
pub struct Refresher {
    provider: Arc<dyn PriceProvider>,
    store: Arc<dyn PriceStore>,
    clock: Arc<dyn TimeProvider>,
    checker: AlertChecker,
    dispatcher: AlertDispatcher,
    min_delay: Duration,
    // 上一次请求的起始时刻
    last_call: Mutex<Option<Instant>>,
}

impl Refresher {
    pub fn new(
        provider: Arc<dyn PriceProvider>,
        store: Arc<dyn PriceStore>,
        clock: Arc<dyn TimeProvider>,
        checker: AlertChecker,
        dispatcher: AlertDispatcher,
        min_delay: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            checker,
            dispatcher,
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// # Summary
    /// 执行一轮刷新。
    ///
    /// # Logic
    /// 1. 每个物品处理前检查停止信号。
    /// 2. 等待到 `上次请求起始 + min_delay`，等待期间同样响应停止信号。
    /// 3. 抓取报价，以时钟时间生成样本并写入存储。
    /// 4. 写入成功后检查告警并分发。
    /// 5. 失败按类型归类为跳过、拒绝或存储失败，继续下一个物品。
    ///
    /// # Arguments
    /// * `snapshot`: 本轮使用的自选列表快照。
    /// * `mode`: 触发方式。
    /// * `stop`: 停止信号，值为 `true` 时在下一个物品前结束。
    /// * `events`: 事件通道。
    ///
    /// # Returns
    /// 本轮汇总报告。
    pub async fn run_cycle(
        &self,
        snapshot: &WatchlistSnapshot,
        mode: CycleMode,
        stop: &mut watch::Receiver<bool>,
        events: &EventSender,
    ) -> CycleReport {
        let started = Instant::now();
        let total = snapshot.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut cancelled = false;

        emit(events, TrackerEvent::CycleStarted { total, mode });

        for (index, item) in snapshot.items.iter().enumerate() {
            let stop_now = *stop.borrow();
            if stop_now || !self.wait_for_slot(stop).await {
                info!(processed = index, total, "Refresh cycle stopped");
                cancelled = true;
                break;
            }

            emit(
                events,
                TrackerEvent::Progress {
                    index: index + 1,
                    total,
                    item: item.clone(),
                },
            );

            let status = self.refresh_item(item, snapshot, events).await;
            if !status.is_stored() {
                emit(
                    events,
                    TrackerEvent::ItemFailed {
                        item: item.clone(),
                        status: status.clone(),
                    },
                );
            }
            outcomes.push(ItemOutcome {
                item: item.clone(),
                status,
            });
        }

        let successful = outcomes.iter().filter(|o| o.status.is_stored()).count();
        let report = CycleReport {
            mode,
            total,
            successful,
            outcomes,
            cancelled,
            elapsed: started.elapsed(),
        };
        info!(
            ?mode,
            successful,
            total,
            cancelled,
            elapsed_ms = report.elapsed.as_millis(),
            "Refresh cycle completed"
        );
        emit(events, TrackerEvent::CycleCompleted(report.clone()));
        report
    }

    async fn refresh_item(&self, item: &str, snapshot: &WatchlistSnapshot, events: &EventSender) -> ItemStatus {
        self.mark_call_start();

        let quote = match self.provider.fetch_quote(item).await {
            Ok(quote) => quote,
            Err(MarketError::Validation(reason)) => {
                warn!(item = %item, "Quote rejected: {}", reason);
                return ItemStatus::Rejected(reason);
            }
            Err(e) => {
                warn!(item = %item, "Quote skipped: {}", e);
                return ItemStatus::Skipped(e.to_string());
            }
        };
        debug!(item = %item, price = quote.lowest_price, volume = quote.volume, "Quote fetched");

        let threshold = snapshot.threshold(item);
        let previous = match threshold {
            Some(_) => self.previous_sample(item).await,
            None => None,
        };

        let sample = quote.into_sample(item, self.clock.now());
        if let Err(e) = self.store.append(&sample).await {
            error!(item = %item, "Failed to persist sample: {}", e);
            return ItemStatus::StoreFailed(e.to_string());
        }
        emit(events, TrackerEvent::SampleStored(sample.clone()));

        if let Some(alert) = self
            .checker
            .check(&sample, previous.as_ref(), threshold, self.clock.now())
        {
            self.dispatcher.dispatch(&alert).await;
            emit(events, TrackerEvent::Alert(alert));
        }
        ItemStatus::Stored
    }

    /// 写入前的最新样本；读取失败时按无历史处理
    async fn previous_sample(&self, item: &str) -> Option<PriceSample> {
        match self.store.latest(item).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(item = %item, "Failed to read previous sample: {}", e);
                None
            }
        }
    }

    fn mark_call_start(&self) {
        *self.last_call.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    /// 等待下一个请求窗口；收到停止信号时返回 `false`
    async fn wait_for_slot(&self, stop: &mut watch::Receiver<bool>) -> bool {
        let last = *self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        let Some(last) = last else {
            return true;
        };
        let deadline = last + self.min_delay;
        if deadline <= Instant::now() {
            return true;
        }

        let stopped = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => false,
            _ = stop_requested(stop) => true,
        };
        !stopped && !*stop.borrow()
    }
}

/// 停止信号置位时完成；发送端已释放则永不完成
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}
