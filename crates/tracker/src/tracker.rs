use crate::error::TrackerError;
use crate::event::{CycleMode, CycleReport, EventSender};
use crate::refresh::Refresher;
use crate::schedule::{IntervalCheck, PeriodicTask, check_interval};
use skintrack_core::config::IntervalBounds;
use skintrack_core::watchlist::port::WatchlistSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{error, info};

struct TrackerInner {
    refresher: Refresher,
    watchlist: Arc<dyn WatchlistSource>,
    events: EventSender,
    // 保证任意时刻至多一轮刷新在执行
    cycle_lock: Mutex<()>,
}

impl TrackerInner {
    /// 后台轮次：等待手动刷新结束后执行，每轮重新读取快照
    async fn auto_cycle(&self, mut stop: watch::Receiver<bool>) {
        let _guard = self.cycle_lock.lock().await;
        let snapshot = match self.watchlist.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to read watchlist: {}", e);
                return;
            }
        };
        if snapshot.is_empty() {
            info!("Watchlist is empty, skipping cycle");
            return;
        }
        self.refresher
            .run_cycle(&snapshot, CycleMode::Automatic, &mut stop, &self.events)
            .await;
    }
}

/// # Summary
/// 刷新服务门面，对前台提供手动刷新与自动更新控制。
///
/// # Invariants
/// - 至多一个后台 worker。
/// - 手动刷新与自动轮次互斥，不会并发访问行情源与存储。
/// - 前台只读存储，所有写入都发生在刷新轮次中。
pub struct Tracker {
    inner: Arc<TrackerInner>,
    bounds: IntervalBounds,
    worker: Mutex<Option<PeriodicTask>>,
}

impl Tracker {
    pub fn new(
        refresher: Refresher,
        watchlist: Arc<dyn WatchlistSource>,
        events: EventSender,
        bounds: IntervalBounds,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                refresher,
                watchlist,
                events,
                cycle_lock: Mutex::new(()),
            }),
            bounds,
            worker: Mutex::new(None),
        }
    }

    /// # Summary
    /// 立即执行一轮手动刷新。
    ///
    /// # Logic
    /// 1. 已有轮次在执行时返回 `Busy`。
    /// 2. 读取快照，为空时返回 `EmptyWatchlist`。
    /// 3. 执行一轮不可取消的刷新。
    pub async fn refresh_now(&self) -> Result<CycleReport, TrackerError> {
        let _guard = self
            .inner
            .cycle_lock
            .try_lock()
            .map_err(|_| TrackerError::Busy)?;

        let snapshot = self.inner.watchlist.snapshot().await?;
        if snapshot.is_empty() {
            return Err(TrackerError::EmptyWatchlist);
        }

        // 手动刷新没有外部停止信号，发送端存活至本轮结束
        let (_stop_tx, mut stop_rx) = watch::channel(false);
        Ok(self
            .inner
            .refresher
            .run_cycle(&snapshot, CycleMode::Manual, &mut stop_rx, &self.inner.events)
            .await)
    }

    /// # Summary
    /// 启动自动更新。
    ///
    /// # Logic
    /// 1. 已有 worker 时返回 `AlreadyRunning`。
    /// 2. 自选列表为空时返回 `EmptyWatchlist`。
    /// 3. 校验间隔；存在限流风险且未确认时返回 `ThrottleRisk`。
    /// 4. 启动周期任务，首轮立即执行。
    ///
    /// # Arguments
    /// * `interval`: 自动更新间隔。
    /// * `acknowledge_risk`: 是否已确认限流风险。
    ///
    /// # Returns
    /// 启动时的间隔检查结果。
    pub async fn start_auto_update(
        &self,
        interval: Duration,
        acknowledge_risk: bool,
    ) -> Result<IntervalCheck, TrackerError> {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(PeriodicTask::is_running) {
            return Err(TrackerError::AlreadyRunning);
        }

        let snapshot = self.inner.watchlist.snapshot().await?;
        if snapshot.is_empty() {
            return Err(TrackerError::EmptyWatchlist);
        }

        let check = check_interval(
            interval,
            snapshot.len(),
            self.inner.refresher.min_delay(),
            &self.bounds,
        )?;
        require_acknowledged(check, acknowledge_risk)?;

        let inner = self.inner.clone();
        *worker = Some(PeriodicTask::spawn(interval, move |stop| {
            let inner = inner.clone();
            async move { inner.auto_cycle(stop).await }
        }));
        Ok(check)
    }

    /// 停止自动更新并等待 worker 退出，返回此前是否在运行
    pub async fn stop_auto_update(&self) -> bool {
        let task = self.worker.lock().await.take();
        match task {
            Some(task) => {
                let was_running = task.is_running();
                task.stop().await;
                was_running
            }
            None => false,
        }
    }

    /// # Summary
    /// 修改自动更新间隔，worker 运行中时从下一次等待生效。
    ///
    /// # Logic
    /// 1. 校验新间隔，超出范围返回 `InvalidInterval`。
    /// 2. 存在限流风险且未确认时返回 `ThrottleRisk`，原间隔保持不变。
    /// 3. 其余情况应用到运行中的 worker。
    ///
    /// # Arguments
    /// * `interval`: 新的自动更新间隔。
    /// * `acknowledge_risk`: 是否已确认限流风险。
    ///
    /// # Returns
    /// 新间隔的检查结果。
    pub async fn set_interval(
        &self,
        interval: Duration,
        acknowledge_risk: bool,
    ) -> Result<IntervalCheck, TrackerError> {
        let snapshot = self.inner.watchlist.snapshot().await?;
        let check = check_interval(
            interval,
            snapshot.len(),
            self.inner.refresher.min_delay(),
            &self.bounds,
        )?;
        require_acknowledged(check, acknowledge_risk)?;

        if let Some(task) = self.worker.lock().await.as_ref() {
            task.set_interval(interval);
        }
        Ok(check)
    }

    /// 运行中 worker 的当前间隔
    pub async fn interval(&self) -> Option<Duration> {
        self.worker.lock().await.as_ref().map(PeriodicTask::interval)
    }

    pub async fn is_auto_updating(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }
}

/// 限流风险未经确认时拒绝
fn require_acknowledged(check: IntervalCheck, acknowledge_risk: bool) -> Result<(), TrackerError> {
    match check {
        IntervalCheck::ThrottleRisk {
            estimated,
            recommended_minutes,
        } if !acknowledge_risk => Err(TrackerError::ThrottleRisk {
            estimated,
            recommended_minutes,
        }),
        _ => Ok(()),
    }
}
