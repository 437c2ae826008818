use crate::error::TrackerError;
use crate::refresh::stop_requested;
use skintrack_core::config::IntervalBounds;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// 间隔检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalCheck {
    Safe,
    // 预计单轮耗时与建议的最小间隔（分钟）
    ThrottleRisk {
        estimated: Duration,
        recommended_minutes: u32,
    },
}

/// # Summary
/// 校验自动更新间隔并评估限流风险。
///
/// # Logic
/// 1. 间隔必须落在 `[bounds.min, bounds.max]` 内。
/// 2. 预计耗时 = 物品数 × 最小请求间隔。
/// 3. 预计耗时超过 `间隔 × throttle_ratio` 时提示风险，建议间隔为预计分钟数 + 2。
///
/// # Arguments
/// * `interval`: 期望的自动更新间隔。
/// * `items`: 自选物品数量。
/// * `min_delay`: 相邻请求的最小间隔。
/// * `bounds`: 合法范围与判定比例。
pub fn check_interval(
    interval: Duration,
    items: usize,
    min_delay: Duration,
    bounds: &IntervalBounds,
) -> Result<IntervalCheck, TrackerError> {
    if interval < bounds.min || interval > bounds.max {
        return Err(TrackerError::InvalidInterval(format!(
            "{} min is outside {}..={} min",
            interval.as_secs() / 60,
            bounds.min.as_secs() / 60,
            bounds.max.as_secs() / 60
        )));
    }

    let estimated = min_delay.saturating_mul(u32::try_from(items).unwrap_or(u32::MAX));
    if estimated.as_secs_f64() > interval.as_secs_f64() * bounds.throttle_ratio {
        let recommended_minutes = u32::try_from(estimated.as_secs() / 60)
            .unwrap_or(u32::MAX)
            .saturating_add(2);
        return Ok(IntervalCheck::ThrottleRisk {
            estimated,
            recommended_minutes,
        });
    }
    Ok(IntervalCheck::Safe)
}

/// # Summary
/// 周期任务句柄：立即执行一轮，之后按间隔重复。
///
/// # Invariants
/// - 轮次之间不重叠；某轮超过间隔时，下一轮在其结束后立即开始，不补发错过的轮次。
/// - 停止是协作式的：任务在当前物品完成后退出。
/// - 句柄被丢弃时自动请求停止。
pub struct PeriodicTask {
    stop_tx: watch::Sender<bool>,
    interval_tx: watch::Sender<Duration>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// # Summary
    /// 启动周期任务。
    ///
    /// # Arguments
    /// * `interval`: 相邻两轮起始时刻的目标间隔。
    /// * `cycle`: 每轮执行的异步闭包，参数为停止信号。
    pub fn spawn<F, Fut>(interval: Duration, mut cycle: F) -> Self
    where
        F: FnMut(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (interval_tx, interval_rx) = watch::channel(interval);

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Auto update started");
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                let cycle_start = Instant::now();
                cycle(stop_rx.clone()).await;

                let next = cycle_start + *interval_rx.borrow();
                let stopped = tokio::select! {
                    _ = tokio::time::sleep_until(next) => false,
                    _ = stop_requested(&mut stop_rx) => true,
                };
                if stopped {
                    break;
                }
            }
            info!("Auto update stopped");
        });

        Self {
            stop_tx,
            interval_tx,
            handle: Some(handle),
        }
    }

    /// 当前间隔
    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// 修改间隔，从下一次等待开始生效
    pub fn set_interval(&self, interval: Duration) {
        self.interval_tx.send_replace(interval);
        info!(interval_secs = interval.as_secs(), "Auto update interval changed");
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// # Summary
    /// 请求停止并等待任务退出。
    ///
    /// # Logic
    /// 1. 置位停止信号，进行中的请求不会被中断。
    /// 2. 等待任务结束。
    pub async fn stop(mut self) {
        self.stop_tx.send_replace(true);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!("Auto update task ended abnormally: {}", e);
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    #[test]
    fn test_check_interval_bounds() {
        let bounds = IntervalBounds::default();
        let delay = Duration::from_secs(2);
        assert!(matches!(
            check_interval(minutes(2), 1, delay, &bounds),
            Err(TrackerError::InvalidInterval(_))
        ));
        assert!(matches!(
            check_interval(minutes(1441), 1, delay, &bounds),
            Err(TrackerError::InvalidInterval(_))
        ));
        assert_eq!(check_interval(minutes(3), 10, delay, &bounds).unwrap(), IntervalCheck::Safe);
        assert_eq!(check_interval(minutes(1440), 0, delay, &bounds).unwrap(), IntervalCheck::Safe);
    }

    #[test]
    fn test_check_interval_throttle_risk() {
        let bounds = IntervalBounds::default();
        let delay = Duration::from_secs(2);

        // 200 × 2s = 400s > 0.8 × 300s
        let check = check_interval(minutes(5), 200, delay, &bounds).unwrap();
        assert_eq!(
            check,
            IntervalCheck::ThrottleRisk {
                estimated: Duration::from_secs(400),
                recommended_minutes: 8,
            }
        );

        // 120 × 2s = 240s，恰好等于 0.8 × 300s，不算风险
        assert_eq!(check_interval(minutes(5), 120, delay, &bounds).unwrap(), IntervalCheck::Safe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_runs_immediately_then_per_interval() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = PeriodicTask::spawn(minutes(5), move |_stop| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(minutes(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        task.set_interval(minutes(10));
        assert_eq!(task.interval(), minutes(10));
        // 本次等待已按旧间隔排定
        tokio::time::sleep(minutes(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        tokio::time::sleep(minutes(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        tokio::time::sleep(minutes(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        assert!(task.is_running());
        task.stop().await;
        tokio::time::sleep(minutes(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_cycles_do_not_overlap_or_burst() {
        let active = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let (active_c, runs_c) = (active.clone(), runs.clone());

        let task = PeriodicTask::spawn(minutes(3), move |_stop| {
            let (active, runs) = (active_c.clone(), runs_c.clone());
            async move {
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(minutes(7)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });

        // 每轮 7 分钟，21 分钟内最多完成 3 轮
        tokio::time::sleep(minutes(21) + Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_requests_stop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = PeriodicTask::spawn(minutes(3), move |_stop| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(task);

        tokio::time::sleep(minutes(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
