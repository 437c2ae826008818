use chrono::{DateTime, Utc};
use dashmap::DashMap;
use skintrack_core::config::AlertMode;
use skintrack_core::market::entity::PriceSample;
use skintrack_core::notify::entity::AlertEvent;
use skintrack_core::notify::port::Notifier;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// # Summary
/// 告警判定器：比较最新最低价与目标价。
///
/// # Invariants
/// - 触发条件为 `lowest_price <= threshold`。
/// - `OncePerCrossing` 模式下 `latched` 记录已触发物品及触发时的阈值，
///   价格回到阈值之上或阈值变更后移除，重新布防。
/// - 进程内无记录时以上一条已存样本判定是否处于同一次穿越，
///   因此多次独立运行不会对同一次穿越重复告警。
pub struct AlertChecker {
    mode: AlertMode,
    latched: DashMap<String, f64>,
}

impl AlertChecker {
    pub fn new(mode: AlertMode) -> Self {
        Self {
            mode,
            latched: DashMap::new(),
        }
    }

    pub fn mode(&self) -> AlertMode {
        self.mode
    }

    /// # Summary
    /// 判定样本是否触发告警。
    ///
    /// # Logic
    /// 1. 无阈值：清除状态，不触发。
    /// 2. 条件不成立：清除状态（重新布防），不触发。
    /// 3. `EveryCycle`：条件成立即触发。
    /// 4. `OncePerCrossing`：已按同一阈值触发过则静默。
    /// 5. `OncePerCrossing` 且进程内无记录：上一条样本已不高于阈值时视为同一次穿越，记录但不触发。
    ///
    /// # Arguments
    /// * `sample`: 刚写入的样本。
    /// * `previous`: 写入前该物品的最新样本。
    /// * `threshold`: 该物品的目标价。
    /// * `now`: 触发时刻。
    pub fn check(
        &self,
        sample: &PriceSample,
        previous: Option<&PriceSample>,
        threshold: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        let Some(threshold) = threshold else {
            self.latched.remove(&sample.item);
            return None;
        };

        if sample.lowest_price > threshold {
            self.latched.remove(&sample.item);
            return None;
        }

        if self.mode == AlertMode::OncePerCrossing {
            match self.latched.insert(sample.item.clone(), threshold) {
                Some(latched) if latched == threshold => return None,
                None if previous.is_some_and(|p| p.lowest_price <= threshold) => {
                    debug!(item = %sample.item, threshold, "Price still below threshold since last run");
                    return None;
                }
                _ => {}
            }
        }

        info!(
            item = %sample.item,
            price = sample.lowest_price,
            threshold,
            "Price alert fired"
        );
        Some(AlertEvent {
            item: sample.item.clone(),
            price: sample.lowest_price,
            threshold,
            sample: sample.clone(),
            triggered_at: now,
        })
    }
}

/// # Summary
/// 将告警依次投递到所有已配置的通知通道。
///
/// # Invariants
/// - 单个通道失败只记录警告，不影响其他通道与刷新流程。
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl AlertDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// 投递告警，返回成功送达的通道数
    pub async fn dispatch(&self, event: &AlertEvent) -> usize {
        let subject = event.subject();
        let content = event.message();
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(&subject, &content).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(channel = notifier.name(), item = %event.item, "Alert delivery failed: {}", e),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skintrack_core::market::entity::MarketQuote;
    use skintrack_core::test_utils::RecordingNotifier;

    fn at(price: f64) -> PriceSample {
        let ts = Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap();
        MarketQuote::new(price, 0.0, 5).into_sample("AWP | Asiimov (Field-Tested)", ts)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 1).unwrap()
    }

    #[test]
    fn test_once_per_crossing() {
        let checker = AlertChecker::new(AlertMode::OncePerCrossing);

        let fired = checker.check(&at(10.0), None, Some(12.0), now()).unwrap();
        assert_eq!(fired.price, 10.0);
        assert_eq!(fired.threshold, 12.0);
        // 持续低于阈值：静默
        assert!(checker.check(&at(11.0), None, Some(12.0), now()).is_none());
        // 恰好等于阈值仍算成立
        assert!(checker.check(&at(12.0), None, Some(12.0), now()).is_none());
        // 回升后重新布防
        assert!(checker.check(&at(12.5), None, Some(12.0), now()).is_none());
        assert!(checker.check(&at(11.0), None, Some(12.0), now()).is_some());
        // 阈值变更后重新布防
        assert!(checker.check(&at(11.0), None, Some(11.5), now()).is_some());
    }

    #[test]
    fn test_previous_sample_continues_crossing() {
        let checker = AlertChecker::new(AlertMode::OncePerCrossing);
        // 上一次运行已在阈值之下：同一次穿越，不再告警
        assert!(checker.check(&at(9.0), Some(&at(10.0)), Some(12.0), now()).is_none());
        assert!(checker.check(&at(9.0), Some(&at(9.0)), Some(12.0), now()).is_none());
        // 回升后再次跌破
        assert!(checker.check(&at(12.5), Some(&at(9.0)), Some(12.0), now()).is_none());
        assert!(checker.check(&at(11.0), Some(&at(12.5)), Some(12.0), now()).is_some());

        // 上一条样本在阈值之上：新的穿越
        let fresh = AlertChecker::new(AlertMode::OncePerCrossing);
        assert!(fresh.check(&at(11.0), Some(&at(13.0)), Some(12.0), now()).is_some());

        // EveryCycle 不受上一条样本影响
        let every = AlertChecker::new(AlertMode::EveryCycle);
        assert!(every.check(&at(9.0), Some(&at(10.0)), Some(12.0), now()).is_some());
    }

    #[test]
    fn test_every_cycle() {
        let checker = AlertChecker::new(AlertMode::EveryCycle);
        assert!(checker.check(&at(10.0), None, Some(12.0), now()).is_some());
        assert!(checker.check(&at(10.0), None, Some(12.0), now()).is_some());
        assert!(checker.check(&at(12.0), None, Some(12.0), now()).is_some());
        assert!(checker.check(&at(12.01), None, Some(12.0), now()).is_none());
    }

    #[test]
    fn test_no_threshold_never_fires() {
        let checker = AlertChecker::new(AlertMode::OncePerCrossing);
        assert!(checker.check(&at(0.5), None, None, now()).is_none());
        assert!(checker.check(&at(1.0), None, Some(2.0), now()).is_some());
        // 移除阈值后状态清除，重新设置后再次触发
        assert!(checker.check(&at(1.0), None, None, now()).is_none());
        assert!(checker.check(&at(1.0), None, Some(2.0), now()).is_some());
    }

    #[tokio::test]
    async fn test_dispatch_tolerates_failing_channel() {
        let ok = Arc::new(RecordingNotifier::new());
        let dispatcher = AlertDispatcher::new(vec![
            Arc::new(RecordingNotifier::failing()) as Arc<dyn Notifier>,
            ok.clone(),
        ]);
        let event = AlertChecker::new(AlertMode::EveryCycle)
            .check(&at(10.0), None, Some(12.0), now())
            .unwrap();

        assert_eq!(dispatcher.dispatch(&event).await, 1);
        let sent = ok.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Price alert: AWP | Asiimov (Field-Tested)");
    }
}
