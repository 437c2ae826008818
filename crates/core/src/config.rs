use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub tracker: TrackerConfig,
    pub database: DatabaseConfig,
    pub watchlist: WatchlistConfig,
    pub notify: NotifyConfig,
    pub log: LogConfig,
}

/// 上游行情接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    // 市场标识（730 = Counter-Strike）
    pub app_id: String,
    // 币种标识（3 = EUR）
    pub currency: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://steamcommunity.com/market/priceoverview/".to_string(),
            app_id: "730".to_string(),
            currency: "3".to_string(),
            timeout_secs: 10,
            user_agent: "skintrack/0.1".to_string(),
            accept_language: "de-DE,de;q=0.9,en;q=0.8".to_string(),
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// # Summary
/// 告警触发策略。
///
/// # Invariants
/// - `OncePerCrossing`：条件持续成立期间只触发一次，价格回升或阈值变更后重新布防。
/// - `EveryCycle`：条件成立的每一轮都触发。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMode {
    #[default]
    OncePerCrossing,
    EveryCycle,
}

/// 刷新循环与自动更新配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // 相邻两次出站请求起始时间的最小间隔（毫秒）
    pub min_request_delay_ms: u64,
    pub interval_minutes: u32,
    pub min_interval_minutes: u32,
    pub max_interval_minutes: u32,
    // 预计单轮耗时超过间隔的该比例时提示限流风险
    pub throttle_ratio: f64,
    pub alert_mode: AlertMode,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_request_delay_ms: 2000,
            interval_minutes: 5,
            min_interval_minutes: 3,
            max_interval_minutes: 1440,
            throttle_ratio: 0.8,
            alert_mode: AlertMode::OncePerCrossing,
        }
    }
}

impl TrackerConfig {
    pub fn min_request_delay(&self) -> Duration {
        Duration::from_millis(self.min_request_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        minutes(self.interval_minutes)
    }

    /// 允许的自动更新间隔范围
    pub fn interval_bounds(&self) -> IntervalBounds {
        IntervalBounds {
            min: minutes(self.min_interval_minutes),
            max: minutes(self.max_interval_minutes),
            throttle_ratio: self.throttle_ratio,
        }
    }
}

/// # Summary
/// 自动更新间隔的合法范围与限流风险判定比例。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalBounds {
    pub min: Duration,
    pub max: Duration,
    pub throttle_ratio: f64,
}

impl Default for IntervalBounds {
    fn default() -> Self {
        TrackerConfig::default().interval_bounds()
    }
}

/// 将分钟数转换为 `Duration`
pub fn minutes(m: u32) -> Duration {
    Duration::from_secs(u64::from(m) * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: String,
    pub file_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            file_name: "skin_prices.db".to_string(),
        }
    }
}

/// 外部维护的自选列表与告警阈值文件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistConfig {
    pub watchlist_path: String,
    pub alerts_path: String,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            watchlist_path: "watchlist.json".to_string(),
            alerts_path: "alerts.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub telegram: Option<TelegramConfig>,
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

/// SMTP 告警邮件配置，`to` 可用逗号分隔多个收件人
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    // 缺省使用 587 + STARTTLS
    #[serde(default)]
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            file_prefix: "skintrack.log".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.feed.app_id, "730");
        assert_eq!(config.feed.currency, "3");
        assert_eq!(config.feed.timeout(), Duration::from_secs(10));
        assert_eq!(config.tracker.min_request_delay(), Duration::from_secs(2));
        assert_eq!(config.tracker.interval(), Duration::from_secs(300));
        assert_eq!(config.tracker.alert_mode, AlertMode::OncePerCrossing);
        assert_eq!(config.database.file_name, "skin_prices.db");
        assert!(config.notify.telegram.is_none());
    }

    #[test]
    fn test_interval_bounds() {
        let bounds = IntervalBounds::default();
        assert_eq!(bounds.min, Duration::from_secs(180));
        assert_eq!(bounds.max, Duration::from_secs(1440 * 60));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "tracker": { "alert_mode": "every_cycle" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.tracker.alert_mode, AlertMode::EveryCycle);
        assert_eq!(config.tracker.min_request_delay_ms, 2000);
        assert_eq!(config.watchlist.alerts_path, "alerts.json");
    }
}
