use anyhow::Context;
use config::{Config, Environment, File};
use skintrack_core::config::{AppConfig, LogConfig};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// 未指定 `--config` 时尝试读取的配置文件
pub const DEFAULT_CONFIG_FILE: &str = "skintrack.toml";

/// # Summary
/// 分层加载应用配置。
///
/// # Logic
/// 1. 以 `AppConfig::default()` 作为最底层。
/// 2. 叠加配置文件：显式指定时必须存在，否则 `skintrack.toml` 可选。
/// 3. 叠加 `SKINTRACK__` 前缀的环境变量，层级以 `__` 分隔，
///    例如 `SKINTRACK__TRACKER__INTERVAL_MINUTES=10`。
///
/// # Arguments
/// * `path`: 命令行指定的配置文件路径。
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let defaults = Config::try_from(&AppConfig::default()).context("failed to serialize default config")?;

    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings = Config::builder()
        .add_source(defaults)
        .add_source(file)
        .add_source(
            Environment::with_prefix("SKINTRACK")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to load configuration")?;

    settings
        .try_deserialize()
        .context("invalid configuration")
}

/// # Summary
/// 初始化全局日志：标准输出 + 按天滚动的日志文件。
///
/// # Logic
/// 1. 过滤级别取自 `RUST_LOG`，缺省为 `info`。
/// 2. 文件输出通过非阻塞写入器完成，不带 ANSI 颜色。
///
/// # Returns
/// 文件写入器的 guard，须在进程生命周期内持有，否则缓冲日志会丢失。
pub fn init_logging(config: &LogConfig) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(&config.dir, &config.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use skintrack_core::config::AlertMode;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.tracker.interval_minutes, 5);
        assert_eq!(config.database.file_name, "skin_prices.db");
        assert!(config.notify.telegram.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[tracker]
interval_minutes = 15
alert_mode = "every_cycle"

[notify.telegram]
bot_token = "token"
chat_id = "42"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.tracker.interval_minutes, 15);
        assert_eq!(config.tracker.alert_mode, AlertMode::EveryCycle);
        assert_eq!(config.tracker.min_request_delay_ms, 2000);
        let telegram = config.notify.telegram.unwrap();
        assert_eq!(telegram.chat_id, "42");
        assert_eq!(telegram.api_base, "https://api.telegram.org");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
