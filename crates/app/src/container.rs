use anyhow::Context;
use skintrack_core::common::time::RealTimeProvider;
use skintrack_core::config::AppConfig;
use skintrack_core::notify::port::Notifier;
use skintrack_feed::steam::SteamMarketProvider;
use skintrack_notify::email::EmailNotifier;
use skintrack_notify::log::LogNotifier;
use skintrack_notify::telegram::TelegramNotifier;
use skintrack_store::price::SqlitePriceStore;
use skintrack_store::watchlist::JsonWatchlistStore;
use skintrack_tracker::alert::{AlertChecker, AlertDispatcher};
use skintrack_tracker::event::{self, EventReceiver};
use skintrack_tracker::refresh::Refresher;
use skintrack_tracker::tracker::Tracker;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 打开价格数据库，数据根目录取自配置
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<SqlitePriceStore>> {
    skintrack_store::config::set_root_dir(PathBuf::from(&config.database.data_dir));
    let store = SqlitePriceStore::new(&config.database.file_name)
        .await
        .context("failed to open price database")?;
    Ok(Arc::new(store))
}

pub fn open_watchlist(config: &AppConfig) -> Arc<JsonWatchlistStore> {
    Arc::new(JsonWatchlistStore::new(
        &config.watchlist.watchlist_path,
        &config.watchlist.alerts_path,
    ))
}

/// # Summary
/// 按配置组装通知通道。
///
/// # Logic
/// 1. 日志通道始终启用。
/// 2. 配置了 Telegram / 邮件时追加对应通道，配置非法直接报错。
pub fn build_notifiers(config: &AppConfig) -> anyhow::Result<Vec<Arc<dyn Notifier>>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier::new())];

    if let Some(telegram) = &config.notify.telegram {
        let notifier = TelegramNotifier::from_config(telegram).context("invalid telegram settings")?;
        notifiers.push(Arc::new(notifier));
    }
    if let Some(email) = &config.notify.email {
        let notifier = EmailNotifier::from_config(email).context("invalid email settings")?;
        notifiers.push(Arc::new(notifier));
    }

    let channels: Vec<&str> = notifiers.iter().map(|n| n.name()).collect();
    info!(?channels, "Alert channels ready");
    Ok(notifiers)
}

/// # Summary
/// 组装刷新服务，纯粹的依赖注入。
///
/// # Logic
/// 1. 实例化行情源与告警组件。
/// 2. 构造 `Refresher`，注入行情源、存储与系统时钟。
/// 3. 构造 `Tracker` 并返回事件接收端供前台消费。
pub fn build_tracker(
    config: &AppConfig,
    store: Arc<SqlitePriceStore>,
    watchlist: Arc<JsonWatchlistStore>,
) -> anyhow::Result<(Tracker, EventReceiver)> {
    let provider = SteamMarketProvider::new(&config.feed).context("failed to build market client")?;
    let dispatcher = AlertDispatcher::new(build_notifiers(config)?);

    let refresher = Refresher::new(
        Arc::new(provider),
        store,
        Arc::new(RealTimeProvider),
        AlertChecker::new(config.tracker.alert_mode),
        dispatcher,
        config.tracker.min_request_delay(),
    );

    let (events_tx, events_rx) = event::channel();
    let tracker = Tracker::new(
        refresher,
        watchlist,
        events_tx,
        config.tracker.interval_bounds(),
    );
    Ok((tracker, events_rx))
}
