use anyhow::{Context, bail};
use chrono::{DateTime, TimeDelta, Utc};
use skintrack_core::common::TrackedItem;
use skintrack_core::config::{AppConfig, minutes};
use skintrack_core::market::entity::PriceSample;
use skintrack_core::market::stats::PriceStatistics;
use skintrack_core::store::port::{HistoryQuery, PriceStore};
use skintrack_core::watchlist::port::WatchlistSource;
use skintrack_store::migrations::check_integrity;
use skintrack_store::price::SqlitePriceStore;
use skintrack_store::watchlist::JsonWatchlistStore;
use skintrack_tracker::error::TrackerError;
use skintrack_tracker::event::{EventReceiver, ItemStatus, TrackerEvent};
use skintrack_tracker::schedule::IntervalCheck;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::AlertAction;
use crate::container;

/// 在后台打印刷新事件，所有发送端释放后结束
fn spawn_printer(mut events: EventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    })
}

fn print_event(event: &TrackerEvent) {
    match event {
        TrackerEvent::CycleStarted { total, mode } => {
            println!("== {:?} refresh of {} items", mode, total);
        }
        TrackerEvent::Progress { index, total, item } => {
            println!("[{}/{}] {}", index, total, item);
        }
        TrackerEvent::SampleStored(sample) => println!("      {}", format_sample(sample)),
        TrackerEvent::ItemFailed { item, status } => {
            let reason = match status {
                ItemStatus::Skipped(r) => format!("skipped: {}", r),
                ItemStatus::Rejected(r) => format!("rejected: {}", r),
                ItemStatus::StoreFailed(r) => format!("NOT SAVED: {}", r),
                ItemStatus::Stored => return,
            };
            println!("      {} {}", item, reason);
        }
        TrackerEvent::Alert(alert) => {
            println!("!!! {}: {:.2} <= {:.2}", alert.item, alert.price, alert.threshold);
        }
        TrackerEvent::CycleCompleted(report) => {
            let state = if report.cancelled { " (stopped)" } else { "" };
            println!(
                "== {}/{} updated in {:.1}s{}",
                report.successful,
                report.total,
                report.elapsed.as_secs_f64(),
                state
            );
        }
    }
}

fn format_sample(sample: &PriceSample) -> String {
    format!(
        "{}  lowest {:.2}  median {:.2}  volume {}  spread {:.2} ({:.1}%)",
        sample.timestamp.format("%Y-%m-%d %H:%M:%S"),
        sample.lowest_price,
        sample.median_price,
        sample.volume,
        sample.spread_absolute,
        sample.spread_percentage
    )
}

fn days_ago(days: u32) -> anyhow::Result<DateTime<Utc>> {
    let delta = TimeDelta::try_days(i64::from(days)).context("day count out of range")?;
    Utc::now()
        .checked_sub_signed(delta)
        .context("day count out of range")
}

/// 执行一轮手动刷新
pub async fn refresh(config: &AppConfig) -> anyhow::Result<()> {
    let store = container::open_store(config).await?;
    let watchlist = container::open_watchlist(config);
    let (tracker, events) = container::build_tracker(config, store, watchlist)?;
    let printer = spawn_printer(events);

    let result = tracker.refresh_now().await;
    drop(tracker);
    printer.await.context("event printer failed")?;

    match result {
        Ok(_) => Ok(()),
        Err(TrackerError::EmptyWatchlist) => {
            println!("Watchlist is empty. Add items with `skintrack add <item>`.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// # Summary
/// 启动自动更新，直到收到 Ctrl-C。
///
/// # Logic
/// 1. 按给定或配置的间隔启动；存在限流风险时提示，未确认则拒绝启动。
/// 2. 等待 Ctrl-C，随后协作式停止：当前物品完成后退出。
pub async fn watch(config: &AppConfig, interval: Option<u32>, yes: bool) -> anyhow::Result<()> {
    let store = container::open_store(config).await?;
    let watchlist = container::open_watchlist(config);
    let (tracker, events) = container::build_tracker(config, store, watchlist)?;
    let printer = spawn_printer(events);

    let interval = minutes(interval.unwrap_or(config.tracker.interval_minutes));
    match tracker.start_auto_update(interval, yes).await {
        Ok(IntervalCheck::Safe) => {}
        Ok(IntervalCheck::ThrottleRisk { estimated, .. }) => {
            warn!(
                estimated_secs = estimated.as_secs(),
                "Cycle may take longer than the interval allows"
            );
        }
        Err(TrackerError::ThrottleRisk {
            estimated,
            recommended_minutes,
        }) => {
            println!(
                "A full cycle takes about {}s, which risks rate limiting at this interval. \
                 Use --interval {} or pass --yes to start anyway.",
                estimated.as_secs(),
                recommended_minutes
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    println!(
        "Auto update every {} min. Press Ctrl-C to stop.",
        interval.as_secs() / 60
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Stop requested, finishing current item");
    tracker.stop_auto_update().await;
    drop(tracker);
    printer.await.context("event printer failed")?;
    Ok(())
}

pub async fn add(watchlist: &JsonWatchlistStore, raw: &str) -> anyhow::Result<()> {
    let Some(item) = TrackedItem::parse(raw) else {
        bail!("item name must not be empty");
    };
    if watchlist.add_item(item.as_str()).await? {
        println!("Added {}", item);
    } else {
        println!("{} is already on the watchlist", item);
    }
    Ok(())
}

pub async fn remove(watchlist: &JsonWatchlistStore, item: &str) -> anyhow::Result<()> {
    if watchlist.remove_item(item).await? {
        println!("Removed {}", item.trim());
    } else {
        println!("{} is not on the watchlist", item.trim());
    }
    Ok(())
}

pub async fn list(watchlist: &JsonWatchlistStore) -> anyhow::Result<()> {
    let snapshot = watchlist.snapshot().await?;
    if snapshot.is_empty() {
        println!("Watchlist is empty.");
        return Ok(());
    }
    for item in &snapshot.items {
        match snapshot.threshold(item) {
            Some(target) => println!("{}  (alert <= {:.2})", item, target),
            None => println!("{}", item),
        }
    }
    Ok(())
}

pub async fn alert(watchlist: &JsonWatchlistStore, action: AlertAction) -> anyhow::Result<()> {
    match action {
        AlertAction::Set { item, price } => {
            watchlist.set_threshold(&item, price).await?;
            println!("Alert for {} at {:.2}", item.trim(), price);
        }
        AlertAction::Clear { item } => {
            if watchlist.clear_threshold(&item).await? {
                println!("Alert for {} removed", item.trim());
            } else {
                println!("No alert set for {}", item.trim());
            }
        }
    }
    Ok(())
}

pub async fn latest(store: &SqlitePriceStore, item: &str) -> anyhow::Result<()> {
    match store.latest(item.trim()).await? {
        Some(sample) => println!("{}\n{}", sample.item, format_sample(&sample)),
        None => println!("No data for {}", item.trim()),
    }
    Ok(())
}

pub async fn history(
    store: &SqlitePriceStore,
    item: &str,
    days: Option<u32>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let mut query = match days {
        Some(days) => HistoryQuery::since(days_ago(days)?),
        None => HistoryQuery::all(),
    };
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }

    let samples = store.history(item.trim(), &query).await?;
    if samples.is_empty() {
        println!("No data for {}", item.trim());
        return Ok(());
    }
    for sample in &samples {
        println!("{}", format_sample(sample));
    }
    println!("{} samples", samples.len());
    Ok(())
}

pub async fn stats(store: &SqlitePriceStore, item: &str, days: u32) -> anyhow::Result<()> {
    let samples = store
        .history(item.trim(), &HistoryQuery::since(days_ago(days)?))
        .await?;
    let Some(stats) = PriceStatistics::from_samples(&samples) else {
        println!("No data for {} in the last {} days", item.trim(), days);
        return Ok(());
    };

    println!("{} (last {} days, {} samples)", item.trim(), days, stats.count);
    println!("  latest   {:.2}", stats.latest);
    println!("  min      {:.2}", stats.min);
    println!("  max      {:.2}", stats.max);
    println!("  average  {:.2}", stats.average);
    println!("  range    {:.2}", stats.range);
    println!("  trend    {:?} ({:+.2})", stats.trend, stats.trend_change);
    Ok(())
}

pub async fn db_stats(store: &SqlitePriceStore) -> anyhow::Result<()> {
    let stats = store.statistics().await?;
    let integrity = check_integrity(store.pool()).await?;

    println!("schema version  {}", stats.schema_version);
    println!("records         {}", stats.total_records);
    println!("items           {}", stats.unique_items);
    if let (Some(first), Some(last)) = (stats.first_record, stats.last_record) {
        println!("range           {} .. {}", first.to_rfc3339(), last.to_rfc3339());
    }
    if !stats.top_items.is_empty() {
        println!("most tracked:");
        for entry in &stats.top_items {
            println!("  {:>6}  {}", entry.records, entry.item);
        }
    }
    println!(
        "integrity       {} invalid rows, {} duplicate pairs, {} unparsable timestamps",
        integrity.invalid_rows, integrity.duplicate_pairs, integrity.unparsable_timestamps
    );
    Ok(())
}

pub async fn cleanup(store: &SqlitePriceStore, keep_days: u32) -> anyhow::Result<()> {
    let cutoff = days_ago(keep_days)?;
    let removed = store.cleanup_before(cutoff).await?;
    println!("Removed {} samples older than {}", removed, cutoff.to_rfc3339());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skintrack_core::market::entity::MarketQuote;

    #[test]
    fn test_format_sample() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
        let sample = MarketQuote::new(10.0, 12.5, 42).into_sample("M4A1-S | Printstream", ts);
        assert_eq!(
            format_sample(&sample),
            "2026-10-19 09:30:00  lowest 10.00  median 12.50  volume 42  spread 2.50 (25.0%)"
        );
    }

    #[test]
    fn test_days_ago_is_in_the_past() {
        let cutoff = days_ago(365).unwrap();
        assert!(cutoff < Utc::now());
        assert!(days_ago(0).is_ok());
    }

    #[tokio::test]
    async fn test_add_rejects_blank_name() {
        let dir = tempfile::tempdir().unwrap();
        let watchlist = JsonWatchlistStore::new(dir.path().join("w.json"), dir.path().join("a.json"));

        assert!(add(&watchlist, "   ").await.is_err());
        add(&watchlist, " AWP | Dragon Lore (Factory New) ").await.unwrap();
        let snapshot = watchlist.snapshot().await.unwrap();
        assert_eq!(snapshot.items, vec!["AWP | Dragon Lore (Factory New)".to_string()]);
    }
}
