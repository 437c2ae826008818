use skintrack_core::store::error::StoreError;
use std::time::Duration;
use thiserror::Error;

/// # Summary
/// Tracker 层的统一错误类型。
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
    // 预计单轮耗时接近或超过间隔
    #[error(
        "Throttle risk: one cycle takes about {}s, consider an interval of at least {recommended_minutes} min",
        .estimated.as_secs()
    )]
    ThrottleRisk {
        estimated: Duration,
        recommended_minutes: u32,
    },
    #[error("Watchlist is empty")]
    EmptyWatchlist,
    #[error("Auto update is already running")]
    AlreadyRunning,
    #[error("A refresh cycle is already in progress")]
    Busy,
}
