mod cli;
mod commands;
mod container;
mod settings;

use clap::Parser;
use cli::{Cli, Command};
use tracing::{debug, info};

/// # Summary
/// 应用启动入口。
///
/// # Logic
/// 1. 解析命令行并分层加载配置。
/// 2. 初始化全局日志，guard 持有至进程退出。
/// 3. 安装 TLS 加密后端。
/// 4. 按子命令实例化所需组件并执行。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = settings::load_config(cli.config.as_deref())?;
    let _log_guard = settings::init_logging(&config.log);

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("TLS crypto provider already installed");
    }

    info!(command = ?cli.command, "skintrack starting");

    match cli.command {
        Command::Refresh => commands::refresh(&config).await,
        Command::Watch { interval, yes } => commands::watch(&config, interval, yes).await,
        Command::Add { item } => commands::add(&container::open_watchlist(&config), &item).await,
        Command::Remove { item } => {
            commands::remove(&container::open_watchlist(&config), &item).await
        }
        Command::List => commands::list(&container::open_watchlist(&config)).await,
        Command::Alert { action } => {
            commands::alert(&container::open_watchlist(&config), action).await
        }
        Command::Latest { item } => {
            commands::latest(&*container::open_store(&config).await?, &item).await
        }
        Command::History { item, days, limit } => {
            commands::history(&*container::open_store(&config).await?, &item, days, limit).await
        }
        Command::Stats { item, days } => {
            commands::stats(&*container::open_store(&config).await?, &item, days).await
        }
        Command::DbStats => commands::db_stats(&*container::open_store(&config).await?).await,
        Command::Cleanup { keep_days } => {
            commands::cleanup(&*container::open_store(&config).await?, keep_days).await
        }
    }
}
