use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Steam Community Market price tracker
#[derive(Debug, Parser)]
#[command(name = "skintrack", version)]
pub struct Cli {
    /// Configuration file (defaults to ./skintrack.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every watchlist item once
    Refresh,
    /// Refresh periodically until Ctrl-C
    Watch {
        /// Minutes between cycles
        #[arg(long)]
        interval: Option<u32>,
        /// Start even when the interval risks rate limiting
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
    /// Add an item to the watchlist
    Add { item: String },
    /// Remove an item from the watchlist
    Remove { item: String },
    /// Show the watchlist with alert thresholds
    List,
    /// Manage price alerts
    Alert {
        #[command(subcommand)]
        action: AlertAction,
    },
    /// Show the most recent sample of an item
    Latest { item: String },
    /// Show stored samples of an item
    History {
        item: String,
        /// Only samples from the last N days
        #[arg(long)]
        days: Option<u32>,
        /// Keep only the newest N samples
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Summarise the price movement of an item
    Stats {
        item: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Show database statistics and integrity findings
    DbStats,
    /// Delete samples older than the retention period
    Cleanup {
        #[arg(long, default_value_t = 365)]
        keep_days: u32,
    },
}

#[derive(Debug, Subcommand)]
pub enum AlertAction {
    /// Alert when the lowest price drops to or below PRICE
    Set { item: String, price: f64 },
    /// Remove the alert of an item
    Clear { item: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_with_flags() {
        let cli = Cli::parse_from(["skintrack", "watch", "--interval", "10", "--yes"]);
        match cli.command {
            Command::Watch { interval, yes } => {
                assert_eq!(interval, Some(10));
                assert!(yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_alert_set_and_global_config() {
        let cli = Cli::parse_from([
            "skintrack",
            "alert",
            "set",
            "AK-47 | Redline (Field-Tested)",
            "12.5",
            "--config",
            "custom.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(
            cli.command,
            Command::Alert {
                action: AlertAction::Set { ref item, price }
            } if item == "AK-47 | Redline (Field-Tested)" && price == 12.5
        ));
    }

    #[test]
    fn test_cleanup_default_retention() {
        let cli = Cli::parse_from(["skintrack", "cleanup"]);
        assert!(matches!(cli.command, Command::Cleanup { keep_days: 365 }));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
