pub mod config;
pub mod migrations;
pub mod price;
pub mod watchlist;
