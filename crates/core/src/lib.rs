pub mod common;
pub mod config;
pub mod market;
pub mod notify;
pub mod store;
pub mod watchlist;

#[cfg(feature = "test-utils")]
pub mod test_utils;
