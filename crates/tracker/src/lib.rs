pub mod alert;
pub mod error;
pub mod event;
pub mod refresh;
pub mod schedule;
pub mod tracker;
