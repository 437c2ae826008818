pub mod parse;
pub mod steam;
