pub mod commands;
pub mod config;
pub mod dispatch;
pub mod sync;
pub mod welcome;
