// Core modules
pub mod backtest;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod market;
pub mod models;
pub mod news;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use error::BotError;
pub use models::*;
