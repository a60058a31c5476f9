// Core modules
pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use alerts::{Alert, Channel, Notifier, Severity};
pub use api::Exchange;
pub use config::AppConfig;
pub use error::BotError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
