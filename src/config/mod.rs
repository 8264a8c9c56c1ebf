/// Database configuration and connection management
pub mod database;

/// Application settings loaded from `ledger.toml`
pub mod settings;

pub use settings::{AppConfig, SchedulerConfig, SettlementConfig, load_app_configuration};
