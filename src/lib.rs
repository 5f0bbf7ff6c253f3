//! Roster-Sync: scheduled synchronization of game-character data for a chat bot
//!
//! This crate polls guild rosters and character profiles from upstream HTTP APIs,
//! reconciles them into a local record store, keeps a weekly activity log and
//! performs the weekly reset of manually assigned keys.

pub mod auth;
pub mod config;
pub mod crawler;
pub mod model;
pub mod notify;
pub mod output;
pub mod state;
pub mod storage;
pub mod sync;

use thiserror::Error;

/// Main error type for Roster-Sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] auth::AuthError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid key specification: {0}")]
    KeySpec(#[from] sync::KeySpecError),

    #[error("No group given and no defaults configured for room {0}")]
    MissingDefaults(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Roster-Sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use model::{EntityKey, GroupKey};
pub use state::EntityState;
