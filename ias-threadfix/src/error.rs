//! Error types for the sync engine
use crate::threadfix::ThreadFixError;

/// Custom error type for ias-threadfix operations
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// InsightAppSec API error
    #[error("InsightAppSec API error: {0}")]
    Source(#[from] insightappsec_api::InsightAppSecError),

    /// ThreadFix API error
    #[error("ThreadFix API error: {0}")]
    Destination(#[from] ThreadFixError),

    /// Settings are missing or inconsistent
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// The ThreadFix application for an export configuration could not be resolved
    #[error("Destination application could not be resolved: {0}")]
    DestinationResolution(String),

    /// Scan configuration filter is not a valid regular expression
    #[error("Invalid scan configuration filter: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file could not be loaded
    #[error("Settings error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Result type alias for ias-threadfix operations
pub type Result<T> = std::result::Result<T, SyncError>;
