//! fipe-crawler: a resumable ingester for the FIPE vehicle price table
//!
//! This crate walks the FIPE query service (reference periods → manufacturers
//! → models → model-years → prices), caching every raw response on disk, and
//! persists the normalized records into SQLite with strict foreign keys.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod parse;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Upstream error: {0}")]
    Api(#[from] api::ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] state::CheckpointError),
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

/// Errors raised while decoding localized upstream values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown month name: '{0}'")]
    UnknownMonth(String),

    #[error("Malformed reference label: '{0}'")]
    ReferenceLabel(String),

    #[error("Malformed currency value: '{0}'")]
    Currency(String),

    #[error("Malformed model-year code: '{0}'")]
    ModelYearCode(String),

    #[error("Identifier is not numeric: '{0}'")]
    NonNumericId(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for localized parsing
pub type ParseResult<T> = std::result::Result<T, ParseError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOutcome, Crawler};
pub use state::{Checkpoint, CheckpointStore};
