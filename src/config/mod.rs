//! Configuration module for fipe-crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use fipe_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("fipe.toml")).unwrap();
//! println!("Crawling vehicle type {}", config.crawl.vehicle_type.id());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, CacheConfig, Config, CrawlConfig, CrawlMode, FailurePolicy, OnFailure,
    OutputConfig, RetryConfig, VehicleType,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
