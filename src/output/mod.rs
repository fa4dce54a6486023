//! Output module for crawl reports
//!
//! This module handles:
//! - Loading row counts and the latest reference period from the database
//! - Printing the `--stats` report

pub mod stats;

pub use stats::{load_statistics, print_statistics, DatabaseStatistics};
