//! Crawler module for the hierarchical price walk
//!
//! This module contains the core crawling logic, including:
//! - Depth-first traversal: reference periods, manufacturers, models,
//!   model-years, prices
//! - Resume from a checkpoint, skipping completed subtrees
//! - The per-level failure policy
//! - Cooperative interruption
//! - Per-level progress bars

mod coordinator;
mod progress;

pub use coordinator::Crawler;
pub use progress::{CrawlProgress, SuspendingWriter};

use crate::state::Checkpoint;

/// How a crawl ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Every selected period was walked
    Completed(CrawlStats),
    /// Stopped by the shutdown signal; carries the resume position
    Interrupted(Checkpoint),
}

/// Counters for a single run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub periods: u64,
    pub manufacturers: u64,
    pub models: u64,
    pub model_years: u64,
    pub prices: u64,

    /// Subtrees dropped by a `skip` failure policy
    pub skipped_subtrees: u64,

    /// Entries passed over because an earlier run completed them
    pub resumed_skips: u64,
}

impl CrawlStats {
    /// Logs the end-of-run summary
    pub fn log_summary(&self) {
        tracing::info!(
            "Crawl summary: {} periods, {} manufacturers, {} models, {} model-years, {} prices",
            self.periods,
            self.manufacturers,
            self.models,
            self.model_years,
            self.prices
        );

        if self.skipped_subtrees > 0 {
            tracing::warn!(
                "{} subtrees were skipped after upstream failures",
                self.skipped_subtrees
            );
        }
        if self.resumed_skips > 0 {
            tracing::info!(
                "{} entries were already completed by a previous run",
                self.resumed_skips
            );
        }
    }
}
