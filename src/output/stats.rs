//! Statistics generation from the price database
//!
//! This module provides functionality for extracting and displaying
//! database statistics from the storage layer.

use crate::storage::{ReferencePeriod, Repository, StorageResult, Table};

/// Database statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStatistics {
    /// Row count per table, in write order
    pub row_counts: Vec<(Table, u64)>,

    /// Most recent reference period stored
    pub latest_period: Option<ReferencePeriod>,
}

impl DatabaseStatistics {
    /// Row count of a single table
    pub fn count(&self, table: Table) -> u64 {
        self.row_counts
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `repository` - The storage backend to query
///
/// # Returns
///
/// * `Ok(DatabaseStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(repository: &dyn Repository) -> StorageResult<DatabaseStatistics> {
    let row_counts = Table::ALL
        .iter()
        .map(|table| Ok((*table, repository.count_rows(*table)?)))
        .collect::<StorageResult<Vec<_>>>()?;

    let latest_period = repository.latest_reference_period()?;

    Ok(DatabaseStatistics {
        row_counts,
        latest_period,
    })
}

/// Prints statistics to stdout
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &DatabaseStatistics) {
    println!("=== Price Database Statistics ===\n");

    println!("Rows:");
    for (table, count) in &stats.row_counts {
        println!("  {:<18} {}", format!("{}:", table.label()), count);
    }
    println!();

    match &stats.latest_period {
        Some(period) => println!(
            "Latest reference period: {} ({:02}/{}, code {})",
            period.display_name.trim(),
            period.month,
            period.year,
            period.period_id
        ),
        None => println!("Latest reference period: none"),
    }

    let model_years = stats.count(Table::ModelYears);
    if model_years > 0 {
        let coverage = stats.count(Table::Prices) as f64 / model_years as f64;
        println!("Prices per model-year: {:.2}", coverage);
    }
}
