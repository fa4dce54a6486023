//! Storage module for persisting the ingested price table
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Idempotent assertion of reference periods, manufacturers, models and
//!   model-years (first write wins)
//! - Price upserts keyed by the upstream authentication token
//! - Row counts and lookups for the stats report

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteRepository;
pub use traits::{Repository, StorageError, StorageResult};

use bigdecimal::BigDecimal;
use serde_json::Value;
use std::path::Path;

/// Opens (or creates) the price database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteRepository)` - Successfully opened repository
/// * `Err(StorageError)` - Failed to open the database
pub fn open_repository(path: &Path) -> StorageResult<SqliteRepository> {
    SqliteRepository::new(path)
}

/// A monthly reference period, e.g. `"junho/2024"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePeriod {
    pub period_id: String,
    /// Raw upstream label
    pub display_name: String,
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manufacturer {
    pub manufacturer_id: String,
    pub display_name: String,
    pub vehicle_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarModel {
    pub model_id: String,
    pub manufacturer_id: String,
    pub display_name: String,
}

/// A model-year, keyed by `(model_id, model_year_id)`
///
/// Upstream reuses codes like `"2014-1"` across models, so the code alone
/// is not unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelYear {
    pub model_id: String,
    pub model_year_id: String,
    pub display_name: String,
    pub year: i32,
    pub fuel_type: i32,
}

/// A price quote for one model-year in one reference period
#[derive(Debug, Clone, PartialEq)]
pub struct Price {
    pub manufacturer_id: String,
    pub model_id: String,
    pub model_year_id: String,
    pub vehicle_type_id: i64,
    pub reference_period_id: String,
    /// Upstream conflict key
    pub authentication_token: String,
    pub query_timestamp: Option<String>,
    pub reference_month_label: String,
    pub value: BigDecimal,
    pub fipe_vehicle_code: Option<String>,
    /// The decoded upstream document, stored verbatim
    pub raw_payload: Value,
}

/// Tables of the price database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    ReferencePeriods,
    Manufacturers,
    CarModels,
    ModelYears,
    Prices,
}

impl Table {
    /// All tables in write order
    pub const ALL: [Table; 5] = [
        Table::ReferencePeriods,
        Table::Manufacturers,
        Table::CarModels,
        Table::ModelYears,
        Table::Prices,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Self::ReferencePeriods => "tabela_referencia",
            Self::Manufacturers => "marca",
            Self::CarModels => "modelo",
            Self::ModelYears => "ano_modelo",
            Self::Prices => "preco",
        }
    }

    /// Human-readable label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReferencePeriods => "Reference periods",
            Self::Manufacturers => "Manufacturers",
            Self::CarModels => "Models",
            Self::ModelYears => "Model-years",
            Self::Prices => "Prices",
        }
    }
}
