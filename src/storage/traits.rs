//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{CarModel, Manufacturer, ModelYear, Price, ReferencePeriod, Table};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A uniqueness, NOT NULL, CHECK or foreign-key constraint rejected a write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every `assert_*` method is idempotent. Foreign keys are always supplied
/// by the caller; the repository never infers them.
pub trait Repository {
    // ===== Hierarchy =====

    /// Inserts a reference period unless its id is already stored
    ///
    /// # Returns
    ///
    /// `true` when a new row was written
    fn assert_reference_period(&mut self, period: &ReferencePeriod) -> StorageResult<bool>;

    /// Inserts a manufacturer unless its id is already stored
    fn assert_manufacturer(&mut self, manufacturer: &Manufacturer) -> StorageResult<bool>;

    /// Inserts a model unless its id is already stored
    ///
    /// Fails with [`StorageError::ConstraintViolation`] when the manufacturer
    /// does not exist.
    fn assert_car_model(&mut self, model: &CarModel) -> StorageResult<bool>;

    /// Inserts a model-year unless `(model_id, model_year_id)` is already stored
    fn assert_model_year(&mut self, model_year: &ModelYear) -> StorageResult<bool>;

    /// Inserts a price, or refreshes the mutable columns of the row sharing
    /// its authentication token
    ///
    /// Only the value, query timestamp, reference month label and raw payload
    /// are updated; the foreign keys of an existing row never change.
    fn assert_price(&mut self, price: &Price) -> StorageResult<()>;

    // ===== Queries =====

    /// Most recent reference period by (year, month)
    fn latest_reference_period(&self) -> StorageResult<Option<ReferencePeriod>>;

    /// Looks a price up by its authentication token
    fn get_price_by_token(&self, token: &str) -> StorageResult<Option<Price>>;

    /// Number of rows in a table
    fn count_rows(&self, table: Table) -> StorageResult<u64>;
}
