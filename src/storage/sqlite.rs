//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Repository trait.
//! Every assertion runs in its own transaction so an interrupted crawl never
//! leaves a half-written row behind.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Repository, StorageError, StorageResult};
use crate::storage::{CarModel, Manufacturer, ModelYear, Price, ReferencePeriod, Table};
use bigdecimal::BigDecimal;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params};
use std::path::Path;
use std::str::FromStr;

/// SQLite storage backend
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Creates a new SqliteRepository instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteRepository)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Runs a single write statement inside its own transaction
    ///
    /// Returns the number of changed rows.
    fn write_one<P: Params>(&mut self, sql: &str, params: P) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(sql, params).map_err(map_constraint)?;
        tx.commit()?;
        Ok(changed)
    }
}

/// Surfaces constraint failures as their own error variant
fn map_constraint(error: rusqlite::Error) -> StorageError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation(
                message.clone().unwrap_or_else(|| failure.to_string()),
            )
        }
        _ => StorageError::Sqlite(error),
    }
}

impl Repository for SqliteRepository {
    // ===== Hierarchy =====

    fn assert_reference_period(&mut self, period: &ReferencePeriod) -> StorageResult<bool> {
        let changed = self.write_one(
            "INSERT INTO tabela_referencia (fipe_id, display_name, mes, ano)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(fipe_id) DO NOTHING",
            params![
                period.period_id,
                period.display_name,
                period.month,
                period.year
            ],
        )?;
        Ok(changed > 0)
    }

    fn assert_manufacturer(&mut self, manufacturer: &Manufacturer) -> StorageResult<bool> {
        let changed = self.write_one(
            "INSERT INTO marca (fipe_id, display_name, codigo_tipo_veiculo)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(fipe_id) DO NOTHING",
            params![
                manufacturer.manufacturer_id,
                manufacturer.display_name,
                manufacturer.vehicle_type_id
            ],
        )?;
        Ok(changed > 0)
    }

    fn assert_car_model(&mut self, model: &CarModel) -> StorageResult<bool> {
        let changed = self.write_one(
            "INSERT INTO modelo (fipe_id, marca_id, display_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(fipe_id) DO NOTHING",
            params![model.model_id, model.manufacturer_id, model.display_name],
        )?;
        Ok(changed > 0)
    }

    fn assert_model_year(&mut self, model_year: &ModelYear) -> StorageResult<bool> {
        let changed = self.write_one(
            "INSERT INTO ano_modelo (modelo_id, fipe_id, display_name, ano, tipo_combustivel)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(modelo_id, fipe_id) DO NOTHING",
            params![
                model_year.model_id,
                model_year.model_year_id,
                model_year.display_name,
                model_year.year,
                model_year.fuel_type
            ],
        )?;
        Ok(changed > 0)
    }

    fn assert_price(&mut self, price: &Price) -> StorageResult<()> {
        let raw = serde_json::to_string(&price.raw_payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        self.write_one(
            "INSERT INTO preco (
                marca_id, modelo_id, ano_modelo_id, codigo_tipo_veiculo,
                codigo_tabela_referencia, autenticacao, data_consulta,
                mes_referencia, valor, codigo_fipe_veiculo, raw_data, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(autenticacao) DO UPDATE SET
                valor = excluded.valor,
                data_consulta = excluded.data_consulta,
                mes_referencia = excluded.mes_referencia,
                raw_data = excluded.raw_data,
                updated_at = excluded.updated_at",
            params![
                price.manufacturer_id,
                price.model_id,
                price.model_year_id,
                price.vehicle_type_id,
                price.reference_period_id,
                price.authentication_token,
                price.query_timestamp,
                price.reference_month_label,
                price.value.to_string(),
                price.fipe_vehicle_code,
                raw,
                now
            ],
        )?;
        Ok(())
    }

    // ===== Queries =====

    fn latest_reference_period(&self) -> StorageResult<Option<ReferencePeriod>> {
        let period = self
            .conn
            .query_row(
                "SELECT fipe_id, display_name, mes, ano FROM tabela_referencia
                 ORDER BY ano DESC, mes DESC LIMIT 1",
                [],
                |row| {
                    Ok(ReferencePeriod {
                        period_id: row.get(0)?,
                        display_name: row.get(1)?,
                        month: row.get(2)?,
                        year: row.get(3)?,
                    })
                },
            )
            .optional()?;

        Ok(period)
    }

    fn get_price_by_token(&self, token: &str) -> StorageResult<Option<Price>> {
        let row = self
            .conn
            .query_row(
                "SELECT marca_id, modelo_id, ano_modelo_id, codigo_tipo_veiculo,
                        codigo_tabela_referencia, autenticacao, data_consulta,
                        mes_referencia, valor, codigo_fipe_veiculo, raw_data
                 FROM preco WHERE autenticacao = ?1",
                params![token],
                |row| {
                    Ok((
                        Price {
                            manufacturer_id: row.get(0)?,
                            model_id: row.get(1)?,
                            model_year_id: row.get(2)?,
                            vehicle_type_id: row.get(3)?,
                            reference_period_id: row.get(4)?,
                            authentication_token: row.get(5)?,
                            query_timestamp: row.get(6)?,
                            reference_month_label: row.get(7)?,
                            value: BigDecimal::default(),
                            fipe_vehicle_code: row.get(9)?,
                            raw_payload: serde_json::Value::Null,
                        },
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((mut price, value, raw)) = row else {
            return Ok(None);
        };

        price.value = BigDecimal::from_str(&value)
            .map_err(|e| StorageError::Serialization(format!("valor '{}': {}", value, e)))?;
        price.raw_payload = serde_json::from_str(&raw)
            .map_err(|e| StorageError::Serialization(format!("raw_data: {}", e)))?;

        Ok(Some(price))
    }

    fn count_rows(&self, table: Table) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Initializes the database at the given path
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Successfully opened/created database
/// * `Err(rusqlite::Error)` - Failed to open database
fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
