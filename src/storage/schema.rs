//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the price database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Monthly reference periods
CREATE TABLE IF NOT EXISTS tabela_referencia (
    fipe_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    mes INTEGER NOT NULL CHECK (mes BETWEEN 1 AND 12),
    ano INTEGER NOT NULL
);

-- Manufacturers
CREATE TABLE IF NOT EXISTS marca (
    fipe_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    codigo_tipo_veiculo INTEGER NOT NULL
);

-- Models, owned by a manufacturer
CREATE TABLE IF NOT EXISTS modelo (
    fipe_id TEXT PRIMARY KEY,
    marca_id TEXT NOT NULL REFERENCES marca(fipe_id),
    display_name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_modelo_marca ON modelo(marca_id);

-- Model-years; upstream reuses year-fuel codes across models
CREATE TABLE IF NOT EXISTS ano_modelo (
    modelo_id TEXT NOT NULL REFERENCES modelo(fipe_id),
    fipe_id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    ano INTEGER NOT NULL,
    tipo_combustivel INTEGER NOT NULL,
    PRIMARY KEY (modelo_id, fipe_id)
);

-- Prices, one per authentication token
CREATE TABLE IF NOT EXISTS preco (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    marca_id TEXT NOT NULL REFERENCES marca(fipe_id),
    modelo_id TEXT NOT NULL REFERENCES modelo(fipe_id),
    ano_modelo_id TEXT NOT NULL,
    codigo_tipo_veiculo INTEGER NOT NULL,
    codigo_tabela_referencia TEXT NOT NULL REFERENCES tabela_referencia(fipe_id),
    autenticacao TEXT NOT NULL UNIQUE,
    data_consulta TEXT,
    mes_referencia TEXT NOT NULL,
    valor TEXT NOT NULL,
    codigo_fipe_veiculo TEXT,
    raw_data TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (modelo_id, ano_modelo_id) REFERENCES ano_modelo(modelo_id, fipe_id)
);

CREATE INDEX IF NOT EXISTS idx_preco_tabela ON preco(codigo_tabela_referencia);
CREATE INDEX IF NOT EXISTS idx_preco_modelo ON preco(modelo_id, ano_modelo_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
