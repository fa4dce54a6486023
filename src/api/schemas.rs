//! Typed views over upstream documents
//!
//! Upstream keys are mapped onto canonical names with static serde renames.
//! Every listing record must carry both its code and its label; a record
//! missing either is a [`SchemaViolation`], never silently dropped.

use super::fipe::PriceQuery;
use crate::parse::{
    model_year_sort_key, parse_brl, parse_model_year_code, parse_numeric_id,
    parse_reference_label,
};
use crate::storage::{CarModel, Manufacturer, ModelYear, Price, ReferencePeriod};
use crate::ParseError;
use bigdecimal::BigDecimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// A document that does not match the expected shape
#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("unexpected document shape: {0}")]
    Shape(String),

    #[error("record {index} is missing '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("record {index}: {source}")]
    InvalidValue { index: usize, source: ParseError },

    #[error("price is missing '{0}'")]
    MissingPriceField(&'static str),

    #[error("price field '{field}': {source}")]
    InvalidPriceValue {
        field: &'static str,
        source: ParseError,
    },
}

/// Identifiers arrive either as JSON strings or as integers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Code {
    Text(String),
    Integer(i64),
}

impl Code {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Integer(n) => n.to_string(),
        }
    }
}

/// Entries the crawler walks in ascending identifier order
pub trait Keyed {
    /// Numeric ordering key
    fn sort_key(&self) -> i64;
}

fn sorted<T: Keyed>(mut entries: Vec<T>) -> Vec<T> {
    entries.sort_by_key(|entry| entry.sort_key());
    entries
}

fn decode<T: DeserializeOwned>(document: Value) -> Result<T, SchemaViolation> {
    serde_json::from_value(document).map_err(|e| SchemaViolation::Shape(e.to_string()))
}

fn required<T>(value: Option<T>, index: usize, field: &'static str) -> Result<T, SchemaViolation> {
    value.ok_or(SchemaViolation::MissingField { index, field })
}

// ===== Reference periods =====

#[derive(Debug, Deserialize)]
struct RawReferencePeriod {
    #[serde(rename = "Codigo")]
    code: Option<Code>,
    #[serde(rename = "Mes")]
    display_name: Option<String>,
}

/// One entry of the reference period listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePeriodEntry {
    pub code: String,
    /// Raw label, e.g. `"junho/2024 "`
    pub display_name: String,
    pub month: u32,
    pub year: i32,
    pub id: i64,
}

impl Keyed for ReferencePeriodEntry {
    fn sort_key(&self) -> i64 {
        self.id
    }
}

impl ReferencePeriodEntry {
    pub fn to_record(&self) -> ReferencePeriod {
        ReferencePeriod {
            period_id: self.code.clone(),
            display_name: self.display_name.clone(),
            month: self.month,
            year: self.year,
        }
    }
}

/// Response of `ConsultarTabelaDeReferencia`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePeriodListing {
    pub periods: Vec<ReferencePeriodEntry>,
}

impl ReferencePeriodListing {
    pub fn from_value(document: Value) -> Result<Self, SchemaViolation> {
        let raw: Vec<RawReferencePeriod> = decode(document)?;
        let mut periods = Vec::with_capacity(raw.len());

        for (index, entry) in raw.into_iter().enumerate() {
            let code = required(entry.code, index, "Codigo")?.into_string();
            let display_name = required(entry.display_name, index, "Mes")?;

            let (month, year) = parse_reference_label(&display_name)
                .map_err(|source| SchemaViolation::InvalidValue { index, source })?;
            let id = parse_numeric_id(&code)
                .map_err(|source| SchemaViolation::InvalidValue { index, source })?;

            periods.push(ReferencePeriodEntry {
                code,
                display_name,
                month,
                year,
                id,
            });
        }

        Ok(Self { periods })
    }

    /// Groups period codes by year, then month
    pub fn organize_by_year_month(&self) -> BTreeMap<i32, BTreeMap<u32, String>> {
        let mut result: BTreeMap<i32, BTreeMap<u32, String>> = BTreeMap::new();

        for period in &self.periods {
            result
                .entry(period.year)
                .or_default()
                .insert(period.month, period.code.clone());
        }

        result
    }

    /// Periods in ascending identifier order
    pub fn into_sorted(self) -> Vec<ReferencePeriodEntry> {
        sorted(self.periods)
    }
}

// ===== Manufacturers and models =====

#[derive(Debug, Deserialize)]
struct RawListingEntry {
    #[serde(rename = "Value")]
    code: Option<Code>,
    #[serde(rename = "Label")]
    display_name: Option<String>,
}

/// A `{Value, Label}` entry with a numeric code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub code: String,
    pub display_name: String,
    pub id: i64,
}

impl Keyed for ListingEntry {
    fn sort_key(&self) -> i64 {
        self.id
    }
}

impl ListingEntry {
    pub fn to_manufacturer(&self, vehicle_type_id: i64) -> Manufacturer {
        Manufacturer {
            manufacturer_id: self.code.clone(),
            display_name: self.display_name.clone(),
            vehicle_type_id,
        }
    }

    pub fn to_car_model(&self, manufacturer_id: &str) -> CarModel {
        CarModel {
            model_id: self.code.clone(),
            manufacturer_id: manufacturer_id.to_string(),
            display_name: self.display_name.clone(),
        }
    }
}

fn listing_entries(raw: Vec<RawListingEntry>) -> Result<Vec<ListingEntry>, SchemaViolation> {
    raw.into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let code = required(entry.code, index, "Value")?.into_string();
            let display_name = required(entry.display_name, index, "Label")?;
            let id = parse_numeric_id(&code)
                .map_err(|source| SchemaViolation::InvalidValue { index, source })?;

            Ok(ListingEntry {
                code,
                display_name,
                id,
            })
        })
        .collect()
}

/// Response of `ConsultarMarcas`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerListing {
    pub manufacturers: Vec<ListingEntry>,
}

impl ManufacturerListing {
    pub fn from_value(document: Value) -> Result<Self, SchemaViolation> {
        let raw: Vec<RawListingEntry> = decode(document)?;
        Ok(Self {
            manufacturers: listing_entries(raw)?,
        })
    }

    pub fn into_sorted(self) -> Vec<ListingEntry> {
        sorted(self.manufacturers)
    }
}

#[derive(Debug, Deserialize)]
struct RawModelEnvelope {
    #[serde(rename = "Modelos")]
    models: Option<Vec<RawListingEntry>>,
}

/// Response of `ConsultarModelos`; the sibling `Anos` list is ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelListing {
    pub models: Vec<ListingEntry>,
}

impl ModelListing {
    pub fn from_value(document: Value) -> Result<Self, SchemaViolation> {
        let envelope: RawModelEnvelope = decode(document)?;
        let raw = envelope
            .models
            .ok_or_else(|| SchemaViolation::Shape("missing 'Modelos'".to_string()))?;

        Ok(Self {
            models: listing_entries(raw)?,
        })
    }

    pub fn into_sorted(self) -> Vec<ListingEntry> {
        sorted(self.models)
    }
}

// ===== Model-years =====

/// A model-year entry; the code is `"<year>-<fuel>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelYearEntry {
    pub code: String,
    pub display_name: String,
    pub year: i32,
    pub fuel_type: i32,
    pub id: i64,
}

impl Keyed for ModelYearEntry {
    fn sort_key(&self) -> i64 {
        self.id
    }
}

impl ModelYearEntry {
    pub fn to_record(&self, model_id: &str) -> ModelYear {
        ModelYear {
            model_id: model_id.to_string(),
            model_year_id: self.code.clone(),
            display_name: self.display_name.clone(),
            year: self.year,
            fuel_type: self.fuel_type,
        }
    }
}

/// Response of `ConsultarAnoModelo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelYearListing {
    pub model_years: Vec<ModelYearEntry>,
}

impl ModelYearListing {
    pub fn from_value(document: Value) -> Result<Self, SchemaViolation> {
        let raw: Vec<RawListingEntry> = decode(document)?;
        let mut model_years = Vec::with_capacity(raw.len());

        for (index, entry) in raw.into_iter().enumerate() {
            let code = required(entry.code, index, "Value")?.into_string();
            let display_name = required(entry.display_name, index, "Label")?;
            let (year, fuel_type) = parse_model_year_code(&code)
                .map_err(|source| SchemaViolation::InvalidValue { index, source })?;

            model_years.push(ModelYearEntry {
                code,
                display_name,
                year,
                fuel_type,
                id: model_year_sort_key(year, fuel_type),
            });
        }

        Ok(Self { model_years })
    }

    pub fn into_sorted(self) -> Vec<ModelYearEntry> {
        sorted(self.model_years)
    }
}

// ===== Prices =====

#[derive(Debug, Deserialize)]
struct RawPriceDetail {
    #[serde(rename = "Valor")]
    value: Option<String>,
    #[serde(rename = "Marca")]
    manufacturer: Option<String>,
    #[serde(rename = "Modelo")]
    model: Option<String>,
    #[serde(rename = "AnoModelo")]
    model_year: Option<Code>,
    #[serde(rename = "Combustivel")]
    fuel: Option<String>,
    #[serde(rename = "CodigoFipe")]
    fipe_vehicle_code: Option<String>,
    #[serde(rename = "MesReferencia")]
    reference_month_label: Option<String>,
    #[serde(rename = "Autenticacao")]
    authentication_token: Option<String>,
    #[serde(rename = "TipoVeiculo")]
    vehicle_type: Option<Code>,
    #[serde(rename = "SiglaCombustivel")]
    fuel_abbreviation: Option<String>,
    #[serde(rename = "DataConsulta")]
    query_timestamp: Option<String>,
}

/// Response of `ConsultarValorComTodosParametros`
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDetail {
    pub value: BigDecimal,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub model_year: Option<String>,
    pub fuel: Option<String>,
    pub fipe_vehicle_code: Option<String>,
    /// Trimmed label, e.g. `"junho de 2024"`
    pub reference_month_label: String,
    pub authentication_token: String,
    pub vehicle_type: Option<String>,
    pub fuel_abbreviation: Option<String>,
    pub query_timestamp: Option<String>,
    /// The whole decoded document
    pub raw_payload: Value,
}

impl PriceDetail {
    pub fn from_value(document: Value) -> Result<Self, SchemaViolation> {
        let raw = RawPriceDetail::deserialize(&document)
            .map_err(|e| SchemaViolation::Shape(e.to_string()))?;

        let value_text = raw
            .value
            .ok_or(SchemaViolation::MissingPriceField("Valor"))?;
        let value = parse_brl(&value_text).map_err(|source| SchemaViolation::InvalidPriceValue {
            field: "Valor",
            source,
        })?;
        let reference_month_label = raw
            .reference_month_label
            .ok_or(SchemaViolation::MissingPriceField("MesReferencia"))?
            .trim()
            .to_string();
        let authentication_token = raw
            .authentication_token
            .ok_or(SchemaViolation::MissingPriceField("Autenticacao"))?;

        Ok(Self {
            value,
            manufacturer: raw.manufacturer,
            model: raw.model,
            model_year: raw.model_year.map(Code::into_string),
            fuel: raw.fuel,
            fipe_vehicle_code: raw.fipe_vehicle_code,
            reference_month_label,
            authentication_token,
            vehicle_type: raw.vehicle_type.map(Code::into_string),
            fuel_abbreviation: raw.fuel_abbreviation,
            query_timestamp: raw.query_timestamp,
            raw_payload: document,
        })
    }

    /// Converts into a storage record, taking every foreign key from the query
    pub fn into_record(self, query: &PriceQuery) -> Price {
        Price {
            manufacturer_id: query.manufacturer_id.clone(),
            model_id: query.model_id.clone(),
            model_year_id: query.model_year_id.clone(),
            vehicle_type_id: query.vehicle_type_id,
            reference_period_id: query.reference_period_id.clone(),
            authentication_token: self.authentication_token,
            query_timestamp: self.query_timestamp,
            reference_month_label: self.reference_month_label,
            value: self.value,
            fipe_vehicle_code: self.fipe_vehicle_code,
            raw_payload: self.raw_payload,
        }
    }
}
