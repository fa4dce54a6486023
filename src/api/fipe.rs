//! Endpoint facade: one method per upstream sub-resource

use super::client::{CachedClient, Params};
use super::schemas::{
    ManufacturerListing, ModelListing, ModelYearListing, PriceDetail, ReferencePeriodListing,
    SchemaViolation,
};
use super::ApiError;
use crate::config::Config;
use serde_json::Value;
use std::time::Duration;

/// Upstream endpoint names, appended to the base URL
pub mod endpoints {
    pub const REFERENCE_PERIODS: &str = "ConsultarTabelaDeReferencia";
    pub const MANUFACTURERS: &str = "ConsultarMarcas";
    pub const MODELS: &str = "ConsultarModelos";
    pub const MODEL_YEARS: &str = "ConsultarAnoModelo";
    pub const PRICE: &str = "ConsultarValorComTodosParametros";
}

/// Everything that identifies one price quote
///
/// The same values become the foreign keys of the stored price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuery {
    pub reference_period_id: String,
    pub vehicle_type_id: i64,
    pub manufacturer_id: String,
    pub model_id: String,
    /// Model-year code, e.g. `"2014-1"`
    pub model_year_id: String,
    pub year: i32,
    pub fuel_type: i32,
}

impl PriceQuery {
    fn params(&self) -> Params {
        vec![
            ("codigoTabelaReferencia", self.reference_period_id.clone()),
            ("codigoMarca", self.manufacturer_id.clone()),
            ("codigoModelo", self.model_id.clone()),
            ("codigoTipoVeiculo", self.vehicle_type_id.to_string()),
            ("anoModelo", self.year.to_string()),
            ("codigoTipoCombustivel", self.fuel_type.to_string()),
            ("tipoConsulta", "tradicional".to_string()),
        ]
    }
}

/// Typed access to the FIPE query service
#[derive(Debug, Clone)]
pub struct FipeApi {
    client: CachedClient,
    reference_ttl: Duration,
}

impl FipeApi {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        Ok(Self::with_client(
            CachedClient::new(config)?,
            Duration::from_secs(config.cache.reference_ttl_secs),
        ))
    }

    pub fn with_client(client: CachedClient, reference_ttl: Duration) -> Self {
        Self {
            client,
            reference_ttl,
        }
    }

    pub fn client(&self) -> &CachedClient {
        &self.client
    }

    /// Lists every reference period; the only listing whose cache expires
    pub async fn get_reference_periods(&self) -> Result<ReferencePeriodListing, ApiError> {
        self.fetch(
            endpoints::REFERENCE_PERIODS,
            Vec::new(),
            Some(self.reference_ttl),
            ReferencePeriodListing::from_value,
        )
        .await
    }

    pub async fn get_manufacturers(
        &self,
        period_id: &str,
        vehicle_type_id: i64,
    ) -> Result<ManufacturerListing, ApiError> {
        let params = vec![
            ("codigoTabelaReferencia", period_id.to_string()),
            ("codigoTipoVeiculo", vehicle_type_id.to_string()),
        ];

        self.fetch(
            endpoints::MANUFACTURERS,
            params,
            None,
            ManufacturerListing::from_value,
        )
        .await
    }

    pub async fn get_car_models(
        &self,
        period_id: &str,
        manufacturer_id: &str,
        vehicle_type_id: i64,
    ) -> Result<ModelListing, ApiError> {
        let params = vec![
            ("codigoTabelaReferencia", period_id.to_string()),
            ("codigoMarca", manufacturer_id.to_string()),
            ("codigoTipoVeiculo", vehicle_type_id.to_string()),
        ];

        self.fetch(endpoints::MODELS, params, None, ModelListing::from_value)
            .await
    }

    pub async fn get_model_years(
        &self,
        period_id: &str,
        manufacturer_id: &str,
        model_id: &str,
        vehicle_type_id: i64,
    ) -> Result<ModelYearListing, ApiError> {
        let params = vec![
            ("codigoTabelaReferencia", period_id.to_string()),
            ("codigoMarca", manufacturer_id.to_string()),
            ("codigoModelo", model_id.to_string()),
            ("codigoTipoVeiculo", vehicle_type_id.to_string()),
        ];

        self.fetch(
            endpoints::MODEL_YEARS,
            params,
            None,
            ModelYearListing::from_value,
        )
        .await
    }

    pub async fn get_price(&self, query: &PriceQuery) -> Result<PriceDetail, ApiError> {
        self.fetch(endpoints::PRICE, query.params(), None, PriceDetail::from_value)
            .await
    }

    /// Queries an endpoint and decodes the document
    ///
    /// A document that does not fit its schema is evicted from the cache so
    /// the next run asks upstream again.
    async fn fetch<T>(
        &self,
        endpoint: &str,
        params: Params,
        ttl: Option<Duration>,
        decode: fn(Value) -> Result<T, SchemaViolation>,
    ) -> Result<T, ApiError> {
        let document = self.client.query(endpoint, &params, ttl).await?;

        match decode(document) {
            Ok(decoded) => Ok(decoded),
            Err(violation) => {
                tracing::error!("Schema violation from {}: {}", endpoint, violation);
                self.client.evict(endpoint, &params)?;
                Err(ApiError::Malformed {
                    endpoint: endpoint.to_string(),
                    message: violation.to_string(),
                })
            }
        }
    }
}
