//! Upstream access for the FIPE query service
//!
//! This module contains everything that talks to the remote API:
//! - An on-disk response cache keyed by request fingerprint
//! - Retry with exponential backoff and throttling cool-downs
//! - A JSON client that checks upstream error envelopes
//! - Typed views over the raw listing and price documents
//! - One method per upstream sub-resource

mod cache;
mod client;
mod fipe;
mod retry;
mod schemas;

pub use cache::ResponseCache;
pub use client::{build_http_client, CachedClient, Params};
pub use fipe::{endpoints, FipeApi, PriceQuery};
pub use retry::{FailureKind, RetryPolicy};
pub use schemas::{
    Keyed, ListingEntry, ManufacturerListing, ModelListing, ModelYearEntry, ModelYearListing,
    PriceDetail, ReferencePeriodEntry, ReferencePeriodListing, SchemaViolation,
};

use thiserror::Error;

/// Errors raised while querying the upstream service
#[derive(Debug, Error)]
pub enum ApiError {
    /// A single failed attempt; retried internally and only surfaced inside
    /// [`ApiError::UpstreamRequest`]
    #[error("Transport failure on {endpoint} (status {status:?}): {message}")]
    Transport {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Request to {endpoint} failed after {attempts} attempts: {last_error}")]
    UpstreamRequest {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Upstream rejected {endpoint}: {message}")]
    UpstreamSemantic { endpoint: String, message: String },

    #[error("Malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    #[error("Response cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl ApiError {
    /// True for failures the crawl's failure policy may choose to skip
    ///
    /// Malformed payloads and local cache failures never qualify.
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            Self::UpstreamRequest { .. } | Self::UpstreamSemantic { .. }
        )
    }
}
