use serde::Deserialize;
use std::fmt;

/// Main configuration structure for fipe-crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
}

/// Upstream service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL every endpoint name is appended to
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Politeness delay after every successful network call (milliseconds)
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

/// Retry and backoff tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Retries after the first attempt before giving up
    pub max_retries: u32,

    /// Backoff base; attempt `n` waits `base * 2^n`
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff wait
    pub max_delay_ms: u64,

    /// Extra wait after HTTP 429
    pub rate_limit_cooldown_ms: u64,

    /// Extra wait after an HTTP 5xx
    pub server_error_cooldown_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            rate_limit_cooldown_ms: 5_000,
            server_error_cooldown_ms: 5_000,
        }
    }
}

/// On-disk response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Directory holding `<fingerprint>.json` files
    pub directory: String,

    /// Lifetime of the cached reference-period listing (seconds)
    #[serde(default = "default_reference_ttl_secs")]
    pub reference_ttl_secs: u64,
}

/// Crawl behaviour configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    #[serde(default)]
    pub vehicle_type: VehicleType,

    #[serde(default)]
    pub mode: CrawlMode,

    /// Only walk reference periods from this year on
    pub year_from: Option<i32>,

    /// Only walk reference periods up to this year
    pub year_to: Option<i32>,

    /// Where the resume position is kept between runs
    pub checkpoint_path: String,

    /// Log a progress line every N prices
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

/// Upstream vehicle categories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    #[default]
    Car,
    Motorcycle,
    Truck,
}

impl VehicleType {
    /// The `codigoTipoVeiculo` upstream expects
    pub fn id(&self) -> i64 {
        match self {
            Self::Car => 1,
            Self::Motorcycle => 2,
            Self::Truck => 3,
        }
    }
}

/// Which reference periods a run walks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Every listed period inside the optional year bounds
    #[default]
    All,
    /// Only the most recent period known to the database
    Latest,
}

/// What to do when an upstream request fails for one subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Log, skip the subtree and continue with the next sibling
    Skip,
    /// Stop the whole crawl
    Abort,
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

/// Failure handling per traversal level
///
/// `listing` governs the model and model-year listings, `price` the leaf
/// price query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailurePolicy {
    #[serde(default = "default_listing_failure")]
    pub listing: OnFailure,

    #[serde(default = "default_price_failure")]
    pub price: OnFailure,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            listing: default_listing_failure(),
            price: default_price_failure(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_pacing_ms() -> u64 {
    500
}

fn default_reference_ttl_secs() -> u64 {
    60 * 60 * 24 * 30
}

fn default_progress_every() -> u64 {
    100
}

fn default_listing_failure() -> OnFailure {
    OnFailure::Skip
}

fn default_price_failure() -> OnFailure {
    OnFailure::Abort
}
