//! Crawler coordinator - main crawl orchestration logic
//!
//! The walk is strictly sequential: every request is awaited before the
//! next one is issued. The coordinator owns the checkpoint and updates it
//! as it descends, so an interruption at any await point leaves a resume
//! position that re-does at most the entry in progress.

use crate::api::{ApiError, FipeApi, ListingEntry, ModelYearEntry, PriceQuery, ReferencePeriodEntry};
use crate::config::{Config, CrawlConfig, CrawlMode, FailurePolicy, OnFailure};
use crate::crawler::{CrawlOutcome, CrawlProgress, CrawlStats};
use crate::state::{Checkpoint, Level};
use crate::storage::{Repository, SqliteRepository};
use crate::CrawlError;
use std::future::Future;
use std::path::Path;
use std::time::Instant;

/// Main crawler structure
pub struct Crawler<R: Repository = SqliteRepository> {
    api: FipeApi,
    repository: R,
    checkpoint: Checkpoint,
    vehicle_type_id: i64,
    mode: CrawlMode,
    year_from: Option<i32>,
    year_to: Option<i32>,
    policy: FailurePolicy,
    progress_every: u64,
    stats: CrawlStats,
    progress: CrawlProgress,
    started: Instant,
}

impl Crawler<SqliteRepository> {
    /// Creates a crawler backed by the configured SQLite database
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `checkpoint` - Resume position; `Checkpoint::default()` starts over
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Successfully created crawler
    /// * `Err(CrawlError)` - Failed to open the database or cache
    pub fn new(config: &Config, checkpoint: Checkpoint) -> Result<Self, CrawlError> {
        let repository = SqliteRepository::new(Path::new(&config.output.database_path))?;
        let api = FipeApi::new(config)?;

        Ok(Self::with_parts(api, repository, &config.crawl, checkpoint))
    }
}

impl<R: Repository> Crawler<R> {
    /// Assembles a crawler from an API facade and any repository
    pub fn with_parts(
        api: FipeApi,
        repository: R,
        settings: &CrawlConfig,
        checkpoint: Checkpoint,
    ) -> Self {
        Self {
            api,
            repository,
            checkpoint,
            vehicle_type_id: settings.vehicle_type.id(),
            mode: settings.mode,
            year_from: settings.year_from,
            year_to: settings.year_to,
            policy: settings.failure_policy,
            progress_every: settings.progress_every.max(1),
            stats: CrawlStats::default(),
            progress: CrawlProgress::hidden(),
            started: Instant::now(),
        }
    }

    /// Reports progress through `progress` instead of a hidden display
    pub fn with_progress(mut self, progress: CrawlProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Snapshot of the current resume position
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn progress(&self) -> &CrawlProgress {
        &self.progress
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Runs the crawl to completion
    pub async fn run(&mut self) -> Result<CrawlStats, CrawlError> {
        self.started = Instant::now();
        self.walk().await?;
        self.stats.log_summary();
        Ok(self.stats.clone())
    }

    /// Runs the crawl until it completes or `shutdown` resolves
    ///
    /// On shutdown the in-flight request is dropped and the checkpoint
    /// snapshot is returned. Database writes are synchronous, so a write is
    /// never cut in half.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<CrawlOutcome, CrawlError>
    where
        F: Future<Output = ()>,
    {
        self.started = Instant::now();

        let finished = tokio::select! {
            result = self.walk() => Some(result),
            _ = shutdown => None,
        };

        match finished {
            Some(result) => {
                result?;
                self.stats.log_summary();
                Ok(CrawlOutcome::Completed(self.stats.clone()))
            }
            None => {
                tracing::warn!(
                    "Crawl interrupted at checkpoint {:?} after {} prices",
                    self.checkpoint,
                    self.stats.prices
                );
                Ok(CrawlOutcome::Interrupted(self.checkpoint))
            }
        }
    }

    async fn walk(&mut self) -> Result<(), CrawlError> {
        let listing = self.api.get_reference_periods().await?;
        let by_year = listing.organize_by_year_month();
        if let (Some(first), Some(last)) = (by_year.keys().next(), by_year.keys().next_back()) {
            tracing::info!(
                "{} reference periods listed upstream, {} to {}",
                by_year.values().map(|months| months.len()).sum::<usize>(),
                first,
                last
            );
        }
        for (year, months) in &by_year {
            tracing::debug!("{}: {} reference periods", year, months.len());
        }

        let periods = listing.into_sorted();
        for period in &periods {
            self.repository.assert_reference_period(&period.to_record())?;
        }

        let selected = self.select_periods(periods)?;
        self.progress.begin(Level::Period, selected.len());

        for period in selected {
            self.progress.advance(Level::Period, &period.display_name);
            if self.checkpoint.should_skip(Level::Period, period.id) {
                self.stats.resumed_skips += 1;
                continue;
            }

            self.checkpoint.enter(Level::Period, period.id);
            self.stats.periods += 1;
            tracing::info!(
                "Crawling reference period {} ({})",
                period.display_name.trim(),
                period.code
            );

            self.crawl_period(&period).await?;
        }

        Ok(())
    }

    /// Applies the crawl mode to the listed periods
    fn select_periods(
        &self,
        periods: Vec<ReferencePeriodEntry>,
    ) -> Result<Vec<ReferencePeriodEntry>, CrawlError> {
        match self.mode {
            CrawlMode::All => Ok(periods
                .into_iter()
                .filter(|p| self.year_from.map_or(true, |from| p.year >= from))
                .filter(|p| self.year_to.map_or(true, |to| p.year <= to))
                .collect()),
            CrawlMode::Latest => {
                let Some(latest) = self.repository.latest_reference_period()? else {
                    tracing::warn!("No reference period stored; nothing to crawl");
                    return Ok(Vec::new());
                };

                Ok(periods
                    .into_iter()
                    .filter(|p| p.code == latest.period_id)
                    .collect())
            }
        }
    }

    async fn crawl_period(&mut self, period: &ReferencePeriodEntry) -> Result<(), CrawlError> {
        let manufacturers = self
            .api
            .get_manufacturers(&period.code, self.vehicle_type_id)
            .await?
            .into_sorted();
        tracing::debug!("{} manufacturers in period {}", manufacturers.len(), period.code);
        self.progress.begin(Level::Manufacturer, manufacturers.len());

        for manufacturer in manufacturers {
            self.progress
                .advance(Level::Manufacturer, &manufacturer.display_name);
            if self
                .checkpoint
                .should_skip(Level::Manufacturer, manufacturer.id)
            {
                self.stats.resumed_skips += 1;
                continue;
            }

            self.checkpoint.enter(Level::Manufacturer, manufacturer.id);
            self.repository
                .assert_manufacturer(&manufacturer.to_manufacturer(self.vehicle_type_id))?;
            self.stats.manufacturers += 1;
            tracing::info!(
                "Manufacturer {} ({})",
                manufacturer.display_name,
                manufacturer.code
            );

            self.crawl_manufacturer(period, &manufacturer).await?;
        }

        Ok(())
    }

    async fn crawl_manufacturer(
        &mut self,
        period: &ReferencePeriodEntry,
        manufacturer: &ListingEntry,
    ) -> Result<(), CrawlError> {
        let listing = self
            .api
            .get_car_models(&period.code, &manufacturer.code, self.vehicle_type_id)
            .await;

        let models = match listing {
            Ok(listing) => listing.into_sorted(),
            Err(e) => {
                let context = format!(
                    "models of manufacturer {} in period {}",
                    manufacturer.code, period.code
                );
                return self.on_failure(self.policy.listing, &context, e);
            }
        };

        self.progress.begin(Level::Model, models.len());

        for model in models {
            self.progress.advance(Level::Model, &model.display_name);
            if self.checkpoint.should_skip(Level::Model, model.id) {
                self.stats.resumed_skips += 1;
                continue;
            }

            self.checkpoint.enter(Level::Model, model.id);
            self.repository
                .assert_car_model(&model.to_car_model(&manufacturer.code))?;
            self.stats.models += 1;
            tracing::debug!("Model {} ({})", model.display_name, model.code);

            self.crawl_model(period, manufacturer, &model).await?;
        }

        Ok(())
    }

    async fn crawl_model(
        &mut self,
        period: &ReferencePeriodEntry,
        manufacturer: &ListingEntry,
        model: &ListingEntry,
    ) -> Result<(), CrawlError> {
        let listing = self
            .api
            .get_model_years(
                &period.code,
                &manufacturer.code,
                &model.code,
                self.vehicle_type_id,
            )
            .await;

        let model_years = match listing {
            Ok(listing) => listing.into_sorted(),
            Err(e) => {
                let context = format!("model-years of model {} in period {}", model.code, period.code);
                return self.on_failure(self.policy.listing, &context, e);
            }
        };

        self.progress.begin(Level::YearModel, model_years.len());

        for model_year in model_years {
            self.progress
                .advance(Level::YearModel, &model_year.display_name);
            if self.checkpoint.should_skip(Level::YearModel, model_year.id) {
                self.stats.resumed_skips += 1;
                continue;
            }

            self.checkpoint.enter(Level::YearModel, model_year.id);
            self.repository
                .assert_model_year(&model_year.to_record(&model.code))?;
            self.stats.model_years += 1;

            self.crawl_price(period, manufacturer, model, &model_year)
                .await?;
        }

        Ok(())
    }

    async fn crawl_price(
        &mut self,
        period: &ReferencePeriodEntry,
        manufacturer: &ListingEntry,
        model: &ListingEntry,
        model_year: &ModelYearEntry,
    ) -> Result<(), CrawlError> {
        let query = PriceQuery {
            reference_period_id: period.code.clone(),
            vehicle_type_id: self.vehicle_type_id,
            manufacturer_id: manufacturer.code.clone(),
            model_id: model.code.clone(),
            model_year_id: model_year.code.clone(),
            year: model_year.year,
            fuel_type: model_year.fuel_type,
        };

        let detail = match self.api.get_price(&query).await {
            Ok(detail) => detail,
            Err(e) => {
                let context = format!(
                    "price of {}/{}/{} in period {}",
                    manufacturer.code, model.code, model_year.code, period.code
                );
                return self.on_failure(self.policy.price, &context, e);
            }
        };

        self.repository.assert_price(&detail.into_record(&query))?;
        self.stats.prices += 1;

        if self.stats.prices % self.progress_every == 0 {
            let elapsed = self.started.elapsed();
            let rate = self.stats.prices as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "Progress: {} prices stored, at {:?}, {:.2} prices/sec",
                self.stats.prices,
                self.checkpoint,
                rate
            );
        }

        Ok(())
    }

    /// Applies the failure policy to an upstream error
    ///
    /// Only exhausted retries and upstream error envelopes may be skipped;
    /// everything else aborts regardless of policy.
    fn on_failure(
        &mut self,
        policy: OnFailure,
        context: &str,
        error: ApiError,
    ) -> Result<(), CrawlError> {
        if policy == OnFailure::Skip && error.is_request_failure() {
            tracing::warn!("Skipping {}: {}", context, error);
            self.stats.skipped_subtrees += 1;
            return Ok(());
        }

        tracing::error!("Failed to fetch {}: {}", context, error);
        Err(error.into())
    }
}
