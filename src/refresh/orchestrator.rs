//! The refresh loop: every (ingredient, vendor) pair through search,
//! extraction and persistence, one pair at a time.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::data::models::NewAutomaticPrice;
use crate::data::prices::PriceCatalog;
use crate::refresh::candidates::{Candidate, enumerate};
use crate::refresh::extract::{Extraction, PriceExtractor};
use crate::refresh::pacer::Pace;
use crate::refresh::search::{RESULT_COUNT, SearchProvider, build_query, snippet_block};
use crate::refresh::status::{RefreshSummary, StatusStore};
use crate::utils::fmt_duration;

/// Why a pair produced no new price without anything going wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The search returned nothing worth reading.
    NoResults,
    /// The model found no price in the snippets.
    NoPrice,
}

/// Result of processing one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    Updated,
    Skipped(SkipReason),
    Failed,
}

/// Collaborators for one run.
#[derive(Clone)]
pub struct RefreshDeps {
    pub catalog: Arc<dyn PriceCatalog>,
    pub search: Arc<dyn SearchProvider>,
    pub extractor: Arc<dyn PriceExtractor>,
    pub pace: Arc<dyn Pace>,
}

pub struct Orchestrator {
    deps: RefreshDeps,
    status: StatusStore,
    heartbeat_every: Duration,
}

impl Orchestrator {
    pub fn new(deps: RefreshDeps, status: StatusStore, heartbeat_every: Duration) -> Self {
        Self {
            deps,
            status,
            heartbeat_every,
        }
    }

    /// Process every pair and return the counters.
    ///
    /// Per-pair problems are counted, never returned. An `Err` means the run
    /// as a whole could not continue (catalog unreadable, status store
    /// unreachable, or cancellation).
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RefreshSummary> {
        let started = Instant::now();

        let ingredients = self
            .deps
            .catalog
            .list_ingredients()
            .await
            .context("Failed to load ingredients")?;
        let vendors = self
            .deps
            .catalog
            .list_vendors()
            .await
            .context("Failed to load vendors")?;

        let ingredient_count = ingredients.len();
        let vendor_count = vendors.len();
        let candidates = enumerate(ingredients, vendors);
        let mut summary = RefreshSummary {
            total: u32::try_from(candidates.len()).context("Too many price candidates")?,
            ..RefreshSummary::default()
        };

        info!(
            ingredients = ingredient_count,
            vendors = vendor_count,
            total = summary.total,
            "Price refresh started"
        );

        let mut last_heartbeat = Instant::now();
        for (index, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                bail!(
                    "Price refresh cancelled after {index} of {} pairs",
                    summary.total
                );
            }

            if last_heartbeat.elapsed() >= self.heartbeat_every {
                self.status
                    .heartbeat()
                    .await
                    .context("Failed to record refresh heartbeat")?;
                last_heartbeat = Instant::now();
            }

            tokio::select! {
                _ = self.deps.pace.wait() => {}
                _ = cancel.cancelled() => {
                    bail!("Price refresh cancelled after {index} of {} pairs", summary.total);
                }
            }

            match self.process(candidate).await {
                PairOutcome::Updated => summary.updated += 1,
                PairOutcome::Skipped(_) => summary.skipped += 1,
                PairOutcome::Failed => summary.failed += 1,
            }
        }

        debug_assert_eq!(summary.processed(), summary.total);
        info!(
            updated = summary.updated,
            failed = summary.failed,
            skipped = summary.skipped,
            total = summary.total,
            duration = fmt_duration(started.elapsed()),
            "Price refresh finished"
        );
        Ok(summary)
    }

    /// Lookup, extraction and persistence for one pair. Pacing is the
    /// caller's job.
    pub async fn process(&self, candidate: &Candidate) -> PairOutcome {
        let ingredient = candidate.ingredient.name.as_str();
        let vendor = candidate.vendor.name.as_str();

        let query = build_query(candidate);
        let hits = match self.deps.search.search(&query, RESULT_COUNT).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(ingredient, vendor, error = ?e, "Price search failed");
                return PairOutcome::Failed;
            }
        };

        let Some(snippets) = snippet_block(&hits) else {
            debug!(ingredient, vendor, "No search results, skipping");
            return PairOutcome::Skipped(SkipReason::NoResults);
        };

        let (price, unit) = match self.deps.extractor.extract(candidate, &snippets).await {
            Ok(Extraction::Price { price, unit }) => (price, unit),
            Ok(Extraction::NoPrice) => {
                debug!(ingredient, vendor, "No price in search results, skipping");
                return PairOutcome::Skipped(SkipReason::NoPrice);
            }
            Err(e) => {
                warn!(ingredient, vendor, error = ?e, "Price extraction failed");
                return PairOutcome::Failed;
            }
        };

        let record = NewAutomaticPrice {
            ingredient_id: candidate.ingredient.id,
            vendor_id: candidate.vendor.id,
            price: round_cents(price),
            unit: unit.unwrap_or_else(|| candidate.ingredient.unit.clone()),
            recorded_on: Utc::now().date_naive(),
        };

        match self.deps.catalog.replace_automatic_price(&record).await {
            Ok(()) => {
                debug!(ingredient, vendor, price, unit = %record.unit, "Automatic price updated");
                PairOutcome::Updated
            }
            Err(e) => {
                error!(ingredient, vendor, error = ?e, "Failed to persist automatic price");
                PairOutcome::Failed
            }
        }
    }
}

/// Prices are stored as NUMERIC(10, 2).
fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted search and extraction fakes keyed by vendor name.

    use super::*;
    use crate::refresh::search::SearchHit;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone)]
    pub enum SearchScript {
        Hits(Vec<SearchHit>),
        Error,
    }

    #[derive(Clone)]
    pub enum ExtractScript {
        Price(f64, Option<&'static str>),
        NoPrice,
        Error,
        Panic,
    }

    /// Search fake: answers by vendor name, records every query.
    #[derive(Default)]
    pub struct ScriptedSearch {
        by_vendor: HashMap<String, SearchScript>,
        pub queries: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, vendor: &str, script: SearchScript) -> Self {
            self.by_vendor.insert(vendor.to_owned(), script);
            self
        }

        pub fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedSearch {
        async fn search(&self, query: &str, _count: usize) -> Result<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_owned());
            let script = self
                .by_vendor
                .iter()
                .find(|(vendor, _)| query.starts_with(vendor.as_str()))
                .map(|(_, script)| script.clone());
            match script {
                Some(SearchScript::Hits(hits)) => Ok(hits),
                Some(SearchScript::Error) => Err(anyhow!("search service unavailable")),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Extraction fake keyed by (ingredient, vendor) names.
    #[derive(Default)]
    pub struct ScriptedExtractor {
        by_pair: HashMap<(String, String), ExtractScript>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedExtractor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, ingredient: &str, vendor: &str, script: ExtractScript) -> Self {
            self.by_pair
                .insert((ingredient.to_owned(), vendor.to_owned()), script);
            self
        }

        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PriceExtractor for ScriptedExtractor {
        async fn extract(&self, candidate: &Candidate, _snippets: &str) -> Result<Extraction> {
            let key = (
                candidate.ingredient.name.clone(),
                candidate.vendor.name.clone(),
            );
            self.calls.lock().unwrap().push(key.clone());
            match self.by_pair.get(&key).cloned() {
                Some(ExtractScript::Price(price, unit)) => Ok(Extraction::Price {
                    price,
                    unit: unit.map(str::to_owned),
                }),
                Some(ExtractScript::NoPrice) | None => Ok(Extraction::NoPrice),
                Some(ExtractScript::Error) => Err(anyhow!("model returned prose")),
                Some(ExtractScript::Panic) => panic!("extractor exploded"),
            }
        }
    }

    pub fn hit(title: &str, description: &str) -> SearchHit {
        SearchHit {
            title: title.to_owned(),
            description: description.to_owned(),
        }
    }
}
