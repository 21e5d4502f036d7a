//! The whole harvest for one listing URL: walk, enrich, dedupe.

use crate::dedupe::dedupe;
use crate::enrich::{EnrichStats, Enricher};
use crate::fetch::{FetchFailure, Fetcher, Retriever, build_retriever};
use crate::paginate::{Termination, WalkOptions, Walker};
use crate::rate::RateLimitPolicy;
use crate::record::Record;
use crate::session::SessionContext;
use crate::sink::{RecordEnrichment, apply_enrichments};
use harvest_common::{FetchStrategy, HarvestError};
use harvest_config::{EnrichConfig, FetchConfig, HarvestConfig, WalkConfig};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What to harvest. Unset limits fall back to configuration.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub url: String,
    /// Only list containers carrying this class are extracted.
    pub class_hint: Option<String>,
    pub max_pages: Option<usize>,
    pub max_details: Option<usize>,
    pub enrich: bool,
}

impl HarvestRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            class_hint: None,
            max_pages: None,
            max_details: None,
            enrich: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HarvestReport {
    pub records: Vec<Record>,
    pub pages: usize,
    pub strategy: Option<FetchStrategy>,
    pub termination: Termination,
    /// Why the first page could not be loaded, when it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Per-strategy failures behind `failure`, or the failed navigation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FetchFailure>,
    pub enrichment: EnrichStats,
    pub duplicates_removed: usize,
}

impl HarvestReport {
    /// True when no strategy could load the listing at all.
    pub fn fetch_exhausted(&self) -> bool {
        self.termination == Termination::FetchFailed
    }
}

pub struct Harvester {
    walker: Walker,
    enricher: Enricher,
    walk: WalkConfig,
    enrich: EnrichConfig,
    lookups: Vec<Arc<dyn RecordEnrichment>>,
}

impl Harvester {
    pub fn new(walker: Walker, enricher: Enricher, walk: WalkConfig, enrich: EnrichConfig) -> Self {
        Self {
            walker,
            enricher,
            walk,
            enrich,
            lookups: Vec::new(),
        }
    }

    /// Wire fetcher, walker and enricher from configuration. The walker and
    /// the enricher share one session and one rate policy.
    pub fn from_config(cfg: &HarvestConfig) -> Result<Self, HarvestError> {
        let session = SessionContext::from_config(&cfg.session);
        let rate = Arc::new(RateLimitPolicy::new(cfg.enrich.min_interval()));

        let fetcher = Fetcher::from_config(&cfg.fetch, cfg.walk.settle())?;
        let walker = Walker::new(fetcher, session.clone(), rate.clone());
        let enricher = Enricher::new(
            detail_chain(&cfg.fetch, cfg.walk.settle())?,
            session,
            cfg.fetch.detail_timeout(),
            rate,
        );
        Ok(Self::new(walker, enricher, cfg.walk.clone(), cfg.enrich.clone()))
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn RecordEnrichment>) -> Self {
        self.lookups.push(lookup);
        self
    }

    pub async fn run(&self, req: &HarvestRequest, stop: &CancellationToken) -> HarvestReport {
        let opts = WalkOptions {
            max_pages: req.max_pages.unwrap_or(self.walk.max_pages),
            near_duplicate_threshold: self.walk.near_duplicate_threshold,
            class_hint: req.class_hint.clone(),
        };
        let outcome = self.walker.walk(&req.url, &opts, stop).await;
        let mut records = outcome.records;

        let mut enrichment = EnrichStats::default();
        if req.enrich && self.enrich.enabled && !records.is_empty() {
            let limit = req.max_details.or(self.enrich.max_details);
            enrichment = if self.enrich.workers > 1 {
                self.enricher
                    .enrich_concurrent(&mut records, limit, self.enrich.workers, stop)
                    .await
            } else {
                self.enricher.enrich_all(&mut records, limit, stop).await
            };
            tracing::info!(
                target: "harvest.pipeline",
                attempted = enrichment.attempted,
                enriched = enrichment.enriched,
                failed = enrichment.failed,
                "enrich.finished"
            );
        }

        let before = records.len();
        let mut records = dedupe(records);
        let duplicates_removed = before - records.len();

        if !self.lookups.is_empty() {
            apply_enrichments(&mut records, &self.lookups).await;
        }

        let (failure, failures) = match (outcome.failure, outcome.navigation_failure) {
            (Some(err), _) => (Some(err.to_string()), err.failures().to_vec()),
            (None, Some(nav)) => (None, vec![nav]),
            (None, None) => (None, Vec::new()),
        };
        HarvestReport {
            records,
            pages: outcome.pages,
            strategy: outcome.strategy,
            termination: outcome.termination,
            failure,
            failures,
            enrichment,
            duplicates_removed,
        }
    }
}

/// Detail pages are plain documents, so the HTTP strategies go first and the
/// browsers stay as fallbacks. Each retriever's `fetch_once` makes a single
/// attempt.
fn detail_chain(
    cfg: &FetchConfig,
    settle: std::time::Duration,
) -> Result<Vec<Arc<dyn Retriever>>, HarvestError> {
    let (http, browsers): (Vec<FetchStrategy>, Vec<FetchStrategy>) =
        cfg.strategies.iter().copied().partition(|s| !s.is_browser());
    http.into_iter()
        .chain(browsers)
        .map(|s| build_retriever(s, cfg, settle))
        .collect()
}
