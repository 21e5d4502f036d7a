//! Following "next page" controls across a listing.
//!
//! The walk is a small state machine. Opening the first page is the start
//! transition; after that each loaded page is checked against the loop
//! guards, extracted, and used to find the next control until one of the
//! [`Termination`] conditions holds. The session is closed whatever the
//! outcome.

use crate::extract::extract_snapshot;
use crate::fetch::{FetchError, FetchFailure, Fetcher, NextTarget, PageSession};
use crate::locate::{NEXT_PAGE_LOCATORS, NextLocator};
use crate::rate::RateLimitPolicy;
use crate::record::Record;
use crate::session::SessionContext;
use crate::snapshot::PageSnapshot;
use harvest_common::FetchStrategy;
use harvest_config::WalkConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Pages loaded at most, the first included. Values below 1 act as 1.
    pub max_pages: usize,
    /// Stop when a later page repeats more than this share of page one.
    pub near_duplicate_threshold: f64,
    pub class_hint: Option<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self::from(&WalkConfig::default())
    }
}

impl From<&WalkConfig> for WalkOptions {
    fn from(cfg: &WalkConfig) -> Self {
        Self {
            max_pages: cfg.max_pages,
            near_duplicate_threshold: cfg.near_duplicate_threshold,
            class_hint: None,
        }
    }
}

/// Why a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    NoNextControl,
    /// The next page's URL was already visited.
    RevisitedUrl,
    /// The next page rendered exactly the visible text of a visited page.
    DuplicateContent,
    /// The next page mostly repeated the first page's records.
    NearDuplicate,
    PageLimit,
    Stopped,
    /// Locating or following the next control failed after page one.
    NavigationFailed,
    /// No strategy could load the first page.
    FetchFailed,
}

#[derive(Debug)]
pub struct WalkOutcome {
    pub records: Vec<Record>,
    pub pages: usize,
    pub strategy: Option<FetchStrategy>,
    pub termination: Termination,
    /// Set when the first page could not be loaded.
    pub failure: Option<FetchError>,
    /// Set when the walk ended on [`Termination::NavigationFailed`].
    pub navigation_failure: Option<FetchFailure>,
}

impl WalkOutcome {
    fn failed(err: FetchError) -> Self {
        Self {
            records: Vec::new(),
            pages: 0,
            strategy: None,
            termination: Termination::FetchFailed,
            failure: Some(err),
            navigation_failure: None,
        }
    }
}

/// URLs and content fingerprints seen during one walk.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: HashSet<String>,
    fingerprints: HashSet<String>,
}

impl VisitedSet {
    fn key(url: &Url) -> String {
        let mut u = url.clone();
        u.set_fragment(None);
        u.into()
    }

    pub fn contains_url(&self, url: &Url) -> bool {
        self.urls.contains(&Self::key(url))
    }

    pub fn contains_fingerprint(&self, fp: &str) -> bool {
        self.fingerprints.contains(fp)
    }

    pub fn insert_url(&mut self, url: &Url) {
        self.urls.insert(Self::key(url));
    }

    pub fn insert_page(&mut self, page: &PageSnapshot) {
        self.insert_url(page.url());
        self.fingerprints.insert(page.fingerprint().to_string());
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

enum WalkState {
    PageLoaded,
    Extracted,
    Advancing(NextTarget),
    Done(Termination),
}

/// Records and guard state accumulated across pages.
struct Progress<'o> {
    opts: &'o WalkOptions,
    visited: VisitedSet,
    records: Vec<Record>,
    first_page: Option<Vec<Record>>,
    pages: usize,
    navigation_failure: Option<FetchFailure>,
}

impl<'o> Progress<'o> {
    fn new(opts: &'o WalkOptions, requested: &Url) -> Self {
        let mut visited = VisitedSet::default();
        // The requested URL may redirect; a link back to it is still a revisit.
        visited.insert_url(requested);
        Self {
            opts,
            visited,
            records: Vec::new(),
            first_page: None,
            pages: 0,
            navigation_failure: None,
        }
    }

    /// Apply the loop guards to a freshly loaded page, then accept it.
    fn on_page(&mut self, page: &PageSnapshot) -> WalkState {
        if self.pages > 0 {
            if self.visited.contains_url(page.url()) {
                return WalkState::Done(Termination::RevisitedUrl);
            }
            if self.visited.contains_fingerprint(page.fingerprint()) {
                return WalkState::Done(Termination::DuplicateContent);
            }
        }
        let found = extract_snapshot(page, self.opts.class_hint.as_deref());
        if self.repeats_first_page(&found) {
            return WalkState::Done(Termination::NearDuplicate);
        }

        self.pages += 1;
        tracing::info!(
            target: "harvest.walk",
            page = self.pages,
            url = %page.url(),
            records = found.len(),
            strategy = %page.strategy(),
            "walk.page.loaded"
        );
        self.visited.insert_page(page);
        if self.first_page.is_none() {
            self.first_page = Some(found.clone());
        }
        self.records.extend(found);
        WalkState::Extracted
    }

    fn repeats_first_page(&self, page: &[Record]) -> bool {
        let Some(first) = self.first_page.as_deref() else {
            return false;
        };
        if first.is_empty() {
            return false;
        }
        let overlap = page
            .iter()
            .filter(|r| first.iter().any(|f| f.same_fields(r)))
            .count();
        overlap as f64 / first.len() as f64 > self.opts.near_duplicate_threshold
    }
}

/// Drives the pagination walk over one listing.
pub struct Walker {
    fetcher: Fetcher,
    session: SessionContext,
    rate: Arc<RateLimitPolicy>,
    locators: &'static [NextLocator],
}

impl Walker {
    pub fn new(fetcher: Fetcher, session: SessionContext, rate: Arc<RateLimitPolicy>) -> Self {
        Self {
            fetcher,
            session,
            rate,
            locators: NEXT_PAGE_LOCATORS,
        }
    }

    pub fn with_locators(mut self, locators: &'static [NextLocator]) -> Self {
        self.locators = locators;
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub async fn walk(&self, url: &str, opts: &WalkOptions, stop: &CancellationToken) -> WalkOutcome {
        let start = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                return WalkOutcome::failed(FetchError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        self.rate.wait_turn().await;
        let mut page = match self.fetcher.fetch(&start, &self.session).await {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(target: "harvest.walk", %url, error = %err, "walk.start.failed");
                return WalkOutcome::failed(err);
            }
        };
        let strategy = page.strategy();

        let mut progress = Progress::new(opts, &start);
        let termination = self.drive(page.as_mut(), &mut progress, stop).await;
        page.close().await;

        tracing::info!(
            target: "harvest.walk",
            ?termination,
            pages = progress.pages,
            records = progress.records.len(),
            "walk.terminated"
        );
        WalkOutcome {
            records: progress.records,
            pages: progress.pages,
            strategy: Some(strategy),
            termination,
            failure: None,
            navigation_failure: progress.navigation_failure,
        }
    }

    async fn drive(
        &self,
        page: &mut dyn PageSession,
        progress: &mut Progress<'_>,
        stop: &CancellationToken,
    ) -> Termination {
        let max_pages = progress.opts.max_pages.max(1);
        let mut state = WalkState::PageLoaded;
        loop {
            state = match state {
                WalkState::PageLoaded => progress.on_page(page.current()),
                WalkState::Extracted => {
                    if stop.is_cancelled() {
                        WalkState::Done(Termination::Stopped)
                    } else if progress.pages >= max_pages {
                        WalkState::Done(Termination::PageLimit)
                    } else {
                        match page.next_target(self.locators).await {
                            Ok(None) => WalkState::Done(Termination::NoNextControl),
                            Ok(Some(target))
                                if target
                                    .url
                                    .as_ref()
                                    .is_some_and(|u| progress.visited.contains_url(u)) =>
                            {
                                WalkState::Done(Termination::RevisitedUrl)
                            }
                            Ok(Some(target)) => WalkState::Advancing(target),
                            Err(failure) => {
                                progress.navigation_failure = Some(failure);
                                WalkState::Done(Termination::NavigationFailed)
                            }
                        }
                    }
                }
                WalkState::Advancing(target) => {
                    tracing::debug!(
                        target: "harvest.walk",
                        locator = %target.locator,
                        next = ?target.url.as_ref().map(Url::as_str),
                        "walk.advance"
                    );
                    self.rate.wait_turn().await;
                    match page.follow(&target).await {
                        Ok(()) => WalkState::PageLoaded,
                        Err(failure) => {
                            tracing::warn!(target: "harvest.walk", error = %failure, "walk.navigation.failed");
                            progress.navigation_failure = Some(failure);
                            WalkState::Done(Termination::NavigationFailed)
                        }
                    }
                }
                WalkState::Done(termination) => return termination,
            };
        }
    }
}
