//! Retrieval strategies and the ordered fallback across them.
//!
//! A [`Retriever`] implements one [`FetchStrategy`] and opens a
//! [`PageSession`]: a live handle on the loaded page that the pagination
//! walker keeps using, so every page of a walk comes from the same strategy.
//! The [`Fetcher`] tries retrievers strictly in order and never races them.

pub mod browser;
pub mod http;

use crate::locate::NextLocator;
use crate::session::SessionContext;
use crate::snapshot::PageSnapshot;
use async_trait::async_trait;
use harvest_common::{FetchStrategy, HarvestError};
use harvest_config::FetchConfig;
use harvest_drivers::browser::driver::DriverOptions;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Headroom past the attempt budget for a retriever to release what it
/// opened before the fetcher gives up on it.
const RELEASE_GRACE: Duration = Duration::from_secs(2);

pub use browser::BrowserRetriever;
pub use http::HttpRetriever;

/// Why a single strategy attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "status", rename_all = "kebab-case")]
pub enum FailureKind {
    Network,
    Timeout,
    Status(u16),
    EmptyBody,
    /// The strategy could not start, e.g. no WebDriver endpoint.
    Unavailable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => f.write_str("network"),
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::Status(code) => write!(f, "status {code}"),
            FailureKind::EmptyBody => f.write_str("empty body"),
            FailureKind::Unavailable => f.write_str("unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{strategy} failed ({kind}): {message}")]
pub struct FetchFailure {
    pub strategy: FetchStrategy,
    pub kind: FailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(strategy: FetchStrategy, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            strategy,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(strategy: FetchStrategy, after: Duration) -> Self {
        Self::new(strategy, FailureKind::Timeout, format!("no page after {after:?}"))
    }

    pub fn empty(strategy: FetchStrategy, url: &Url) -> Self {
        Self::new(strategy, FailureKind::EmptyBody, format!("{url} rendered no visible content"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("all fetch strategies failed: {}", summarize(.0))]
    Exhausted(Vec<FetchFailure>),
}

fn summarize(failures: &[FetchFailure]) -> String {
    if failures.is_empty() {
        return "no strategies configured".into();
    }
    failures
        .iter()
        .map(|f| format!("{} ({})", f.strategy, f.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

impl FetchError {
    pub fn failures(&self) -> &[FetchFailure] {
        match self {
            FetchError::Exhausted(f) => f,
            FetchError::InvalidUrl { .. } => &[],
        }
    }
}

/// Where the walker should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextTarget {
    /// Destination when the control declares one. Browser buttons may not.
    pub url: Option<Url>,
    pub locator: NextLocator,
}

/// A loaded page plus whatever the strategy needs to move to the next one.
#[async_trait]
pub trait PageSession: Send {
    fn current(&self) -> &PageSnapshot;

    fn strategy(&self) -> FetchStrategy {
        self.current().strategy()
    }

    /// Locate the next-page control on the current page.
    async fn next_target(
        &mut self,
        locators: &[NextLocator],
    ) -> Result<Option<NextTarget>, FetchFailure>;

    /// Activate `target`; on success [`PageSession::current`] is the new page.
    async fn follow(&mut self, target: &NextTarget) -> Result<(), FetchFailure>;

    /// Release the session. Must be awaited on every exit path.
    async fn close(self: Box<Self>);
}

#[async_trait]
pub trait Retriever: Send + Sync {
    fn strategy(&self) -> FetchStrategy;

    /// Load `url` within `timeout`. Implementations release anything they
    /// acquired before returning an error.
    async fn open(
        &self,
        url: &Url,
        session: &SessionContext,
        timeout: Duration,
    ) -> Result<Box<dyn PageSession>, FetchFailure>;

    /// Load a single document and close the session straight away.
    async fn fetch_once(
        &self,
        url: &Url,
        session: &SessionContext,
        timeout: Duration,
    ) -> Result<PageSnapshot, FetchFailure> {
        let page = self.open(url, session, timeout).await?;
        let snapshot = page.current().clone();
        page.close().await;
        Ok(snapshot)
    }
}

/// Ordered fallback over retrievers.
#[derive(Clone)]
pub struct Fetcher {
    retrievers: Vec<Arc<dyn Retriever>>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>, timeout: Duration) -> Self {
        Self { retrievers, timeout }
    }

    /// Build the configured strategy chain.
    pub fn from_config(cfg: &FetchConfig, settle: Duration) -> Result<Self, HarvestError> {
        let retrievers = cfg
            .strategies
            .iter()
            .map(|s| build_retriever(*s, cfg, settle))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(retrievers, cfg.timeout()))
    }

    pub fn strategies(&self) -> Vec<FetchStrategy> {
        self.retrievers.iter().map(|r| r.strategy()).collect()
    }

    /// First strategy to produce a non-empty page wins; later strategies are
    /// not attempted. Each attempt is bounded by the fetcher's timeout.
    pub async fn fetch(
        &self,
        url: &Url,
        session: &SessionContext,
    ) -> Result<Box<dyn PageSession>, FetchError> {
        let mut failures = Vec::with_capacity(self.retrievers.len());
        for retriever in &self.retrievers {
            let strategy = retriever.strategy();
            tracing::info!(target: "harvest.fetch", %strategy, %url, "fetch.strategy.start");
            let attempt = tokio::time::timeout(
                self.timeout + RELEASE_GRACE,
                retriever.open(url, session, self.timeout),
            )
            .await
            .unwrap_or_else(|_| Err(FetchFailure::timeout(strategy, self.timeout)));
            match attempt {
                Ok(page) => {
                    tracing::info!(
                        target: "harvest.fetch",
                        %strategy,
                        final_url = %page.current().url(),
                        "fetch.strategy.succeeded"
                    );
                    return Ok(page);
                }
                Err(failure) => {
                    tracing::warn!(
                        target: "harvest.fetch",
                        %strategy,
                        kind = %failure.kind,
                        error = %failure.message,
                        "fetch.strategy.failed"
                    );
                    failures.push(failure);
                }
            }
        }
        Err(FetchError::Exhausted(failures))
    }
}

/// Construct the retriever for one strategy from configuration.
pub fn build_retriever(
    strategy: FetchStrategy,
    cfg: &FetchConfig,
    settle: Duration,
) -> Result<Arc<dyn Retriever>, HarvestError> {
    let browser = |mut opts: DriverOptions| {
        opts.headless = cfg.headless;
        opts.user_agent = Some(cfg.user_agent.clone());
        opts.page_load_timeout = cfg.timeout();
        opts.settle = settle;
        Arc::new(BrowserRetriever::new(strategy, opts)) as Arc<dyn Retriever>
    };
    Ok(match strategy {
        FetchStrategy::HeadlessBrowser => browser(DriverOptions::chrome(&cfg.chromedriver_url)),
        FetchStrategy::BrowserEngine => browser(DriverOptions::firefox(&cfg.geckodriver_url)),
        FetchStrategy::PlainHttp => Arc::new(HttpRetriever::plain(&cfg.user_agent)),
        FetchStrategy::AsyncHttp => Arc::new(
            HttpRetriever::asynchronous(&cfg.user_agent, cfg.retries)
                .map_err(|e| HarvestError::Config(format!("http client: {e}")))?,
        ),
    })
}
