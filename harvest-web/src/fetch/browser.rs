//! WebDriver-backed strategies: headless Chrome and Firefox.
//!
//! Every opened WebDriver session is closed on every path out of this
//! module: failed loads close before returning the failure, successful ones
//! hand the driver to a [`BrowserSession`] whose `close` releases it.

use super::{FailureKind, FetchFailure, NextTarget, PageSession, Retriever};
use crate::locate::{NextLocator, is_next_label};
use crate::session::SessionContext;
use crate::snapshot::{PageSnapshot, resolve_href};
use async_trait::async_trait;
use harvest_common::FetchStrategy;
use harvest_drivers::browser::driver::{BrowserDriver, DriverOptions};
use harvest_drivers::browser::page::{BrowserElement, BrowserPage};
use std::time::Duration;
use tokio::time::{Instant, timeout as within, timeout_at};
use url::Url;

pub struct BrowserRetriever {
    strategy: FetchStrategy,
    opts: DriverOptions,
}

impl BrowserRetriever {
    pub fn new(strategy: FetchStrategy, opts: DriverOptions) -> Self {
        Self { strategy, opts }
    }
}

#[async_trait]
impl Retriever for BrowserRetriever {
    fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    async fn open(
        &self,
        url: &Url,
        session: &SessionContext,
        timeout: Duration,
    ) -> Result<Box<dyn PageSession>, FetchFailure> {
        let strategy = self.strategy;
        // Connecting and loading share one budget.
        let deadline = Instant::now() + timeout;
        let driver = match timeout_at(deadline, BrowserDriver::connect(&self.opts)).await {
            Ok(Ok(d)) => d,
            Ok(Err(e)) => {
                return Err(FetchFailure::new(strategy, FailureKind::Unavailable, format!("{e:#}")));
            }
            Err(_) => return Err(FetchFailure::timeout(strategy, timeout)),
        };

        let loaded = timeout_at(deadline, async {
            let page = driver
                .goto_with_cookies(url.as_str(), session.cookies())
                .await?;
            page.settle().await;
            let snapshot = read_page(&page, strategy).await?;
            anyhow::Ok((page, snapshot))
        })
        .await;

        let failure = match loaded {
            Ok(Ok((page, snapshot))) if snapshot.has_content() => {
                return Ok(Box::new(BrowserSession {
                    driver,
                    page,
                    timeout,
                    current: snapshot,
                    pending: None,
                }));
            }
            Ok(Ok((_, snapshot))) => FetchFailure::empty(strategy, snapshot.url()),
            Ok(Err(e)) => FetchFailure::new(strategy, FailureKind::Network, format!("{e:#}")),
            Err(_) => FetchFailure::timeout(strategy, timeout),
        };
        release(driver, strategy).await;
        Err(failure)
    }
}

async fn read_page(page: &BrowserPage, strategy: FetchStrategy) -> anyhow::Result<PageSnapshot> {
    let html = page.get_content().await?;
    let current = Url::parse(&page.get_url().await?)?;
    Ok(PageSnapshot::new(current, html, strategy))
}

async fn release(driver: BrowserDriver, strategy: FetchStrategy) {
    if let Err(e) = driver.close().await {
        tracing::warn!(target: "harvest.fetch", %strategy, error = %e, "browser.close.failed");
    }
}

pub struct BrowserSession {
    driver: BrowserDriver,
    page: BrowserPage,
    timeout: Duration,
    current: PageSnapshot,
    /// Control located by the last `next_target`, clicked by `follow`.
    pending: Option<BrowserElement>,
}

impl BrowserSession {
    async fn candidates(&self, locator: &NextLocator) -> anyhow::Result<Vec<BrowserElement>> {
        match locator {
            NextLocator::Css(css) => self.page.find_elements(css).await,
            NextLocator::Label(tag) => {
                let mut out = Vec::new();
                for el in self
                    .page
                    .find_elements_xpath(&NextLocator::label_xpath(tag))
                    .await?
                {
                    if is_next_label(&el.get_inner_text().await.unwrap_or_default()) {
                        out.push(el);
                    }
                }
                Ok(out)
            }
        }
    }

    fn failure(&self, kind: FailureKind, message: String) -> FetchFailure {
        FetchFailure::new(self.current.strategy(), kind, message)
    }
}

#[async_trait]
impl PageSession for BrowserSession {
    fn current(&self) -> &PageSnapshot {
        &self.current
    }

    async fn next_target(
        &mut self,
        locators: &[NextLocator],
    ) -> Result<Option<NextTarget>, FetchFailure> {
        self.pending = None;
        for locator in locators {
            let found = self
                .candidates(locator)
                .await
                .map_err(|e| self.failure(FailureKind::Network, format!("{e:#}")))?;
            for el in found {
                if !el.is_actionable().await {
                    continue;
                }
                let url = el
                    .get_attribute("href")
                    .await
                    .ok()
                    .flatten()
                    .and_then(|href| resolve_href(self.current.url(), &href));
                self.pending = Some(el);
                return Ok(Some(NextTarget {
                    url,
                    locator: *locator,
                }));
            }
        }
        Ok(None)
    }

    async fn follow(&mut self, target: &NextTarget) -> Result<(), FetchFailure> {
        let Some(el) = self.pending.take() else {
            return Err(self.failure(
                FailureKind::Network,
                format!("{} was not located on this page", target.locator),
            ));
        };
        let strategy = self.current.strategy();
        let page = &self.page;
        let step = within(self.timeout, async {
            page.click(&el).await?;
            page.wait_until_loaded(self.timeout).await?;
            page.settle().await;
            read_page(page, strategy).await
        })
        .await;
        match step {
            Ok(Ok(snapshot)) => {
                self.current = snapshot;
                Ok(())
            }
            Ok(Err(e)) => Err(self.failure(FailureKind::Network, format!("{e:#}"))),
            Err(_) => Err(FetchFailure::timeout(strategy, self.timeout)),
        }
    }

    async fn close(self: Box<Self>) {
        let strategy = self.current.strategy();
        release(self.driver, strategy).await;
    }
}
