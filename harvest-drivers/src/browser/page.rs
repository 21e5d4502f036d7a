use crate::browser::pacing::Pacing;
use anyhow::{anyhow, Result};
use fantoccini::{elements::Element, Client, Locator};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// High-level page wrapper providing element queries, readiness waits and
/// clicks.
pub struct BrowserPage {
    pub(crate) client: Client,
    pub(crate) pacing: Pacing,
}

impl BrowserPage {
    /// Construct a page wrapper around an existing WebDriver client.
    pub fn new(client: Client, pacing: Pacing) -> Self {
        Self { client, pacing }
    }

    /// Navigate to `url` and wait for the document to finish loading.
    pub async fn goto(&self, url: &str) -> Result<()> {
        self.client.goto(url).await.map_err(anyhow::Error::from)?;
        self.wait_until_loaded(Duration::from_secs(10)).await
    }

    /// Wait for `body` to exist and `document.readyState` to reach
    /// `complete`, giving up quietly on the latter after `limit`.
    pub async fn wait_until_loaded(&self, limit: Duration) -> Result<()> {
        self.client
            .wait()
            .at_most(limit)
            .for_element(Locator::Css("body"))
            .await?;

        let deadline = Instant::now() + limit;
        loop {
            let state = self
                .client
                .execute("return document.readyState;", vec![])
                .await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                debug!(target: "browser.page", ?state, "readyState never reached complete");
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    /// Pause for the configured settle time so client-side rendering
    /// catches up.
    pub async fn settle(&self) {
        self.pacing.settle().await;
    }

    /// Return the full page HTML source.
    pub async fn get_content(&self) -> Result<String> {
        self.client.source().await.map_err(anyhow::Error::msg)
    }

    /// Return the current page URL.
    pub async fn get_url(&self) -> Result<String> {
        self.client
            .current_url()
            .await
            .map(|url| url.to_string())
            .map_err(anyhow::Error::msg)
    }

    /// Find zero or more elements by CSS selector.
    pub async fn find_elements(&self, selector: &str) -> Result<Vec<BrowserElement>> {
        let elements = self.client.find_all(Locator::Css(selector)).await?;
        Ok(elements.into_iter().map(BrowserElement::new).collect())
    }

    /// Find zero or more elements by XPath expression.
    pub async fn find_elements_xpath(&self, xpath: &str) -> Result<Vec<BrowserElement>> {
        let elements = self.client.find_all(Locator::XPath(xpath)).await?;
        Ok(elements.into_iter().map(BrowserElement::new).collect())
    }

    /// Click `element`, falling back to a script click when the native click
    /// is intercepted by an overlay.
    pub async fn click(&self, element: &BrowserElement) -> Result<()> {
        match element.element.clone().click().await {
            Ok(_) => Ok(()),
            Err(native) => {
                debug!(target: "browser.page", error = %native, "native click failed; using script click");
                let arg = serde_json::to_value(&element.element)?;
                self.client
                    .execute("arguments[0].click();", vec![arg])
                    .await
                    .map(|_| ())
                    .map_err(|e| anyhow!("script click failed after native click error ({native}): {e}"))
            }
        }
    }
}

// =========================
// BrowserElement Definition
// =========================

#[derive(Clone)]
/// Wrapper for DOM elements that provides typed helpers consistent with [`BrowserPage`].
pub struct BrowserElement {
    pub element: Element,
}

impl BrowserElement {
    pub fn new(element: Element) -> Self {
        Self { element }
    }

    /// Whether the element is rendered and can receive input.
    pub async fn is_actionable(&self) -> bool {
        let displayed = self.element.is_displayed().await.unwrap_or(false);
        displayed && self.element.is_enabled().await.unwrap_or(false)
    }

    /// Read an attribute value.
    pub async fn get_attribute(&self, attribute: &str) -> Result<Option<String>> {
        self.element
            .attr(attribute)
            .await
            .map_err(anyhow::Error::from)
    }

    /// Return the element's visible text.
    pub async fn get_inner_text(&self) -> Result<String> {
        self.element.text().await.map_err(anyhow::Error::from)
    }
}
