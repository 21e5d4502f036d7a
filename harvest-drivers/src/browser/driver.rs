use crate::browser::{pacing::Pacing, page::BrowserPage};
use anyhow::{Context, Result};
use fantoccini::cookies::Cookie;
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use webdriver::capabilities::Capabilities;

/// Rendering engine behind the WebDriver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Chromium via chromedriver.
    Chrome,
    /// Gecko via geckodriver.
    Firefox,
}

/// Everything needed to open a browser session.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub engine: Engine,
    /// WebDriver endpoint, e.g. `http://localhost:9515` for chromedriver.
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: Option<String>,
    pub page_load_timeout: Duration,
    pub settle: Duration,
}

impl DriverOptions {
    pub fn chrome(webdriver_url: impl Into<String>) -> Self {
        Self {
            engine: Engine::Chrome,
            webdriver_url: webdriver_url.into(),
            headless: true,
            user_agent: None,
            page_load_timeout: Duration::from_secs(30),
            settle: Duration::from_millis(3000),
        }
    }

    pub fn firefox(webdriver_url: impl Into<String>) -> Self {
        Self {
            engine: Engine::Firefox,
            ..Self::chrome(webdriver_url)
        }
    }
}

/// Build the W3C capabilities for the requested engine.
pub fn build_capabilities(opts: &DriverOptions) -> Capabilities {
    let mut caps = Capabilities::new();
    match opts.engine {
        Engine::Chrome => {
            let mut args = vec![
                json!("--disable-dev-shm-usage"),
                json!("--no-sandbox"),
                json!("--disable-extensions"),
                json!("--window-size=1920,1080"),
            ];
            if let Some(ua) = &opts.user_agent {
                args.push(json!(format!("--user-agent={ua}")));
            }
            if opts.headless {
                args.push(json!("--headless"));
                args.push(json!("--disable-gpu"));
            }
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
        Engine::Firefox => {
            let mut ff = serde_json::Map::new();
            if opts.headless {
                ff.insert("args".into(), json!(["-headless"]));
            }
            if let Some(ua) = &opts.user_agent {
                ff.insert(
                    "prefs".into(),
                    json!({ "general.useragent.override": ua }),
                );
            }
            caps.insert("moz:firefoxOptions".to_string(), Value::Object(ff));
        }
    }
    caps
}

/// Thin wrapper around a `fantoccini` WebDriver client.
///
/// The session stays open until [`BrowserDriver::close`] is awaited; callers
/// own that responsibility on every exit path.
pub struct BrowserDriver {
    pub client: Client,
    pub engine: Engine,
    pub pacing: Pacing,
}

impl BrowserDriver {
    /// Connect to a running WebDriver service and start a session.
    pub async fn connect(opts: &DriverOptions) -> Result<Self> {
        let client = ClientBuilder::native()
            .capabilities(build_capabilities(opts))
            .connect(&opts.webdriver_url)
            .await
            .with_context(|| format!("webdriver session at {}", opts.webdriver_url))?;

        let timeouts = TimeoutConfiguration::new(
            Some(opts.page_load_timeout),
            Some(opts.page_load_timeout),
            Some(Duration::ZERO),
        );
        if let Err(err) = client.update_timeouts(timeouts).await {
            // The session exists at this point; release it before bailing.
            let _ = client.clone().close().await;
            return Err(anyhow::Error::from(err).context("setting webdriver timeouts"));
        }

        Ok(Self {
            client,
            engine: opts.engine,
            pacing: Pacing::new(opts.settle),
        })
    }

    /// Navigate to `url` and return a [`BrowserPage`] once `body` exists.
    pub async fn goto(&self, url: &str) -> Result<BrowserPage> {
        let page = BrowserPage::new(self.client.clone(), self.pacing.clone());
        page.goto(url).await?;
        Ok(page)
    }

    /// Inject session cookies for the origin of `url`, then reload it.
    ///
    /// WebDriver only accepts cookies for the document currently loaded, so
    /// the origin has to be visited first.
    pub async fn goto_with_cookies(
        &self,
        url: &str,
        cookies: &[(String, String)],
    ) -> Result<BrowserPage> {
        let page = self.goto(url).await?;
        if cookies.is_empty() {
            return Ok(page);
        }
        for (name, value) in cookies {
            let mut cookie = Cookie::new(name.clone(), value.clone());
            cookie.set_path("/");
            self.client
                .add_cookie(cookie)
                .await
                .with_context(|| format!("adding cookie {name}"))?;
        }
        tracing::debug!(
            target: "browser.session",
            count = cookies.len(),
            "session cookies injected"
        );
        page.goto(url).await?;
        Ok(page)
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}
