//! The two HTTP strategies: a single blocking GET on the blocking pool, and
//! the async client with retries.
//!
//! Neither renders JavaScript. Pagination follows the next control's href.

use super::{FailureKind, FetchFailure, NextTarget, PageSession, Retriever};
use crate::locate::{NextLocator, find_next_link};
use crate::session::SessionContext;
use crate::snapshot::PageSnapshot;
use async_trait::async_trait;
use harvest_common::FetchStrategy;
use harvest_http::blocking::BlockingHttpClient;
use harvest_http::{HttpClient, HttpError, RequestOpts, TextResponse, document_headers};
use std::time::Duration;
use url::Url;

#[derive(Clone)]
enum Backend {
    /// Built per request inside the blocking pool; a blocking client must not
    /// be created or dropped on an async worker.
    Blocking,
    Async(HttpClient),
}

#[derive(Clone)]
pub struct HttpRetriever {
    backend: Backend,
    user_agent: String,
    retries: usize,
}

impl HttpRetriever {
    /// [`FetchStrategy::PlainHttp`]: one synchronous GET, no retries.
    pub fn plain(user_agent: &str) -> Self {
        Self {
            backend: Backend::Blocking,
            user_agent: user_agent.to_string(),
            retries: 0,
        }
    }

    /// [`FetchStrategy::AsyncHttp`]: non-blocking GET retrying 429/5xx and
    /// network errors up to `retries` times.
    pub fn asynchronous(user_agent: &str, retries: usize) -> Result<Self, HttpError> {
        Ok(Self {
            backend: Backend::Async(HttpClient::new()?.with_retries(retries)),
            user_agent: user_agent.to_string(),
            retries,
        })
    }

    fn kind(&self) -> FetchStrategy {
        match self.backend {
            Backend::Blocking => FetchStrategy::PlainHttp,
            Backend::Async(_) => FetchStrategy::AsyncHttp,
        }
    }

    async fn get(
        &self,
        url: &Url,
        session: &SessionContext,
        timeout: Duration,
        retries: usize,
    ) -> Result<PageSnapshot, FetchFailure> {
        let strategy = self.kind();
        let opts = RequestOpts {
            timeout: Some(timeout),
            retries: Some(retries),
            headers: Some(session.apply_to(document_headers(&self.user_agent))),
            query: None,
        };
        let request = async {
            match &self.backend {
                Backend::Blocking => {
                    let target = url.to_string();
                    tokio::task::spawn_blocking(move || {
                        BlockingHttpClient::new()?
                            .with_timeout(timeout)
                            .get_text(&target, &opts)
                    })
                    .await
                    .map_err(|e| FetchFailure::new(strategy, FailureKind::Network, e.to_string()))
                }
                Backend::Async(client) => Ok(client.get_text(url.as_str(), opts).await),
            }
        };
        // Retries and backoff share the one budget.
        let resp = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| FetchFailure::timeout(strategy, timeout))??;
        let resp = resp.map_err(|e| failure_from_http(strategy, e))?;
        snapshot_from(strategy, resp)
    }
}

fn failure_from_http(strategy: FetchStrategy, err: HttpError) -> FetchFailure {
    let kind = match &err {
        HttpError::Timeout(_) => FailureKind::Timeout,
        HttpError::Api { status, .. } => FailureKind::Status(status.as_u16()),
        HttpError::Url(_) | HttpError::Build(_) | HttpError::Network(_) => FailureKind::Network,
    };
    FetchFailure::new(strategy, kind, err.to_string())
}

fn snapshot_from(strategy: FetchStrategy, resp: TextResponse) -> Result<PageSnapshot, FetchFailure> {
    if resp.body.trim().is_empty() {
        return Err(FetchFailure::empty(strategy, &resp.url));
    }
    let snapshot = PageSnapshot::new(resp.url, resp.body, strategy);
    if !snapshot.has_content() {
        return Err(FetchFailure::empty(strategy, snapshot.url()));
    }
    Ok(snapshot)
}

#[async_trait]
impl Retriever for HttpRetriever {
    fn strategy(&self) -> FetchStrategy {
        self.kind()
    }

    async fn open(
        &self,
        url: &Url,
        session: &SessionContext,
        timeout: Duration,
    ) -> Result<Box<dyn PageSession>, FetchFailure> {
        let current = self.get(url, session, timeout, self.retries).await?;
        Ok(Box::new(HttpSession {
            retriever: self.clone(),
            session: session.clone(),
            timeout,
            current,
        }))
    }

    /// Detail pages get exactly one attempt.
    async fn fetch_once(
        &self,
        url: &Url,
        session: &SessionContext,
        timeout: Duration,
    ) -> Result<PageSnapshot, FetchFailure> {
        self.get(url, session, timeout, 0).await
    }
}

pub struct HttpSession {
    retriever: HttpRetriever,
    session: SessionContext,
    timeout: Duration,
    current: PageSnapshot,
}

#[async_trait]
impl PageSession for HttpSession {
    fn current(&self) -> &PageSnapshot {
        &self.current
    }

    async fn next_target(
        &mut self,
        locators: &[NextLocator],
    ) -> Result<Option<NextTarget>, FetchFailure> {
        let doc = self.current.document();
        let base = self.current.base_url(&doc);
        Ok(find_next_link(&doc, &base, locators).map(|found| NextTarget {
            url: Some(found.url),
            locator: found.locator,
        }))
    }

    async fn follow(&mut self, target: &NextTarget) -> Result<(), FetchFailure> {
        let strategy = self.retriever.kind();
        let Some(url) = &target.url else {
            return Err(FetchFailure::new(
                strategy,
                FailureKind::Network,
                format!("{} matched a control without a link", target.locator),
            ));
        };
        self.current = self
            .retriever
            .get(url, &self.session, self.timeout, self.retriever.retries)
            .await?;
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn http_errors_map_to_failure_kinds() {
        let s = FetchStrategy::AsyncHttp;
        assert_eq!(
            failure_from_http(s, HttpError::Timeout(Duration::from_secs(1))).kind,
            FailureKind::Timeout
        );
        assert_eq!(
            failure_from_http(
                s,
                HttpError::Api {
                    status: StatusCode::FORBIDDEN,
                    message: String::new()
                }
            )
            .kind,
            FailureKind::Status(403)
        );
        assert_eq!(
            failure_from_http(s, HttpError::Network("reset".into())).kind,
            FailureKind::Network
        );
    }

    #[test]
    fn blank_bodies_are_failures() {
        let resp = |body: &str| TextResponse {
            url: Url::parse("https://a.com/").unwrap(),
            status: StatusCode::OK,
            content_type: Some("text/html".into()),
            body: body.into(),
        };
        let s = FetchStrategy::PlainHttp;
        assert_eq!(snapshot_from(s, resp("  \n")).unwrap_err().kind, FailureKind::EmptyBody);
        assert_eq!(
            snapshot_from(s, resp("<html><body><script>app()</script></body></html>"))
                .unwrap_err()
                .kind,
            FailureKind::EmptyBody
        );
        assert!(snapshot_from(s, resp("<p>hello</p>")).is_ok());
    }

    #[tokio::test]
    async fn follow_without_url_is_a_navigation_failure() {
        let mut session = HttpSession {
            retriever: HttpRetriever::plain("ua"),
            session: SessionContext::new(),
            timeout: Duration::from_secs(1),
            current: PageSnapshot::new(
                Url::parse("https://a.com/").unwrap(),
                "<p>x</p>".into(),
                FetchStrategy::PlainHttp,
            ),
        };
        let target = NextTarget {
            url: None,
            locator: NextLocator::Label("button"),
        };
        let err = session.follow(&target).await.unwrap_err();
        assert!(err.message.contains("label:button"));
    }
}
