//! Single-shot synchronous GET.
//!
//! No retries: a failure here is reported straight back so the caller can
//! move on to its next retrieval strategy. Must not be called from inside an
//! async task without `spawn_blocking`.

use crate::{HttpError, RequestOpts, TextResponse, redact_query, snip_body};
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

#[derive(Clone)]
pub struct BlockingHttpClient {
    inner: reqwest::blocking::Client,
    pub default_timeout: Duration,
}

impl BlockingHttpClient {
    pub fn new() -> Result<Self, HttpError> {
        let inner = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(8))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            default_timeout: Duration::from_secs(15),
        })
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// GET `url` once. `opts.retries` is ignored.
    pub fn get_text(&self, url: &str, opts: &RequestOpts) -> Result<TextResponse, HttpError> {
        let url = Url::parse(url).map_err(|e| HttpError::Url(e.to_string()))?;
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        let mut rb = self.inner.get(url.clone()).timeout(timeout);
        if let Some(q) = &opts.query {
            rb = rb.query(q);
        }
        if let Some(h) = &opts.headers {
            rb = rb.headers(h.clone());
        }

        let (host_path, query) = redact_query(&url);
        tracing::debug!(host_path = %host_path, query = ?query, "http.blocking.start");

        let resp = rb.send().map_err(|e| HttpError::from_send(e, timeout))?;
        let status = resp.status();
        let final_url = resp.url().clone();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().map_err(|e| HttpError::from_send(e, timeout))?;

        if !status.is_success() {
            let message = snip_body(&body);
            tracing::warn!(%status, body_snippet = %message, "http.blocking.error");
            return Err(HttpError::Api { status, message });
        }

        Ok(TextResponse {
            url: final_url,
            status,
            content_type,
            body,
        })
    }
}
