//! Minimal HTTP client for page retrieval with safe logging and retries.
//!
//! - Request options: headers, query params, timeout, retries
//! - Redacts cookies and sensitive query params; never logs secret values
//! - Retries 429/5xx and network errors with exponential backoff and
//!   `Retry-After` support
//! - Optional *raw* request/response logging via `HARVEST_HTTP_RAW=1`
//! - [`blocking`]: a single-shot synchronous GET for callers that must not
//!   suspend
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), harvest_http::HttpError> {
//! let client = harvest_http::HttpClient::new()?;
//! let page = client
//!     .get_text("https://example.com/list", harvest_http::RequestOpts::default())
//!     .await?;
//! println!("{} bytes from {}", page.body.len(), page.url);
//! # Ok(()) }
//! ```
//!
//! Observability: structured `tracing` events are emitted for request start,
//! response headers, retries, final errors, and (optionally) raw request and
//! response lines (target `http.raw`) when `HARVEST_HTTP_RAW=1`.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

pub mod blocking;

// ==============================
// Raw logging toggles
// ==============================

const RAW_ENV: &str = "HARVEST_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024; // cap raw body logs (64 KiB)

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

const SECRET_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "x-csrf-token"];

const SECRET_QUERY_KEYS: &[&str] = &[
    "access_token",
    "authorization",
    "auth",
    "key",
    "api_key",
    "token",
    "secret",
    "client_secret",
    "session",
    "sid",
];

fn is_secret_header(name: &str) -> bool {
    SECRET_HEADERS
        .iter()
        .any(|s| name.eq_ignore_ascii_case(s))
}

/// Redact sensitive headers for logging.
pub(crate) fn redact_headers(h: &HeaderMap) -> Vec<(String, String)> {
    h.iter()
        .map(|(k, v)| {
            let key = k.as_str().to_string();
            let val = if is_secret_header(&key) {
                "<redacted>".to_string()
            } else {
                v.to_str().unwrap_or("").to_string()
            };
            (key, val)
        })
        .collect()
}

/// Return "host + path" and the query pairs with secret values masked.
pub(crate) fn redact_query(url: &Url) -> (String, Vec<(String, String)>) {
    let host_path = format!("{}{}", url.host_str().unwrap_or("-"), url.path());
    let redacted = url
        .query_pairs()
        .map(|(k, v)| {
            let secret = SECRET_QUERY_KEYS
                .iter()
                .any(|s| k.eq_ignore_ascii_case(s));
            (
                k.to_string(),
                if secret { "<redacted>".into() } else { v.to_string() },
            )
        })
        .collect::<Vec<_>>();
    (host_path, redacted)
}

/// Render a best-effort curl command for repro/debug, with secrets redacted.
fn make_curl(url: &Url, headers: &HeaderMap) -> String {
    let mut parts = vec!["curl".to_string(), "-XGET".to_string()];
    for (name, val) in redact_headers(headers) {
        parts.push(format!("-H '{}: {}'", name, val.replace('\'', r"'\''")));
    }
    let (host_path, query) = redact_query(url);
    let query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        parts.push(format!("'{}://{}'", url.scheme(), host_path));
    } else {
        parts.push(format!("'{}://{}?{}'", url.scheme(), host_path, query));
    }
    parts.join(" ")
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned error {status}: {message}")]
    Api { status: StatusCode, message: String },
}

impl HttpError {
    fn from_send(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            HttpError::Timeout(timeout)
        } else if err.is_builder() {
            HttpError::Build(err.to_string())
        } else {
            HttpError::Network(err.to_string())
        }
    }
}

// ==============================
// Request options / response
// ==============================

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use harvest_http::RequestOpts;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(10)),
///     retries: Some(0),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 10);
/// assert!(opts.headers.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub headers: Option<HeaderMap>,
    pub query: Option<Vec<(String, String)>>,
}

/// A successful text response. `url` is the final URL after redirects.
#[derive(Clone, Debug)]
pub struct TextResponse {
    pub url: Url,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

/// Headers browsers send for a top-level document request.
pub fn document_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    headers
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client that follows up to 8 redirects.
    ///
    /// ```no_run
    /// use harvest_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new()?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new() -> Result<Self, HttpError> {
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::limited(8))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    /// Override the default timeout returned by [`HttpClient::new`].
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// Override the default retry budget returned by [`HttpClient::new`].
    ///
    /// ```no_run
    /// use harvest_http::{HttpClient, HttpError};
    ///
    /// let client = HttpClient::new()?.with_retries(5);
    /// assert_eq!(client.max_retries, 5);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// GET `url` and return its body as text.
    ///
    /// Non-2xx statuses surface as [`HttpError::Api`] once retries (429/5xx
    /// only) are used up.
    pub async fn get_text(&self, url: &str, opts: RequestOpts) -> Result<TextResponse, HttpError> {
        let url = Url::parse(url).map_err(|e| HttpError::Url(e.to_string()))?;

        let mut attempt = 0usize;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        loop {
            // ----- Build request -----
            let mut rb = self.inner.get(url.clone()).timeout(timeout);
            if let Some(q) = &opts.query {
                rb = rb.query(q);
            }
            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }

            let (host_path, query) = redact_query(&url);
            let attempt0 = attempt + 1;
            tracing::debug!(
                attempt = attempt0,
                max_retries,
                host_path = %host_path,
                query = ?query,
                timeout_ms = timeout.as_millis() as u64,
                "http.request.start"
            );

            if raw_enabled() {
                let curl = make_curl(&url, opts.headers.as_ref().unwrap_or(&HeaderMap::new()));
                tracing::debug!(target: "http.raw", %curl, "request");
            }

            // ----- Send -----
            let t0 = std::time::Instant::now();
            let resp = match rb.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    let error = HttpError::from_send(err, timeout);
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            attempt,
                            max_retries,
                            backoff_ms = delay.as_millis() as u64,
                            error = %error,
                            "http.retrying.network_send"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(attempt, max_retries, error = %error, "http.network_error.send");
                    return Err(error);
                }
            };
            let status = resp.status();
            let final_url = resp.url().clone();
            let headers = resp.headers().clone();
            let body = match resp.text().await {
                Ok(body) => body,
                Err(err) => {
                    let error = HttpError::from_send(err, timeout);
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            attempt,
                            max_retries,
                            backoff_ms = delay.as_millis() as u64,
                            error = %error,
                            "http.retrying.network_body"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(attempt, max_retries, error = %error, "http.network_error.body");
                    return Err(error);
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;

            tracing::debug!(
                %status,
                duration_ms = dur_ms,
                body_len = body.len(),
                final_url = %final_url,
                "http.response.headers"
            );

            if raw_enabled() {
                let hdrs = redact_headers(&headers);
                let truncated = body.len() > RAW_MAX_BODY;
                let text = truncate_chars(&body, RAW_MAX_BODY);
                tracing::info!(
                    target: "http.raw",
                    status = %status,
                    duration_ms = dur_ms,
                    headers = ?hdrs,
                    body = %text,
                    truncated
                );
            }

            // ----- Success path -----
            if status.is_success() {
                let content_type = headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                return Ok(TextResponse {
                    url: final_url,
                    status,
                    content_type,
                    body,
                });
            }

            // ----- Non-success: maybe retry -----
            let snippet = snip_body(&body);
            let is_429 = status == StatusCode::TOO_MANY_REQUESTS;
            let is_5xx = status.is_server_error();

            if (is_429 || is_5xx) && attempt < max_retries {
                attempt += 1;
                let delay = if let Some(secs) = retry_after_delay_secs(&headers) {
                    Duration::from_secs(secs)
                } else if is_429 {
                    // default floor for 429 when no Retry-After is present
                    backoff(attempt).max(Duration::from_millis(1100))
                } else {
                    backoff(attempt)
                };
                tracing::warn!(
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    retry_after_secs = ?retry_after_delay_secs(&headers),
                    body_snippet = %snippet,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            tracing::warn!(%status, body_snippet = %snippet, "http.error");
            return Err(HttpError::Api {
                status,
                message: snippet,
            });
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    Duration::from_millis(200u64.saturating_mul(1 << (attempt.saturating_sub(1)).min(10)))
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .trim()
        .parse()
        .ok()
}

fn truncate_chars(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub(crate) fn snip_body(body: &str) -> String {
    let mut snip = truncate_chars(body, 500).to_string();
    if snip.len() < body.len() {
        snip.push_str("...");
    }
    snip
}
