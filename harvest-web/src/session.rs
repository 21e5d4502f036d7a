use harvest_config::SessionConfig;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use std::fmt;

/// Credentials for sites that gate content behind a login.
///
/// Attached to every retrieval: as `Cookie` and extra headers on HTTP
/// requests, as WebDriver cookies in browser sessions. Values never appear
/// in `Debug` output or logs.
#[derive(Clone, Default)]
pub struct SessionContext {
    cookies: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            cookies: cfg.cookies.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            headers: cfg.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.headers.is_empty()
    }

    /// `name=value; name2=value2`, or `None` without cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Merge the session's cookie and headers into `base`. Entries that are
    /// not valid header names or values are skipped.
    pub fn apply_to(&self, mut base: HeaderMap) -> HeaderMap {
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    base.insert(n, v);
                }
                _ => tracing::warn!(target: "harvest.session", header = %name, "skipping invalid session header"),
            }
        }
        if let Some(cookie) = self.cookie_header() {
            match HeaderValue::from_str(&cookie) {
                Ok(v) => {
                    base.insert(COOKIE, v);
                }
                Err(_) => tracing::warn!(target: "harvest.session", "skipping invalid session cookie"),
            }
        }
        base
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("cookies", &self.cookies.len())
            .field("headers", &self.headers.len())
            .finish()
    }
}
