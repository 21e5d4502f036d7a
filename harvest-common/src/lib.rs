//! Common types and utilities shared across Harvest crates.
//!
//! This crate defines the retrieval strategy vocabulary, observability
//! helpers, and shared error types used throughout the Harvest workspace. It
//! is intentionally lightweight so that every crate can depend on it without
//! introducing heavy transitive costs.
//!
//! # Overview
//!
//! - [`FetchStrategy`]: the retrieval techniques, in their default priority
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`HarvestError`]: shared error handling
//!
//! # Examples
//!
//! ```rust
//! use harvest_common::FetchStrategy;
//!
//! let order = FetchStrategy::default_order();
//! assert_eq!(order[0], FetchStrategy::HeadlessBrowser);
//! assert_eq!(order[1].to_string(), "plain-http");
//! ```
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod observability;

/// One technique for retrieving the rendered content of a page.
///
/// The declaration order is the default priority order of the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Chrome driven over WebDriver, JavaScript rendered.
    HeadlessBrowser,
    /// A single blocking GET.
    PlainHttp,
    /// Firefox driven over WebDriver, the alternate rendering engine.
    BrowserEngine,
    /// Non-blocking GET with retry/backoff.
    AsyncHttp,
}

impl FetchStrategy {
    /// All strategies in their default priority order.
    pub fn default_order() -> Vec<FetchStrategy> {
        vec![
            FetchStrategy::HeadlessBrowser,
            FetchStrategy::PlainHttp,
            FetchStrategy::BrowserEngine,
            FetchStrategy::AsyncHttp,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::HeadlessBrowser => "headless-browser",
            FetchStrategy::PlainHttp => "plain-http",
            FetchStrategy::BrowserEngine => "browser-engine",
            FetchStrategy::AsyncHttp => "async-http",
        }
    }

    /// Whether the strategy drives a real browser through WebDriver.
    pub fn is_browser(&self) -> bool {
        matches!(
            self,
            FetchStrategy::HeadlessBrowser | FetchStrategy::BrowserEngine
        )
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchStrategy {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless-browser" | "headless" | "chrome" => Ok(FetchStrategy::HeadlessBrowser),
            "plain-http" | "http" | "blocking" => Ok(FetchStrategy::PlainHttp),
            "browser-engine" | "firefox" | "gecko" => Ok(FetchStrategy::BrowserEngine),
            "async-http" | "async" => Ok(FetchStrategy::AsyncHttp),
            other => Err(HarvestError::Config(format!(
                "unknown fetch strategy: {other}"
            ))),
        }
    }
}

/// Error types used across the Harvest system.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_aliases() {
        assert_eq!(
            "chrome".parse::<FetchStrategy>().unwrap(),
            FetchStrategy::HeadlessBrowser
        );
        assert_eq!(
            " Async-HTTP ".parse::<FetchStrategy>().unwrap(),
            FetchStrategy::AsyncHttp
        );
        assert!("carrier-pigeon".parse::<FetchStrategy>().is_err());
    }

    #[test]
    fn serializes_as_kebab_case() {
        let json = serde_json::to_string(&FetchStrategy::BrowserEngine).unwrap();
        assert_eq!(json, "\"browser-engine\"");
        let back: FetchStrategy = serde_json::from_str("\"plain-http\"").unwrap();
        assert_eq!(back, FetchStrategy::PlainHttp);
    }

    #[test]
    fn display_matches_as_str() {
        for s in FetchStrategy::default_order() {
            assert_eq!(s.to_string(), s.as_str());
            assert_eq!(s.as_str().parse::<FetchStrategy>().unwrap(), s);
        }
    }
}
