//! Driver layer for browser automation.
//!
//! This crate exposes the WebDriver-backed browser sessions used by the
//! rendering fetch strategies.
//!
//! - [`browser::driver::BrowserDriver`]: WebDriver client wrapper (Chrome or Firefox)
//! - [`browser::page::BrowserPage`]: DOM helpers, readiness waits and clicks
//! - [`browser::pacing::Pacing`]: jittered settle delays between actions
pub mod browser;
