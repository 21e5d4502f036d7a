//! Listing harvest: fetch a page with the first strategy that works, pull
//! records out of it, follow pagination, then enrich and dedupe.
//!
//! - Retrieval strategies and their fallback order (`fetch`)
//! - Layout classification and the table/list/link extractors (`classify`, `extract`)
//! - Next-page location and the pagination walk (`locate`, `paginate`)
//! - Detail page enrichment and name dedupe (`enrich`, `dedupe`)
//! - The end-to-end facade and output seams (`pipeline`, `sink`)

pub mod classify;
pub mod dedupe;
mod dom;
pub mod enrich;
pub mod extract;
pub mod fetch;
pub mod locate;
pub mod paginate;
pub mod pipeline;
pub mod rate;
pub mod record;
pub mod session;
pub mod sink;
pub mod snapshot;

pub use dom::visible_text;
pub use pipeline::{HarvestReport, HarvestRequest, Harvester};
pub use record::{DetailInfo, FieldValue, Record};
pub use session::SessionContext;
