//! Shape-specific record extractors and the dispatcher that picks one.

pub mod links;
pub mod list;
pub mod table;

use crate::classify::{ContentShape, classify};
use crate::record::Record;
use crate::snapshot::PageSnapshot;
use scraper::Html;
use url::Url;

pub use links::extract_links;
pub use list::extract_lists;
pub use table::extract_tables;

/// Classify `doc` and run the matching extractor.
///
/// An empty result falls through to the next looser extractor: tables to
/// lists, lists to links.
pub fn extract_records(doc: &Html, base: &Url, class_hint: Option<&str>) -> Vec<Record> {
    let shape = classify(doc);
    let records = match shape {
        ContentShape::Tabular => {
            let rows = extract_tables(doc);
            if rows.is_empty() {
                lists_then_links(doc, base, class_hint)
            } else {
                rows
            }
        }
        ContentShape::ListLike => lists_then_links(doc, base, class_hint),
        ContentShape::LinkCollection => extract_links(doc, base),
        ContentShape::Unknown => Vec::new(),
    };
    tracing::debug!(
        target: "harvest.extract",
        ?shape,
        records = records.len(),
        "extract.done"
    );
    records
}

fn lists_then_links(doc: &Html, base: &Url, class_hint: Option<&str>) -> Vec<Record> {
    let items = extract_lists(doc, class_hint);
    if items.is_empty() {
        extract_links(doc, base)
    } else {
        items
    }
}

/// Parse `snapshot` and extract its records against its own base URL.
pub fn extract_snapshot(snapshot: &PageSnapshot, class_hint: Option<&str>) -> Vec<Record> {
    let doc = snapshot.document();
    let base = snapshot.base_url(&doc);
    extract_records(&doc, &base, class_hint)
}
