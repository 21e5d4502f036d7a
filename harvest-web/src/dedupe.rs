use crate::record::{LINK, NAME, Record};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("bracket pattern compiles"));

/// Dedupe key for a display name: bracketed annotations such as
/// `[Director]` removed, whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    BRACKETED
        .replace_all(name, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drop later `{name, link}` records whose normalized name was already
/// seen. Records of any other shape pass through; order is preserved.
pub fn dedupe(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| match (r.text(NAME), r.text(LINK)) {
            (Some(name), Some(_)) => seen.insert(normalize_name(name)),
            _ => true,
        })
        .collect()
}
