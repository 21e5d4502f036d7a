//! Small helpers over `scraper` shared by the extractors.
//!
//! `scraper::Html` is not `Send`, so everything here is synchronous and
//! callers parse, query and drop the document without crossing an `.await`.

use scraper::{ElementRef, Html, Selector};

/// Elements whose text never reaches the reader.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Parse a CSS selector, logging and returning `None` on a bad expression.
pub(crate) fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(err) => {
            tracing::debug!(target: "harvest.dom", css, error = ?err, "invalid selector");
            None
        }
    }
}

/// All descendants of `scope` matching `css`, in document order.
pub(crate) fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

pub(crate) fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    scope.select(&sel).next()
}

/// Trimmed text of `el` with runs of whitespace collapsed to one space.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<String>())
}

/// Each non-empty text node under `el`, trimmed, in document order.
pub(crate) fn text_lines(el: ElementRef<'_>) -> Vec<String> {
    el.text()
        .map(collapse_ws)
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Whole-document visible text: text nodes outside script, style and head,
/// whitespace-collapsed and space-joined.
pub fn visible_text(doc: &Html) -> String {
    let mut parts = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| INVISIBLE.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let t = collapse_ws(text);
        if !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join(" ")
}

/// Detach every element matching any of `selectors` from `doc`.
///
/// Matches are collected first and removed afterwards, so nested matches are
/// harmless.
pub(crate) fn strip_regions(doc: &mut Html, selectors: &[&str]) {
    let mut doomed = Vec::new();
    for css in selectors {
        if let Some(sel) = selector(css) {
            doomed.extend(doc.select(&sel).map(|el| el.id()));
        }
    }
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// Detach elements matching `selectors` unless they sit inside one of the
/// `containers` tags. Sectioning tags like `header` are page chrome at the
/// top level but part of the entry inside an `article` card.
pub(crate) fn strip_outside(doc: &mut Html, selectors: &[&str], containers: &[&str]) {
    let mut doomed = Vec::new();
    for css in selectors {
        let Some(sel) = selector(css) else {
            continue;
        };
        for el in doc.select(&sel) {
            let nested = el.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| containers.contains(&e.name()))
            });
            if !nested {
                doomed.push(el.id());
            }
        }
    }
    for id in doomed {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

/// The page's main content region, when it marks one.
pub(crate) fn main_region(doc: &Html) -> Option<ElementRef<'_>> {
    select_first(doc.root_element(), "main")
        .or_else(|| select_first(doc.root_element(), ".main"))
}
