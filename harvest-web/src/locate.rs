//! Finding the "next page" control on a listing page.
//!
//! The locator list is shared by every session type. HTTP sessions evaluate
//! it against the parsed markup; browser sessions hand the same locators to
//! WebDriver and let the browser decide visibility.

use crate::dom::{element_text, select_all};
use crate::snapshot::resolve_href;
use scraper::{ElementRef, Html};
use std::fmt;
use url::Url;

/// One way of recognising a next-page control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextLocator {
    Css(&'static str),
    /// Elements with the given tag whose visible label reads "next".
    Label(&'static str),
}

impl NextLocator {
    /// XPath candidate query for [`NextLocator::Label`]; the label itself is
    /// confirmed with [`is_next_label`] afterwards.
    pub fn label_xpath(tag: &str) -> String {
        format!(
            "//{tag}[contains(translate(normalize-space(.), \
             'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), 'next')]"
        )
    }
}

impl fmt::Display for NextLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextLocator::Css(css) => write!(f, "css:{css}"),
            NextLocator::Label(tag) => write!(f, "label:{tag}"),
        }
    }
}

/// Priority order: explicit pagination attributes, link relations, link
/// text, class and id patterns, ARIA labels.
pub const NEXT_PAGE_LOCATORS: &[NextLocator] = &[
    NextLocator::Css("[data-testid='next-page-button']"),
    NextLocator::Css("[data-testid='next-page']"),
    NextLocator::Css("[data-test='next-page']"),
    NextLocator::Css("a.pagination__next"),
    NextLocator::Css("li.pagination-next a"),
    NextLocator::Css("a[rel~='next']"),
    NextLocator::Css("link[rel~='next']"),
    NextLocator::Label("a"),
    NextLocator::Label("button"),
    NextLocator::Css("a.page-next"),
    NextLocator::Css("li.next a"),
    NextLocator::Css("a[class*='next']"),
    NextLocator::Css("button[class*='next']"),
    NextLocator::Css("a[id*='next']"),
    NextLocator::Css("button[id*='next']"),
    NextLocator::Css("a[aria-label*='Next']"),
    NextLocator::Css("a[aria-label*='next']"),
    NextLocator::Css("button[aria-label*='Next']"),
    NextLocator::Css("button[aria-label*='next']"),
];

/// Whether a control's text reads as "next", e.g. `Next`, `Next »`,
/// `next page`. Longer phrases that merely start with the word do not count.
pub fn is_next_label(text: &str) -> bool {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    words.first() == Some(&"next") && words.len() <= 2
}

/// A next-page control found in static markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNext {
    pub url: Url,
    pub locator: NextLocator,
}

/// First control, in locator priority then document order, that is enabled
/// in the markup and carries a navigable href.
pub fn find_next_link(doc: &Html, base: &Url, locators: &[NextLocator]) -> Option<StaticNext> {
    let root = doc.root_element();
    for locator in locators {
        let candidates = match locator {
            NextLocator::Css(css) => select_all(root, css),
            NextLocator::Label(tag) => select_all(root, tag)
                .into_iter()
                .filter(|el| is_next_label(&element_text(*el)))
                .collect(),
        };
        for el in candidates {
            if !enabled_in_markup(el) {
                continue;
            }
            if let Some(url) = navigable_href(el, base) {
                return Some(StaticNext {
                    url,
                    locator: *locator,
                });
            }
        }
    }
    None
}

fn enabled_in_markup(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if v.attr("disabled").is_some()
        || v.attr("aria-disabled").is_some_and(|a| a.trim().eq_ignore_ascii_case("true"))
    {
        return false;
    }
    // Pagination widgets usually put `disabled` on the wrapping list item.
    let parent = el.parent().and_then(ElementRef::wrap);
    if std::iter::once(el)
        .chain(parent)
        .any(|e| e.value().classes().any(|c| c == "disabled"))
    {
        return false;
    }
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .all(|e| !hidden_in_markup(e))
}

fn hidden_in_markup(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if v.attr("hidden").is_some() {
        return true;
    }
    v.attr("style").is_some_and(|style| {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn navigable_href(el: ElementRef<'_>, base: &Url) -> Option<Url> {
    let v = el.value();
    ["data-uw-original-href", "href", "data-href", "data-url"]
        .iter()
        .filter_map(|attr| v.attr(attr))
        .find_map(|href| resolve_href(base, href))
}
