use crate::dom::{element_text, main_region, select_all, strip_outside, strip_regions};
use crate::record::Record;
use crate::snapshot::resolve_href;
use scraper::Html;
use std::collections::HashSet;
use url::Url;

/// Sectioning tags that are page chrome only outside a content container.
const CHROME_TAGS: &[&str] = &["header", "aside", "footer", "nav"];

/// Containers whose own `header`/`footer` belong to the entry.
const CONTENT_CONTAINERS: &[&str] = &["article", "section", "main"];

/// Page chrome that carries navigation links rather than listing entries.
const CHROME: &[&str] = &[
    ".header",
    ".aside",
    ".footer",
    ".form",
    ".sidebar",
    ".modal.fade",
    ".search-lst--top",
    ".search-lst--filters",
    ".pre-header",
    ".fixed-header",
    "#SearchBanner",
];

/// Generic call-to-action labels that never name an entry.
const DENYLIST: &[&str] = &[
    "read more",
    "click here",
    "learn more",
    "report this?",
    "register",
    "terms and conditions",
    "privacy policy",
    "find out more",
];

/// `{name, link}` records for the content anchors of a page.
///
/// Works on a copy of `doc` with page chrome removed, scoped to the main
/// region when the page marks one. Each absolute URL is emitted once, under
/// the first anchor that points at it.
pub fn extract_links(doc: &Html, base: &Url) -> Vec<Record> {
    let mut work = doc.clone();
    strip_outside(&mut work, CHROME_TAGS, CONTENT_CONTAINERS);
    strip_regions(&mut work, CHROME);
    let scope = main_region(&work).unwrap_or_else(|| work.root_element());

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for a in select_all(scope, "a") {
        let el = a.value();
        let Some(href) = el
            .attr("data-uw-original-href")
            .or_else(|| el.attr("href"))
        else {
            continue;
        };
        if el
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")))
        {
            continue;
        }
        let Some(url) = resolve_href(base, href) else {
            continue;
        };
        if seen.contains(url.as_str()) {
            continue;
        }

        let name = match el.attr("title").map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => element_text(a),
        };
        if name.is_empty() || is_denied(&name) {
            continue;
        }
        seen.insert(url.to_string());
        out.push(Record::named_link(name, url.to_string()));
    }
    out
}

fn is_denied(name: &str) -> bool {
    DENYLIST.iter().any(|d| d.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://a.com/dir/").unwrap()
    }

    fn links(html: &str) -> Vec<Record> {
        extract_links(&Html::parse_document(html), &base())
    }

    #[test]
    fn resolves_and_names_anchors() {
        let records = links(
            "<body><div><a href='/people/jane'>  Jane\n Doe </a>\
             <a href='https://b.com/x' title='Bob'>ignored text</a></div></body>",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display_name(), Some("Jane Doe"));
        assert_eq!(records[0].link(), Some("https://a.com/people/jane"));
        assert_eq!(records[1].display_name(), Some("Bob"));
        assert_eq!(records[1].link(), Some("https://b.com/x"));
    }

    #[test]
    fn nofollow_and_pseudo_links_are_skipped() {
        let records = links(
            "<body><div><a rel='nofollow noopener' href='/spam'>Spam</a>\
             <a href='#top'>Top</a><a href='javascript:void(0)'>JS</a>\
             <a>No href</a><a href='/ok'>Ok</a></div></body>",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_name(), Some("Ok"));
    }

    #[test]
    fn chrome_regions_and_denylist_are_dropped() {
        let records = links(
            "<body><header><a href='/home'>Home</a></header>\
             <div class='sidebar'><a href='/filter'>Filter</a></div>\
             <div class='modal fade'><a href='/login'>Login</a></div>\
             <div id='SearchBanner'><a href='/s'>Search</a></div>\
             <div><a href='/jane'>Jane</a><a href='/more'>Read More</a></div>\
             <footer><a href='/privacy'>Privacy</a></footer></body>",
        );
        let names: Vec<_> = records.iter().filter_map(|r| r.display_name()).collect();
        assert_eq!(names, ["Jane"]);
    }

    #[test]
    fn card_headers_keep_their_names() {
        let records = links(
            "<body><header><a href='/'>Home</a></header><main>\
             <article><header><h3><a href='/people/jane'>Jane Doe</a></h3></header></article>\
             <article><header><h3><a href='/people/john'>John Roe</a></h3></header></article>\
             </main><footer><a href='/about'>About</a></footer></body>",
        );
        let names: Vec<_> = records.iter().filter_map(|r| r.display_name()).collect();
        assert_eq!(names, ["Jane Doe", "John Roe"]);
    }

    #[test]
    fn main_region_scopes_the_search() {
        let records = links(
            "<body><div><a href='/outside'>Outside</a></div>\
             <main><a href='/inside'>Inside</a></main></body>",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].link(), Some("https://a.com/inside"));
    }

    #[test]
    fn first_occurrence_of_url_wins() {
        let records = links(
            "<body><div><a href='/jane'><img src='j.jpg'></a><a href='/jane'>Jane</a>\
             <a href='/jane'>Jane again</a></div></body>",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_name(), Some("Jane"));
    }

    #[test]
    fn accessibility_href_overrides_href() {
        let records = links(
            "<body><div><a href='#' data-uw-original-href='/real'>Real</a></div></body>",
        );
        assert_eq!(records[0].link(), Some("https://a.com/real"));
    }

    #[test]
    fn extraction_is_idempotent() {
        let doc = Html::parse_document(
            "<body><main><a href='/a'>A</a><a href='/b'>B</a></main></body>",
        );
        assert_eq!(extract_links(&doc, &base()), extract_links(&doc, &base()));
    }
}
