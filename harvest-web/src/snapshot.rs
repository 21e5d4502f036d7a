use crate::dom::{select_first, visible_text};
use harvest_common::FetchStrategy;
use scraper::Html;
use url::Url;

/// A rendered page as seen by one strategy.
///
/// Holds the raw markup rather than a parsed tree; call [`PageSnapshot::document`]
/// inside a synchronous scope to query it.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    url: Url,
    html: String,
    strategy: FetchStrategy,
    fingerprint: String,
    text_len: usize,
}

impl PageSnapshot {
    pub fn new(url: Url, html: String, strategy: FetchStrategy) -> Self {
        let doc = Html::parse_document(&html);
        let text = visible_text(&doc);
        Self {
            url,
            strategy,
            fingerprint: blake3::hash(text.as_bytes()).to_hex().to_string(),
            text_len: text.len(),
            html,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    /// Hash of the page's visible text. Equal for pages that render the same
    /// content under different URLs.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Whether anything visible was rendered.
    pub fn has_content(&self) -> bool {
        self.text_len > 0
    }

    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Base for resolving relative links: `<base href>` if present, else the
    /// page URL.
    pub fn base_url(&self, doc: &Html) -> Url {
        select_first(doc.root_element(), "base[href]")
            .and_then(|b| b.value().attr("href"))
            .and_then(|href| self.url.join(href.trim()).ok())
            .unwrap_or_else(|| self.url.clone())
    }
}

/// Resolve `href` against `base`, keeping only navigable http(s) targets.
///
/// Fragment-only, `javascript:`, `mailto:` and similar pseudo-links yield
/// `None`.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://a.com/dir/").unwrap()
    }

    #[test]
    fn resolves_relative_and_keeps_absolute() {
        assert_eq!(
            resolve_href(&base(), "/x/y").unwrap().as_str(),
            "https://a.com/x/y"
        );
        assert_eq!(
            resolve_href(&base(), "page2.html").unwrap().as_str(),
            "https://a.com/dir/page2.html"
        );
        assert_eq!(
            resolve_href(&base(), "https://b.com/p?q=1").unwrap().as_str(),
            "https://b.com/p?q=1"
        );
    }

    #[test]
    fn rejects_pseudo_links() {
        for href in ["", "#top", "javascript:void(0)", "mailto:x@a.com", " JavaScript:go()"] {
            assert!(resolve_href(&base(), href).is_none(), "{href}");
        }
    }

    #[test]
    fn base_element_overrides_page_url() {
        let snap = PageSnapshot::new(
            base(),
            "<html><head><base href='https://cdn.a.com/root/'></head><body>x</body></html>".into(),
            FetchStrategy::PlainHttp,
        );
        let doc = snap.document();
        assert_eq!(snap.base_url(&doc).as_str(), "https://cdn.a.com/root/");
    }

    #[test]
    fn fingerprint_ignores_markup_differences() {
        let a = PageSnapshot::new(
            base(),
            "<body><p>Same   text</p></body>".into(),
            FetchStrategy::PlainHttp,
        );
        let b = PageSnapshot::new(
            Url::parse("https://a.com/other").unwrap(),
            "<body><div class='x'>Same text</div><script>1</script></body>".into(),
            FetchStrategy::AsyncHttp,
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(a.has_content());
    }

    #[test]
    fn script_only_page_has_no_content() {
        let snap = PageSnapshot::new(
            base(),
            "<html><body><script>render()</script><noscript>enable js</noscript></body></html>".into(),
            FetchStrategy::PlainHttp,
        );
        assert!(!snap.has_content());
    }
}
