//! Detail page enrichment: one visit per linked record for a biography and
//! the page's images.

use crate::dom::{element_text, main_region, select_all, select_first, strip_regions, text_lines};
use crate::fetch::{FailureKind, Retriever};
use crate::rate::RateLimitPolicy;
use crate::record::{DetailInfo, Record};
use crate::session::SessionContext;
use crate::snapshot::{PageSnapshot, resolve_href};
use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Pause applied to every caller after a detail page answers 429.
const THROTTLE_PAUSE: Duration = Duration::from_secs(30);

/// Containers whose text never belongs to a biography.
const BIO_NOISE: &[&str] = &["form", "footer", ".footer", ".modal.fade"];

/// Per-run counts reported back to the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    pub attempted: usize,
    pub enriched: usize,
    pub failed: usize,
}

/// Visits detail pages through an ordered chain of retrievers, one attempt
/// each, first success wins.
pub struct Enricher {
    chain: Vec<Arc<dyn Retriever>>,
    session: SessionContext,
    timeout: Duration,
    rate: Arc<RateLimitPolicy>,
}

impl Enricher {
    pub fn new(
        chain: Vec<Arc<dyn Retriever>>,
        session: SessionContext,
        timeout: Duration,
        rate: Arc<RateLimitPolicy>,
    ) -> Self {
        Self {
            chain,
            session,
            timeout,
            rate,
        }
    }

    /// Fetch the record's `link` and extract its detail. Records without a
    /// usable link, and links no retriever could load, yield `None`.
    pub async fn enrich(&self, record: &Record) -> Option<DetailInfo> {
        let link = record.link()?;
        let url = match Url::parse(link) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(target: "harvest.enrich", %link, error = %e, "enrich.bad_link");
                return None;
            }
        };
        for retriever in &self.chain {
            self.rate.wait_turn().await;
            match retriever.fetch_once(&url, &self.session, self.timeout).await {
                Ok(page) => {
                    let detail = detail_from(&page);
                    tracing::debug!(
                        target: "harvest.enrich",
                        %url,
                        strategy = %page.strategy(),
                        bio_len = detail.bio.len(),
                        images = detail.images.len(),
                        "enrich.done"
                    );
                    return Some(detail);
                }
                Err(failure) => {
                    tracing::debug!(target: "harvest.enrich", %url, error = %failure, "enrich.attempt.failed");
                    if failure.kind == FailureKind::Status(429) {
                        tracing::warn!(
                            target: "harvest.enrich",
                            %url,
                            pause_secs = THROTTLE_PAUSE.as_secs(),
                            "enrich.throttled"
                        );
                        self.rate.cool_down(THROTTLE_PAUSE);
                    }
                }
            }
        }
        tracing::warn!(target: "harvest.enrich", %url, "enrich.failed");
        None
    }

    /// Enrich linked records one at a time, at most `limit` of them.
    pub async fn enrich_all(
        &self,
        records: &mut [Record],
        limit: Option<usize>,
        stop: &CancellationToken,
    ) -> EnrichStats {
        let mut stats = EnrichStats::default();
        for i in linked(records, limit) {
            if stop.is_cancelled() {
                break;
            }
            stats.attempted += 1;
            let detail = self.enrich(&records[i]).await;
            stats.tally(detail.is_some());
            records[i].set_detail(detail);
        }
        stats
    }

    /// Like [`Enricher::enrich_all`] with up to `workers` fetches in flight.
    /// Results are applied in the records' original order.
    pub async fn enrich_concurrent(
        &self,
        records: &mut [Record],
        limit: Option<usize>,
        workers: usize,
        stop: &CancellationToken,
    ) -> EnrichStats {
        let targets = linked(records, limit);
        let view: &[Record] = records;
        let results: Vec<(usize, Option<Option<DetailInfo>>)> = stream::iter(targets)
            .map(|i| async move {
                if stop.is_cancelled() {
                    return (i, None);
                }
                (i, Some(self.enrich(&view[i]).await))
            })
            .buffered(workers.max(1))
            .collect()
            .await;

        let mut stats = EnrichStats::default();
        for (i, outcome) in results {
            let Some(detail) = outcome else { continue };
            stats.attempted += 1;
            stats.tally(detail.is_some());
            records[i].set_detail(detail);
        }
        stats
    }
}

impl EnrichStats {
    fn tally(&mut self, ok: bool) {
        if ok {
            self.enriched += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Indices of records with a link, capped at `limit`.
fn linked(records: &[Record], limit: Option<usize>) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.link().is_some())
        .map(|(i, _)| i)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

pub fn detail_from(page: &PageSnapshot) -> DetailInfo {
    let doc = page.document();
    let base = page.base_url(&doc);
    DetailInfo {
        bio: extract_bio(&doc),
        images: extract_images(&doc, &base),
    }
}

/// Paragraph and list text of the main region, followed by the labelled
/// profile fields some directory sites use, one line each with duplicates
/// removed.
pub fn extract_bio(doc: &Html) -> String {
    let mut work = doc.clone();
    strip_regions(&mut work, BIO_NOISE);
    let scope = main_region(&work).unwrap_or_else(|| work.root_element());

    let mut lines = Vec::new();
    for el in select_all(scope, "p, li") {
        lines.extend(text_lines(el));
    }

    let root = work.root_element();
    if let Some(name) = select_first(root, "div.item--name") {
        let text = select_first(name, "a").map_or_else(|| element_text(name), element_text);
        lines.push(text);
    }
    for css in ["div.item--function", "div.item--title"] {
        if let Some(el) = select_first(root, css) {
            lines.push(element_text(el));
        }
    }
    if let Some(phones) = select_first(root, "div.item--phones") {
        for (css, label) in [("div.tel", "Tel"), ("div.mobile", "Mobile")] {
            if let Some(el) = select_first(phones, css) {
                lines.push(format!("{label}: {}", element_text(el)));
            }
        }
    }

    let mut seen = HashSet::new();
    lines
        .iter()
        .flat_map(|block| block.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(*l))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Absolute URLs of every image on the page, lazy-loading and responsive
/// sources included, in document order without duplicates.
pub fn extract_images(doc: &Html, base: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for img in select_all(doc.root_element(), "img") {
        let Some(src) = image_source(img) else {
            continue;
        };
        if src.trim_start().to_ascii_lowercase().starts_with("data:") {
            continue;
        }
        if let Some(url) = resolve_href(base, &src) {
            if seen.insert(url.to_string()) {
                out.push(url.to_string());
            }
        }
    }
    out
}

fn image_source(img: ElementRef<'_>) -> Option<String> {
    let v = img.value();
    let non_empty = |a: &str| v.attr(a).map(str::trim).filter(|s| !s.is_empty());

    if let Some(best) = ["srcset", "data-srcset"]
        .into_iter()
        .filter_map(non_empty)
        .find_map(largest_candidate)
    {
        return Some(best);
    }
    ["data-src", "data-lazy-src", "data-original", "src"]
        .into_iter()
        .find_map(non_empty)
        .map(str::to_string)
}

/// Pick the widest `srcset` candidate, by `w` descriptor, else by `x`
/// density, else the last one listed. Inline `data:` candidates are skipped.
fn largest_candidate(srcset: &str) -> Option<String> {
    let mut best: Option<(f64, &str)> = None;
    for (url, descriptor) in srcset_candidates(srcset) {
        if url.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("data:")) {
            continue;
        }
        let weight = match descriptor {
            Some(d) if d.ends_with('w') => d.trim_end_matches('w').parse::<f64>().unwrap_or(0.0) * 1e6,
            Some(d) if d.ends_with('x') => d.trim_end_matches('x').parse::<f64>().unwrap_or(1.0),
            _ => 1.0,
        };
        if best.is_none_or(|(w, _)| weight >= w) {
            best = Some((weight, url));
        }
    }
    best.map(|(_, url)| url.to_string())
}

/// Split a `srcset` into `(url, descriptor)` pairs. A URL runs to the next
/// whitespace, so commas inside it (as in `data:` payloads) do not split it.
fn srcset_candidates(srcset: &str) -> Vec<(&str, Option<&str>)> {
    let mut out = Vec::new();
    let mut rest = srcset;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let (raw, tail) = rest.split_at(end);
        let url = raw.trim_end_matches(',');
        if url.len() < raw.len() {
            // A trailing comma closes the candidate without a descriptor.
            out.push((url, None));
            rest = tail;
            continue;
        }
        let close = tail.find(',').unwrap_or(tail.len());
        out.push((url, tail[..close].split_whitespace().next()));
        rest = &tail[close..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://a.com/people/jane").unwrap()
    }

    #[test]
    fn srcset_data_candidates_keep_their_commas() {
        assert_eq!(
            srcset_candidates("a.jpg 1x, data:image/png;base64,XYZ 2x,b.jpg"),
            vec![
                ("a.jpg", Some("1x")),
                ("data:image/png;base64,XYZ", Some("2x")),
                ("b.jpg", None),
            ]
        );
        assert_eq!(
            largest_candidate("a.jpg 1x, data:image/png;base64,XYZ 2x").as_deref(),
            Some("a.jpg")
        );
        assert_eq!(largest_candidate("data:image/gif;base64,R0l 1x"), None);
    }

    #[test]
    fn bio_drops_repeated_lines() {
        let doc = Html::parse_document("<body><p>Bio line 1</p><p>Bio line 1</p></body>");
        assert_eq!(extract_bio(&doc), "Bio line 1");
    }

    #[test]
    fn bio_skips_forms_and_footers() {
        let doc = Html::parse_document(
            "<body><p>Keeps</p><form><p>Subscribe</p></form>\
             <div class='footer'><p>Copyright</p></div><footer><li>Links</li></footer></body>",
        );
        assert_eq!(extract_bio(&doc), "Keeps");
    }

    #[test]
    fn bio_prefers_main_region() {
        let doc = Html::parse_document(
            "<body><p>Outside</p><div class='main'><p>Inside</p><ul><li>Award</li></ul></div></body>",
        );
        assert_eq!(extract_bio(&doc), "Inside\nAward");
    }

    #[test]
    fn bio_appends_profile_fields() {
        let doc = Html::parse_document(
            "<body><div class='item--name'><a href='/x'>Jane Doe</a></div>\
             <div class='item--function'>Partner</div>\
             <div class='item--phones'><div class='tel'>+1 555</div><div class='mobile'>+1 777</div></div>\
             <p>Bio</p></body>",
        );
        assert_eq!(
            extract_bio(&doc),
            "Bio\nJane Doe\nPartner\nTel: +1 555\nMobile: +1 777"
        );
    }

    #[test]
    fn images_resolve_and_prefer_responsive_sources() {
        let doc = Html::parse_document(
            "<body><img src='/a.jpg'>\
             <img src='data:image/gif;base64,R0l' data-src='lazy.jpg'>\
             <img srcset='s.jpg 320w, l.jpg 1024w, m.jpg 640w' src='fallback.jpg'>\
             <img src='/a.jpg'><img src='data:image/png;base64,xx'><img></body>",
        );
        assert_eq!(
            extract_images(&doc, &base()),
            vec![
                "https://a.com/a.jpg",
                "https://a.com/people/lazy.jpg",
                "https://a.com/people/l.jpg",
            ]
        );
    }

    #[test]
    fn density_descriptors_and_bare_urls() {
        assert_eq!(largest_candidate("a.jpg 1x, b.jpg 2x").as_deref(), Some("b.jpg"));
        assert_eq!(largest_candidate("a.jpg, b.jpg").as_deref(), Some("b.jpg"));
        assert_eq!(largest_candidate(" , ").as_deref(), None);
    }

    struct Throttled;

    #[async_trait::async_trait]
    impl Retriever for Throttled {
        fn strategy(&self) -> harvest_common::FetchStrategy {
            harvest_common::FetchStrategy::AsyncHttp
        }

        async fn open(
            &self,
            _url: &Url,
            _session: &SessionContext,
            _timeout: Duration,
        ) -> Result<Box<dyn crate::fetch::PageSession>, crate::fetch::FetchFailure> {
            Err(crate::fetch::FetchFailure::new(
                self.strategy(),
                FailureKind::Status(429),
                "slow down",
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_detail_page_pauses_the_next_fetch() {
        let enricher = Enricher::new(
            vec![Arc::new(Throttled)],
            SessionContext::new(),
            Duration::from_secs(5),
            Arc::new(RateLimitPolicy::default()),
        );
        let start = tokio::time::Instant::now();
        assert!(enricher.enrich(&Record::named_link("a", "https://a.com/a")).await.is_none());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(enricher.enrich(&Record::named_link("b", "https://a.com/b")).await.is_none());
        assert!(start.elapsed() >= THROTTLE_PAUSE);
    }

    #[test]
    fn linked_respects_limit() {
        let records = vec![
            Record::named_link("a", "https://a.com/a"),
            Record::new(),
            Record::named_link("b", "https://a.com/b"),
            Record::named_link("c", "https://a.com/c"),
        ];
        assert_eq!(linked(&records, Some(2)), vec![0, 2]);
        assert_eq!(linked(&records, None), vec![0, 2, 3]);
    }
}
