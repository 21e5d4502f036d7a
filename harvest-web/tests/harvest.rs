use async_trait::async_trait;
use harvest_common::FetchStrategy;
use harvest_config::{EnrichConfig, WalkConfig};
use harvest_web::enrich::Enricher;
use harvest_web::fetch::{
    FailureKind, FetchFailure, Fetcher, HttpRetriever, PageSession, Retriever,
};
use harvest_web::paginate::{Termination, WalkOptions, Walker};
use harvest_web::rate::RateLimitPolicy;
use harvest_web::{HarvestRequest, Harvester, SessionContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A strategy that never gets a page in time.
struct Stalled;

#[async_trait]
impl Retriever for Stalled {
    fn strategy(&self) -> FetchStrategy {
        FetchStrategy::HeadlessBrowser
    }

    async fn open(
        &self,
        _url: &Url,
        _session: &SessionContext,
        timeout: Duration,
    ) -> Result<Box<dyn PageSession>, FetchFailure> {
        Err(FetchFailure::timeout(self.strategy(), timeout))
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!("<html><body>{body}</body></html>"))
}

fn walker(retrievers: Vec<Arc<dyn Retriever>>) -> Walker {
    Walker::new(
        Fetcher::new(retrievers, Duration::from_secs(5)),
        SessionContext::new(),
        Arc::new(RateLimitPolicy::default()),
    )
}

#[tokio::test]
async fn falls_back_after_a_timed_out_strategy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/films"))
        .respond_with(html(
            "<table><tr><th>Name</th><th>Year</th></tr><tr><td>Alpha</td><td>2020</td></tr></table>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let w = walker(vec![
        Arc::new(Stalled),
        Arc::new(HttpRetriever::plain("harvest-test")),
    ]);
    let out = w
        .walk(
            &format!("{}/films", server.uri()),
            &WalkOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(out.strategy, Some(FetchStrategy::PlainHttp));
    assert_eq!(out.termination, Termination::NoNextControl);
    assert_eq!(out.records.len(), 1);
    assert_eq!(
        serde_json::to_value(&out.records[0]).unwrap(),
        json!({"Name": "Alpha", "Year": "2020"})
    );
}

#[tokio::test]
async fn every_strategy_failing_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("blocked"))
        .mount(&server)
        .await;

    let w = walker(vec![
        Arc::new(Stalled),
        Arc::new(HttpRetriever::plain("harvest-test")),
        Arc::new(HttpRetriever::asynchronous("harvest-test", 0).unwrap()),
    ]);
    let out = w
        .walk(&server.uri(), &WalkOptions::default(), &CancellationToken::new())
        .await;

    assert_eq!(out.termination, Termination::FetchFailed);
    assert!(out.records.is_empty());
    let kinds: Vec<_> = out
        .failure
        .as_ref()
        .unwrap()
        .failures()
        .iter()
        .map(|f| (f.strategy, f.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (FetchStrategy::HeadlessBrowser, FailureKind::Timeout),
            (FetchStrategy::PlainHttp, FailureKind::Status(403)),
            (FetchStrategy::AsyncHttp, FailureKind::Status(403)),
        ]
    );
}

#[tokio::test]
async fn async_http_walks_query_string_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/people"))
        .and(query_param("page", "2"))
        .respond_with(html(
            "<div><a href='/people/cat'>Cat</a></div><a href='/people?page=1'>Previous</a>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/people"))
        .respond_with(html(
            "<div><a href='/people/ann'>Ann</a><a href='/people/bob'>Bob</a></div>\
             <ul class='pagination'><li class='next'><a href='?page=2'>Next &rsaquo;</a></li></ul>",
        ))
        .mount(&server)
        .await;

    let w = walker(vec![Arc::new(
        HttpRetriever::asynchronous("harvest-test", 1).unwrap(),
    )]);
    let out = w
        .walk(
            &format!("{}/people", server.uri()),
            &WalkOptions::default(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(out.pages, 2);
    assert_eq!(out.strategy, Some(FetchStrategy::AsyncHttp));
    assert_eq!(out.termination, Termination::NoNextControl);
}

#[tokio::test]
async fn async_retries_stay_within_the_attempt_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::asynchronous("harvest-test", 5).unwrap();
    let start = std::time::Instant::now();
    let failure = match retriever
        .open(
            &Url::parse(&server.uri()).unwrap(),
            &SessionContext::new(),
            Duration::from_secs(1),
        )
        .await
    {
        Ok(_) => panic!("a 503-only site cannot produce a page"),
        Err(f) => f,
    };
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(start.elapsed() < Duration::from_millis(1500), "{:?}", start.elapsed());
}

#[tokio::test]
async fn session_cookie_reaches_the_site() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("cookie", "sid=abc"))
        .respond_with(html("<div><a href='/members/1'>Member One</a></div>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html("<p>Please log in</p>"))
        .mount(&server)
        .await;

    let retriever = HttpRetriever::asynchronous("harvest-test", 0).unwrap();
    let session = SessionContext::new().with_cookie("sid", "abc");
    let page = retriever
        .open(
            &Url::parse(&server.uri()).unwrap(),
            &session,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert!(page.current().html().contains("Member One"));
    page.close().await;
}

#[tokio::test]
async fn harvester_enriches_and_dedupes_link_listings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(html(
            "<header><a href='/'>Home</a></header>\
             <div class='people'>\
               <a href='/team/jane'>Jane Doe [Director]</a>\
               <a href='/team/jane-2'>Jane Doe</a>\
               <a href='/team/john'>John Roe</a>\
               <a href='/team/gone'>Gone Person</a>\
             </div>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/team/jane"))
        .respond_with(html(
            "<main><p>Bio line 1</p><p>Bio line 1</p><img src='/img/jane.jpg'></main>\
             <footer><p>Copyright</p></footer>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/team/john"))
        .respond_with(html("<p>John bio</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/team/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let session = SessionContext::new();
    let rate = Arc::new(RateLimitPolicy::default());
    let w = Walker::new(
        Fetcher::new(
            vec![Arc::new(HttpRetriever::plain("harvest-test"))],
            Duration::from_secs(5),
        ),
        session.clone(),
        rate.clone(),
    );
    let enricher = Enricher::new(
        vec![Arc::new(HttpRetriever::asynchronous("harvest-test", 3).unwrap())],
        session,
        Duration::from_secs(5),
        rate,
    );
    let enrich = EnrichConfig {
        workers: 2,
        ..Default::default()
    };
    let harvester = Harvester::new(w, enricher, WalkConfig::default(), enrich);

    let report = harvester
        .run(
            &HarvestRequest::new(format!("{}/team", server.uri())),
            &CancellationToken::new(),
        )
        .await;

    assert!(!report.fetch_exhausted());
    assert_eq!(report.duplicates_removed, 1);
    let names: Vec<_> = report
        .records
        .iter()
        .filter_map(|r| r.display_name())
        .collect();
    assert_eq!(names, ["Jane Doe [Director]", "John Roe", "Gone Person"]);

    let jane = report.records[0].detail().unwrap();
    assert_eq!(jane.bio, "Bio line 1");
    assert_eq!(jane.images, vec![format!("{}/img/jane.jpg", server.uri())]);
    assert_eq!(report.records[1].detail().unwrap().bio, "John bio");
    assert!(report.records[2].detail().is_none());
    // The duplicate Jane link has no page either; it is enriched before dedupe.
    assert_eq!(report.enrichment.failed, 2);
}

#[tokio::test]
async fn max_details_limits_detail_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(html(
            "<div><a href='/a'>A</a><a href='/b'>B</a><a href='/c'>C</a></div>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("<p>About A</p>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<p>About B</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let session = SessionContext::new();
    let rate = Arc::new(RateLimitPolicy::default());
    let http: Arc<dyn Retriever> = Arc::new(HttpRetriever::plain("harvest-test"));
    let harvester = Harvester::new(
        Walker::new(
            Fetcher::new(vec![http.clone()], Duration::from_secs(5)),
            session.clone(),
            rate.clone(),
        ),
        Enricher::new(vec![http], session, Duration::from_secs(5), rate),
        WalkConfig::default(),
        EnrichConfig::default(),
    );

    let mut req = HarvestRequest::new(format!("{}/list", server.uri()));
    req.max_details = Some(1);
    let report = harvester.run(&req, &CancellationToken::new()).await;

    assert_eq!(report.records.len(), 3);
    assert_eq!(report.enrichment.attempted, 1);
    assert_eq!(report.records[0].detail().unwrap().bio, "About A");
    assert!(report.records[1].detail().is_none());
}
