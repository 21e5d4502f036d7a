use harvest_http::blocking::BlockingHttpClient;
use harvest_http::{HttpClient, HttpError, RequestOpts};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap().with_retries(2);
    let resp = client
        .get_text(&format!("{}/list", server.uri()), RequestOpts::default())
        .await
        .expect("second attempt succeeds");

    assert_eq!(resp.status.as_u16(), 200);
    assert_eq!(resp.body, "<html>ok</html>");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap().with_retries(3);
    let err = client
        .get_text(&format!("{}/missing", server.uri()), RequestOpts::default())
        .await
        .unwrap_err();

    match err {
        HttpError::Api { status, message } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(message, "nope");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = HttpClient::new().unwrap();
    let opts = RequestOpts {
        timeout: Some(Duration::from_millis(100)),
        retries: Some(0),
        ..Default::default()
    };
    let err = client.get_text(&server.uri(), opts).await.unwrap_err();
    assert!(matches!(err, HttpError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn blocking_client_sends_caller_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header("cookie", "sid=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
        .mount(&server)
        .await;

    let url = format!("{}/page", server.uri());
    let resp = tokio::task::spawn_blocking(move || {
        let mut headers = harvest_http::document_headers("harvest-test");
        headers.insert("cookie", "sid=abc".parse().unwrap());
        let opts = RequestOpts {
            headers: Some(headers),
            ..Default::default()
        };
        BlockingHttpClient::new().unwrap().get_text(&url, &opts)
    })
    .await
    .unwrap()
    .expect("blocking fetch succeeds");

    assert_eq!(resp.body, "<p>hi</p>");
}
