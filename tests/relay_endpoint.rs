use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use bytes::Bytes;
use futures::stream;
use site_chat::config::prompt::PromptConfig;
use site_chat::crawl::{CrawlClient, CrawlError, CrawlOptions, CrawlResult, CrawledPage};
use site_chat::llm::chat::{ByteStream, CompletionClient, CompletionError, PromptMessage, PromptRole};
use site_chat::rate_limit::FixedWindowLimiter;
use site_chat::server::api::{router, AppState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const UPSTREAM_BODY: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
    "data: [DONE]\n\n"
);

#[derive(Default)]
struct FakeCrawler {
    pages: Vec<CrawledPage>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl CrawlClient for FakeCrawler {
    async fn crawl(&self, url: &str, options: &CrawlOptions) -> Result<CrawlResult, CrawlError> {
        assert_eq!(options.limit, 10);
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(CrawlError::Rejected("HTTP 500".into()));
        }
        Ok(CrawlResult { pages: self.pages.clone() })
    }
}

#[derive(Default)]
struct FakeCompletion {
    fail_status: Option<u16>,
    prompts: Mutex<Vec<Vec<PromptMessage>>>,
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn stream_chat(&self, messages: Vec<PromptMessage>) -> Result<ByteStream, CompletionError> {
        self.prompts.lock().unwrap().push(messages);
        if let Some(status) = self.fail_status {
            return Err(CompletionError::Status { status, body: "{\"error\":\"nope\"}".into() });
        }
        let chunks = UPSTREAM_BODY
            .split_inclusive("\n\n")
            .map(|c| Ok::<_, Box<dyn std::error::Error + Send + Sync>>(Bytes::from(c.to_string())))
            .collect::<Vec<_>>();
        Ok(Box::pin(stream::iter(chunks)))
    }

    fn get_model(&self) -> String {
        "fake-model".into()
    }
}

struct Harness {
    app: Router,
    crawler: Arc<FakeCrawler>,
    completion: Arc<FakeCompletion>,
}

fn harness(crawler: FakeCrawler, completion: FakeCompletion, limiter: FixedWindowLimiter) -> Harness {
    let crawler = Arc::new(crawler);
    let completion = Arc::new(completion);
    let state = AppState {
        limiter: Arc::new(limiter),
        global_limiter: None,
        crawler: crawler.clone(),
        completion: completion.clone(),
        prompts: Arc::new(PromptConfig::default()),
        crawl_options: CrawlOptions::default(),
    };
    Harness { app: router(state), crawler, completion }
}

fn default_harness() -> Harness {
    harness(FakeCrawler::default(), FakeCompletion::default(), FixedWindowLimiter::default())
}

fn chat_request(body: &str, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json");
    if let Some(ip) = forwarded_for {
        builder = builder.header("x-forwarded-for", ip);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

fn error_of(body: &str) -> String {
    let v: serde_json::Value = serde_json::from_str(body).unwrap();
    v["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn plain_message_streams_upstream_body_unmodified() {
    let h = default_harness();
    let (status, headers, body) = send(&h.app, chat_request(r#"{"message":"Hi"}"#, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["connection"], "keep-alive");
    assert_eq!(body, UPSTREAM_BODY);

    let prompts = h.completion.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0][0].role, PromptRole::System);
    assert_eq!(prompts[0][1].content, "Hi");
    assert!(h.crawler.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn crawled_text_precedes_message_in_prompt() {
    let crawler = FakeCrawler {
        pages: vec![CrawledPage { markdown: Some("# Example Domain".into()) }],
        ..Default::default()
    };
    let h = harness(crawler, FakeCompletion::default(), FixedWindowLimiter::default());

    let (status, _, _) = send(
        &h.app,
        chat_request(r#"{"url":"https://example.com","message":"What is this?"}"#, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(*h.crawler.calls.lock().unwrap(), vec!["https://example.com/".to_string()]);
    let prompts = h.completion.prompts.lock().unwrap();
    let user = &prompts[0][1].content;
    let data_at = user.find("# Example Domain").unwrap();
    let message_at = user.find("What is this?").unwrap();
    assert!(data_at < message_at);
}

#[tokio::test]
async fn missing_markdown_fails_without_completion_call() {
    let crawler = FakeCrawler {
        pages: vec![CrawledPage { markdown: None }],
        ..Default::default()
    };
    let h = harness(crawler, FakeCompletion::default(), FixedWindowLimiter::default());

    let (status, _, body) = send(
        &h.app,
        chat_request(r#"{"url":"https://example.com","message":"hi"}"#, None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_of(&body), "Failed to crawl the provided URL. Please try again.");
    assert!(h.completion.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn crawl_error_is_fatal() {
    let crawler = FakeCrawler { fail: true, ..Default::default() };
    let h = harness(crawler, FakeCompletion::default(), FixedWindowLimiter::default());

    let (status, _, _) = send(
        &h.app,
        chat_request(r#"{"url":"https://example.com","message":"hi"}"#, None),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.completion.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn validation_failures_are_bad_requests() {
    let h = default_harness();
    let cases = [
        (r#"{}"#, "Message is required."),
        (r#"{"message":""}"#, "Message is required."),
        (r#"{"url":"https://example.com"}"#, "Message is required."),
        (r#"{"message":"hi","url":"not a url"}"#, "Invalid URL provided."),
        (r#"{"message":42}"#, "Invalid request body."),
        ("not json at all", "Invalid request body."),
    ];

    for (body, expected) in cases {
        let (status, _, resp) = send(&h.app, chat_request(body, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(error_of(&resp), expected, "body: {}", body);
    }
    assert!(h.completion.prompts.lock().unwrap().is_empty());
    assert!(h.crawler.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn null_url_is_treated_as_absent() {
    let h = default_harness();
    let (status, _, _) = send(&h.app, chat_request(r#"{"url":null,"message":"hi"}"#, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.crawler.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upstream_failure_is_server_error() {
    let completion = FakeCompletion { fail_status: Some(401), ..Default::default() };
    let h = harness(FakeCrawler::default(), completion, FixedWindowLimiter::default());

    let (status, headers, body) = send(&h.app, chat_request(r#"{"message":"hi"}"#, None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(error_of(&body), "An unexpected error occurred. Please try again later.");
}

#[tokio::test]
async fn eleventh_request_from_caller_is_rate_limited() {
    let h = default_harness();

    for _ in 0..10 {
        let (status, _, _) =
            send(&h.app, chat_request(r#"{"message":"hi"}"#, Some("198.51.100.4"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _, body) =
        send(&h.app, chat_request(r#"{"message":"hi"}"#, Some("198.51.100.4"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(error_of(&body), "Too many requests. Please try again later.");
    assert_eq!(h.completion.prompts.lock().unwrap().len(), 10);

    let (status, _, _) = send(&h.app, chat_request(r#"{"message":"hi"}"#, Some("198.51.100.5"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_applies_before_validation() {
    let h = harness(
        FakeCrawler::default(),
        FakeCompletion::default(),
        FixedWindowLimiter::new(Duration::from_secs(60), 1),
    );

    let (status, _, _) = send(&h.app, chat_request(r#"{"message":""}"#, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&h.app, chat_request(r#"{"message":""}"#, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn window_reset_allows_requests_again() {
    let h = harness(
        FakeCrawler::default(),
        FakeCompletion::default(),
        FixedWindowLimiter::new(Duration::from_millis(200), 2),
    );

    for _ in 0..2 {
        let (status, _, _) = send(&h.app, chat_request(r#"{"message":"hi"}"#, None)).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, _) = send(&h.app, chat_request(r#"{"message":"hi"}"#, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (status, _, _) = send(&h.app, chat_request(r#"{"message":"hi"}"#, None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn large_body_reaches_rate_limiter_and_completion() {
    let h = harness(
        FakeCrawler::default(),
        FakeCompletion::default(),
        FixedWindowLimiter::new(Duration::from_secs(60), 1),
    );
    let body = serde_json::json!({ "message": "a".repeat(3 * 1024 * 1024) }).to_string();

    let (status, _, _) = send(&h.app, chat_request(&body, None)).await;
    assert_eq!(status, StatusCode::OK);
    {
        let prompts = h.completion.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0][1].content.len(), 3 * 1024 * 1024);
    }

    let (status, headers, resp) = send(&h.app, chat_request(&body, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(error_of(&resp), "Too many requests. Please try again later.");
}
