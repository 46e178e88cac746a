//! Integration tests for middleware functionality.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use asm_client::{
    Error, HttpClient, HyperClient, Method, Request, Response, Result,
    middleware::{LoggingLayer, WIRE_TARGET},
    tower::{Layer, Service},
};
use bytes::Bytes;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

/// Test that logging middleware doesn't break request/response flow.
#[tokio::test]
async fn test_logging_middleware() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/archives"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<list/>"))
        .mount(&mock_server)
        .await;

    let client = HyperClient::builder().with_logging().build().expect("client");

    let url = url::Url::parse(&format!("{}/archives", mock_server.uri())).expect("url");
    let response = client
        .execute(Request::builder(Method::Get, url).build())
        .await
        .expect("response");

    assert!(response.is_success());
}

/// Debug logging sees session headers and bodies without altering them.
#[tokio::test]
async fn test_debug_logging() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("X-ASM-ConnectionId", "conn-1"))
        .respond_with(ResponseTemplate::new(201).set_body_string("<created/>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HyperClient::builder()
        .with_debug_logging()
        .build()
        .expect("client");

    let url = url::Url::parse(&mock_server.uri()).expect("url");
    let request = Request::builder(Method::Post, url)
        .header("X-ASM-ConnectionId", "conn-1")
        .xml_text("<create/>")
        .build();

    let response = client.execute(request).await.expect("response");

    assert_eq!(response.status(), 201);
    assert_eq!(WIRE_TARGET, "asm_client::wire");
}

/// Test that default middleware works.
#[tokio::test]
async fn test_client_with_defaults() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = HyperClient::builder().with_defaults().build().expect("client");

    let url = url::Url::parse(&mock_server.uri()).expect("url");
    let response = client
        .execute(Request::builder(Method::Get, url).build())
        .await
        .expect("response");

    assert_eq!(response.status(), 404);
}

// ============================================================================
// Custom layer
// ============================================================================

#[derive(Clone)]
struct CountingLayer {
    calls: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct Counting<S> {
    inner: S,
    calls: Arc<AtomicUsize>,
}

impl<S> Layer<S> for CountingLayer {
    type Service = Counting<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Counting {
            inner,
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<S> Service<Request<Bytes>> for Counting<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Send,
    S::Future: Send + 'static,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Bytes>>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(self.inner.call(request))
    }
}

/// Test the generic `.layer()` API alongside logging.
#[tokio::test]
async fn test_generic_layer_api() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let client = HyperClient::builder()
        .layer(CountingLayer {
            calls: Arc::clone(&calls),
        })
        .layer(LoggingLayer::debug())
        .build()
        .expect("client");

    let url = url::Url::parse(&mock_server.uri()).expect("url");
    for _ in 0..3 {
        let response = client
            .execute(Request::builder(Method::Get, url.clone()).build())
            .await
            .expect("response");
        assert!(response.is_success());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
