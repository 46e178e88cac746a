//! Pagination driven by a scripted transport, without sockets.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use asm_client::{
    Authenticator, ClientConfig, Error, HttpClient, ProviderContext, Request, Response, Result,
    RestMethod, SessionCache,
};
use assert2::{check, let_assert};
use bytes::Bytes;
use futures_util::StreamExt;

#[derive(Debug, Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<Response<Bytes>>>,
    seen: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    fn new(replies: impl IntoIterator<Item = Response<Bytes>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("seen").clone()
    }
}

impl HttpClient for ScriptedClient {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let url = request.url();
        let target = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        self.seen.lock().expect("seen").push(target);
        assert_eq!(request.header("X-ASM-ConnectionId"), Some("static-token"));

        tokio::task::yield_now().await;
        let reply = self.replies.lock().expect("replies").pop_front();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.ok_or_else(|| Error::connection("script exhausted"))
    }
}

#[derive(Debug, Default)]
struct StaticAuthenticator {
    calls: AtomicUsize,
}

impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, _context: &ProviderContext) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("static-token".to_string())
    }
}

fn page(body: &'static str, headers: &[(&str, &str)]) -> Response<Bytes> {
    let mut all: HashMap<String, String> = headers
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect();
    all.insert("Content-Type".to_string(), "application/xml".to_string());
    Response::new(200, all, Bytes::from_static(body.as_bytes()))
}

fn rest(
    client: &Arc<ScriptedClient>,
    authenticator: &Arc<StaticAuthenticator>,
) -> RestMethod<Arc<ScriptedClient>, Arc<StaticAuthenticator>> {
    let context = ProviderContext::new("https://asm.test/api/", "42", "admin", "secret")
        .expect("context");
    RestMethod::new(
        Arc::clone(client),
        Arc::new(SessionCache::new(Arc::clone(authenticator))),
        Arc::new(context),
        ClientConfig::default(),
    )
}

#[tokio::test]
async fn pages_are_requested_one_at_a_time_in_order() {
    let client = ScriptedClient::new([
        page("<list><item/></list>", &[("x-es-pagination", "p-7")]),
        page(
            "<list><item/></list>",
            &[("x-es-pagination", "p-7"), ("x-es-last-page", "false")],
        ),
        page(
            "<list><item/><item/></list>",
            &[("x-es-pagination", "p-7"), ("x-es-last-page", "true")],
        ),
    ]);
    let authenticator = Arc::new(StaticAuthenticator::default());

    let items = rest(&client, &authenticator)
        .get("listItems", "items", None, [("owner", "ops")])
        .collect_records_async(|page| {
            Ok(page
                .xml()
                .map(|doc| doc.elements_by_tag_name("item").count())
                .into_iter()
                .collect())
        })
        .await
        .expect("records");

    check!(items == [1, 1, 2]);
    check!(
        client.seen()
            == [
                "/api/items?owner=ops",
                "/api/items?owner=ops&requestPaginationId=p-7&requestPage=2",
                "/api/items?owner=ops&requestPaginationId=p-7&requestPage=3",
            ]
    );
    check!(client.max_in_flight.load(Ordering::SeqCst) == 1);
    check!(authenticator.calls.load(Ordering::SeqCst) == 1);
}

#[tokio::test]
async fn stream_ends_after_a_transport_failure() {
    let client = ScriptedClient::new([page("<list/>", &[("x-es-pagination", "p-1")])]);
    let authenticator = Arc::new(StaticAuthenticator::default());

    let pages: Vec<_> = rest(&client, &authenticator)
        .get("listItems", "items", None, asm_client::NO_PARAMS)
        .into_stream()
        .collect()
        .await;

    check!(pages.len() == 2);
    check!(pages.first().is_some_and(std::result::Result::is_ok));
    let_assert!(Some(Err(error)) = pages.get(1));
    check!(error.is_connection());
    check!(client.seen().len() == 2);
}

#[tokio::test]
async fn readers_on_other_threads_see_the_same_chain() {
    let client = ScriptedClient::new([
        page("<list/>", &[("x-es-pagination", "p-2")]),
        page("<list/>", &[("x-es-pagination", "p-2"), ("x-es-last-page", "TRUE")]),
    ]);
    let authenticator = Arc::new(StaticAuthenticator::default());
    let first = rest(&client, &authenticator).get("listItems", "items", None, asm_client::NO_PARAMS);

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let first = first.clone();
            tokio::task::spawn_blocking(move || {
                let second = first.next().expect("next").expect("second page");
                second.is_done().expect("done")
            })
        })
        .collect();

    for reader in readers {
        check!(reader.await.expect("join"));
    }
    check!(client.seen().len() == 2);
}

#[test]
fn without_a_runtime_the_listing_fails_immediately() {
    let client = ScriptedClient::new([]);
    let authenticator = Arc::new(StaticAuthenticator::default());

    let pending = rest(&client, &authenticator).get("listItems", "items", None, asm_client::NO_PARAMS);

    let_assert!(Err(Error::Internal(_)) = pending.wait());
    check!(client.seen().is_empty());
}

#[tokio::test]
async fn deeply_nested_page_resolves_as_an_xml_error() {
    let depth = 100_000;
    let body = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
    let mut headers = HashMap::new();
    headers.insert("Content-Type".to_string(), "application/xml".to_string());
    let client = ScriptedClient::new([Response::new(200, headers, Bytes::from(body))]);
    let authenticator = Arc::new(StaticAuthenticator::default());

    let result = rest(&client, &authenticator)
        .get("listItems", "items", None, asm_client::NO_PARAMS)
        .resolved()
        .await;

    let_assert!(Err(Error::Xml(_)) = result);
}
