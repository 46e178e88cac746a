//! REST resources: paginated reads and single-shot writes.
//!
//! [`RestMethod::get`] returns a [`PendingResponse`] at once and fetches on a
//! background task. When the server marks a page as one of several (the
//! `x-es-pagination` header), the task waits until the caller asks for the
//! next page and then fetches it with the remembered cursor, so pages of one
//! operation are never in flight at the same time.

use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::Handle;
use tracing::Instrument;
use url::Url;

use crate::{
    Authenticator, ClientConfig, ContentType, Error, HttpClient, Method, Page, PageWriter,
    Payload, PendingResponse, ProviderContext, Request, Response, Result, SessionCache,
    XmlDocument, classify, decode_payload, default_reason,
};

/// Response header carrying the server's pagination id.
pub const PAGINATION_HEADER: &str = "x-es-pagination";
/// Response header set to `true` on the last page.
pub const LAST_PAGE_HEADER: &str = "x-es-last-page";
/// Request header carrying the session token.
pub const CONNECTION_ID_HEADER: &str = "X-ASM-ConnectionId";

/// Query parameter echoing the pagination id.
pub const PAGINATION_ID_PARAM: &str = "requestPaginationId";
/// Query parameter selecting the page, counted from 1.
pub const PAGE_PARAM: &str = "requestPage";

/// Where the next page of a paginated listing starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Opaque id the server handed out with the first page.
    pub id: String,
    /// Page to request, counted from 1.
    pub page: u32,
}

impl PaginationCursor {
    /// Append the cursor parameters to `url`.
    pub fn apply(&self, url: &mut Url) {
        url.query_pairs_mut()
            .append_pair(PAGINATION_ID_PARAM, &self.id)
            .append_pair(PAGE_PARAM, &self.page.to_string());
    }
}

/// What follows a `200` page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// This is the last page.
    Last,
    /// Fetch the given cursor next.
    Cursor(PaginationCursor),
}

/// Decide from the pagination headers of page `page` whether more follow.
///
/// An absent or empty pagination id ends the listing. With an id present the
/// listing ends only when `x-es-last-page` is `true` (any case), or when the
/// marker is missing and `assume_last_when_unmarked` is set.
#[must_use]
pub fn next_page(
    response: &Response<Bytes>,
    page: u32,
    assume_last_when_unmarked: bool,
) -> NextPage {
    let Some(id) = response
        .header(PAGINATION_HEADER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return NextPage::Last;
    };

    let last = match response.header(LAST_PAGE_HEADER) {
        Some(marker) => marker.trim().eq_ignore_ascii_case("true"),
        None => assume_last_when_unmarked,
    };
    if last {
        NextPage::Last
    } else {
        NextPage::Cursor(PaginationCursor {
            id: id.to_string(),
            page: page + 1,
        })
    }
}

// ============================================================================
// Page fetching
// ============================================================================

enum Fetched {
    NotFound,
    Page(Payload, NextPage),
}

/// Everything the background task needs to fetch the pages of one operation.
struct PageFetch<C, A> {
    client: C,
    sessions: Arc<SessionCache<A>>,
    context: Arc<ProviderContext>,
    target: Url,
    assume_last_when_unmarked: bool,
}

impl<C: HttpClient, A: Authenticator> PageFetch<C, A> {
    async fn run(self, mut writer: PageWriter) {
        let mut cursor: Option<PaginationCursor> = None;
        loop {
            let page = cursor.as_ref().map_or(1, |cursor| cursor.page);
            match self.fetch(cursor.as_ref()).await {
                Ok(Fetched::NotFound) => {
                    tracing::debug!(page, "resource not found");
                    writer.resolve_not_found();
                    return;
                }
                Ok(Fetched::Page(payload, NextPage::Last)) => {
                    tracing::debug!(page, "last page");
                    writer.resolve_success(200, payload);
                    return;
                }
                Ok(Fetched::Page(payload, NextPage::Cursor(next))) => {
                    tracing::debug!(page, "more pages follow");
                    let Some(next_writer) = writer.resolve_partial(200, payload).requested().await
                    else {
                        tracing::debug!(page, "listing abandoned by every reader");
                        return;
                    };
                    writer = next_writer;
                    cursor = Some(next);
                }
                Err(error) => {
                    tracing::warn!(page, %error, "page fetch failed");
                    writer.resolve_error(error);
                    return;
                }
            }
        }
    }

    async fn fetch(&self, cursor: Option<&PaginationCursor>) -> Result<Fetched> {
        let token = self.sessions.token(&self.context).await?;

        let mut target = self.target.clone();
        if let Some(cursor) = cursor {
            cursor.apply(&mut target);
        }
        let request = Request::builder(Method::Get, target)
            .header("Accept", ContentType::Xml.as_str())
            .header(CONNECTION_ID_HEADER, token)
            .build();
        let response = self.client.execute(request).await?;

        match response.status() {
            404 => Ok(Fetched::NotFound),
            200 => {
                if response.body().is_empty() {
                    return Err(Error::no_entity("no entity was returned from an HTTP GET"));
                }
                let page = cursor.map_or(1, |cursor| cursor.page);
                let next = next_page(&response, page, self.assume_last_when_unmarked);
                let payload = decode_payload(response.content_type(), response.body())?;
                Ok(Fetched::Page(payload, next))
            }
            status => Err(classify(status, default_reason(status), response.body())),
        }
    }
}

// ============================================================================
// RestMethod
// ============================================================================

/// REST calls for one provider context.
#[derive(Debug)]
pub struct RestMethod<C, A> {
    client: C,
    sessions: Arc<SessionCache<A>>,
    context: Arc<ProviderContext>,
    config: ClientConfig,
    runtime: Option<Handle>,
}

impl<C, A> RestMethod<C, A>
where
    C: HttpClient + Clone + 'static,
    A: Authenticator + 'static,
{
    /// Create REST calls for `context`.
    ///
    /// Background fetches run on the runtime current at construction, if any.
    pub fn new(
        client: C,
        sessions: Arc<SessionCache<A>>,
        context: Arc<ProviderContext>,
        config: ClientConfig,
    ) -> Self {
        Self {
            client,
            sessions,
            context,
            config,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Run background fetches on `runtime`.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Context these calls are made for.
    #[must_use]
    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Start reading `resource` (or one record of it, with `id`).
    ///
    /// Returns immediately; the first page resolves once fetched and later
    /// pages are fetched as the caller walks the chain.
    pub fn get<K, V>(
        &self,
        operation: &str,
        resource: &str,
        id: Option<&str>,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> PendingResponse
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (writer, pending) = PendingResponse::channel_with_liveness(self.config.liveness_interval);

        let mut target = match self.context.resource_url(resource, id) {
            Ok(target) => target,
            Err(error) => {
                writer.resolve_error(error);
                return pending;
            }
        };
        let mut params = params.into_iter().peekable();
        if params.peek().is_some() {
            let mut query = target.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name.as_ref(), value.as_ref());
            }
        }

        let Some(runtime) = self.runtime.as_ref() else {
            writer.resolve_error(Error::internal("no tokio runtime to fetch pages on"));
            return pending;
        };

        let span = tracing::info_span!("asm.list", operation, resource, id);
        let fetch = PageFetch {
            client: self.client.clone(),
            sessions: Arc::clone(&self.sessions),
            context: Arc::clone(&self.context),
            target,
            assume_last_when_unmarked: self.config.assume_last_page_when_unmarked,
        };
        runtime.spawn(fetch.run(writer).instrument(span));
        pending
    }

    /// Create a resource from an XML document.
    ///
    /// Runs in the caller's task. Accepts `201 Created` and `202 Accepted`.
    ///
    /// # Errors
    ///
    /// Returns the classified error for any other status, a general error
    /// for an accepted response without a body, and a parse error when the
    /// body is not XML.
    pub async fn post(&self, resource: &str, document: &XmlDocument) -> Result<Page> {
        let span = tracing::info_span!("asm.post", resource);
        async {
            let token = self.sessions.token(&self.context).await?;
            let target = self.context.resource_url(resource, None)?;
            let request = Request::builder(Method::Post, target)
                .header("Accept", ContentType::Xml.as_str())
                .header(CONNECTION_ID_HEADER, token)
                .xml(document)
                .build();
            let response = self.client.execute(request).await?;

            let status = response.status();
            if !matches!(status, 201 | 202) {
                return Err(classify(status, default_reason(status), response.body()));
            }
            if response.body().is_empty() {
                return Err(Error::no_entity("no response to the POST"));
            }
            let document = XmlDocument::parse_bytes(response.body())?;
            tracing::debug!(status, "resource accepted");
            Ok(Page::new(status, Payload::Xml(Arc::new(document)), true))
        }
        .instrument(span)
        .await
    }
}
