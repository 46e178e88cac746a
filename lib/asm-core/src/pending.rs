//! Write-once page futures, linked into a chain of continuation pages.
//!
//! A paginated operation hands its caller a [`PendingResponse`] straight
//! away and resolves it later from a background task through the paired
//! [`PageWriter`]. Readers may ask for the page before, during or after the
//! network exchange; they park until it resolves.
//!
//! Continuation is lazy. When a page resolves as partial, the writer turns
//! into a [`Continuation`] that waits until some reader calls
//! [`PendingResponse::next`] before it attaches a successor and lets the
//! fetcher go on to the next page. Pages are therefore fetched one at a time
//! and never ahead of the slowest reader's demand. Dropping every reader
//! handle stops the chain.
//!
//! Blocking accessors park the calling thread on a condition variable and
//! must not be called from inside an async task; use [`PendingResponse::resolved`]
//! and [`PendingResponse::next_page`] there.
//!
//! ```
//! use asm_core::{Page, Payload, PendingResponse};
//!
//! let (writer, pending) = PendingResponse::channel();
//! std::thread::spawn(move || writer.resolve_success(200, Payload::None));
//!
//! assert_eq!(pending.status().unwrap(), 200);
//! assert!(pending.next().unwrap().is_none());
//! ```

use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use tokio::sync::{Notify, oneshot};

use crate::{Error, Page, Payload, ResponseType, Result, XmlDocument};

/// How long a blocked reader sleeps before re-checking the page on its own.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Shared state
// ============================================================================

#[derive(Debug, Default)]
struct State {
    resolution: Option<Result<Page>>,
    next: Option<PendingResponse>,
    demand: Option<oneshot::Sender<()>>,
    severed: bool,
}

impl State {
    /// What `next()` should return, or `None` while it has to keep waiting.
    ///
    /// Signals demand to the fetcher the first time a reader asks for the
    /// successor of a partial page.
    fn successor(&mut self) -> Option<Result<Option<PendingResponse>>> {
        let page = match self.resolution.as_ref()? {
            Ok(page) => page,
            Err(error) => return Some(Err(error.clone())),
        };
        if page.is_complete() {
            return Some(Ok(None));
        }
        if let Some(next) = &self.next {
            return Some(Ok(Some(next.clone())));
        }
        if self.severed {
            return Some(Err(Error::internal(
                "the fetcher stopped before the next page was attached",
            )));
        }
        if let Some(demand) = self.demand.take() {
            // A closed receiver means the continuation is going away and
            // will mark the chain severed.
            let _ = demand.send(());
        }
        None
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    resolved: Condvar,
    changed: Notify,
    liveness: Duration,
}

impl Shared {
    fn new(liveness: Duration, demand: oneshot::Sender<()>) -> Self {
        Self {
            state: Mutex::new(State {
                demand: Some(demand),
                ..State::default()
            }),
            resolved: Condvar::new(),
            changed: Notify::new(),
            liveness,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the lock and wake every blocked and awaiting reader.
    fn publish(&self, state: MutexGuard<'_, State>) {
        drop(state);
        self.resolved.notify_all();
        self.changed.notify_waiters();
    }

    fn resolve(&self, resolution: Result<Page>) {
        let mut state = self.lock();
        debug_assert!(state.resolution.is_none(), "page resolved twice");
        state.resolution = Some(resolution);
        self.publish(state);
    }

    fn wait_until<T>(&self, mut ready: impl FnMut(&mut State) -> Option<T>) -> T {
        let mut state = self.lock();
        loop {
            if let Some(value) = ready(&mut state) {
                return value;
            }
            let (guard, timeout) = self
                .resolved
                .wait_timeout(state, self.liveness)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if timeout.timed_out() {
                tracing::trace!(liveness = ?self.liveness, "still waiting on page");
            }
        }
    }

    async fn wait_until_async<T>(&self, mut ready: impl FnMut(&mut State) -> Option<T>) -> T {
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();
            let value = {
                let mut state = self.lock();
                ready(&mut state)
            };
            if let Some(value) = value {
                return value;
            }
            notified.await;
        }
    }
}

fn resolution(state: &mut State) -> Option<Result<Page>> {
    state.resolution.clone()
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Reader handle on one page of an operation.
///
/// Cheap to clone; every clone observes the same single resolution.
#[derive(Debug, Clone)]
pub struct PendingResponse {
    shared: Arc<Shared>,
}

impl PendingResponse {
    /// Create an unresolved page and its writer.
    #[must_use]
    pub fn channel() -> (PageWriter, Self) {
        Self::channel_with_liveness(DEFAULT_LIVENESS_INTERVAL)
    }

    /// Like [`PendingResponse::channel`] with a custom liveness interval for
    /// blocked readers. Successor pages inherit the interval.
    #[must_use]
    pub fn channel_with_liveness(liveness: Duration) -> (PageWriter, Self) {
        let (demand_tx, demand_rx) = oneshot::channel();
        let shared = Arc::new(Shared::new(liveness, demand_tx));
        let writer = PageWriter {
            shared: Some(Arc::clone(&shared)),
            demand: Some(demand_rx),
        };
        (writer, Self { shared })
    }

    /// A page that is already resolved with `error`.
    #[must_use]
    pub fn failed(error: Error) -> Self {
        let (writer, pending) = Self::channel();
        writer.resolve_error(error);
        pending
    }

    /// Non-blocking: has the page resolved yet?
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.shared.lock().resolution.is_some()
    }

    /// Block until the page resolves and return it.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn wait(&self) -> Result<Page> {
        self.shared.wait_until(resolution)
    }

    /// HTTP status of the page.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn status(&self) -> Result<u16> {
        self.wait().map(|page| page.status())
    }

    /// Body of the page.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn payload(&self) -> Result<Payload> {
        self.wait().map(Page::into_payload)
    }

    /// Which kind of body the page carries.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn response_type(&self) -> Result<ResponseType> {
        self.wait().map(|page| page.response_type())
    }

    /// The XML document, if the page carries one.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn xml(&self) -> Result<Option<Arc<XmlDocument>>> {
        self.payload().map(|payload| payload.xml().cloned())
    }

    /// The JSON value, if the page carries one.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn json(&self) -> Result<Option<Arc<serde_json::Value>>> {
        self.payload().map(|payload| payload.json().cloned())
    }

    /// The raw body, if the page carries one.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn data(&self) -> Result<Option<Bytes>> {
        self.payload().map(|payload| payload.data().cloned())
    }

    /// Block until the page resolves and return its error, if any.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.wait().err()
    }

    /// Whether the whole operation ends with this page.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn is_done(&self) -> Result<bool> {
        self.wait().map(|page| page.is_complete())
    }

    /// Whether the page is the not-found sentinel.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub fn is_not_found(&self) -> Result<bool> {
        self.wait().map(|page| page.is_not_found())
    }

    /// Block until the successor page is known.
    ///
    /// Returns `Ok(None)` when the operation ends with this page. Otherwise
    /// asks the fetcher for the next page and returns its handle once
    /// attached; the handle itself may still be unresolved.
    ///
    /// # Errors
    ///
    /// Returns the error this page resolved with, or an internal error if the
    /// fetcher stopped without attaching a successor.
    pub fn next(&self) -> Result<Option<Self>> {
        self.shared.wait_until(State::successor)
    }

    /// Await the page's resolution.
    ///
    /// # Errors
    ///
    /// Returns the error the page resolved with.
    pub async fn resolved(&self) -> Result<Page> {
        self.shared.wait_until_async(resolution).await
    }

    /// Await the successor page, see [`PendingResponse::next`].
    ///
    /// # Errors
    ///
    /// Returns the error this page resolved with, or an internal error if the
    /// fetcher stopped without attaching a successor.
    pub async fn next_page(&self) -> Result<Option<Self>> {
        self.shared.wait_until_async(State::successor).await
    }

    /// Blocking iterator over this page and every page after it.
    ///
    /// The successor of a page is only requested when the iterator is
    /// advanced past it. Iteration ends after the first error.
    #[must_use]
    pub fn pages(self) -> Pages {
        Pages {
            cursor: Cursor::Start(self),
        }
    }

    /// Await every page of the operation, in order.
    ///
    /// # Errors
    ///
    /// Returns the first error any page resolved with.
    pub async fn collect_pages(self) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        let mut cursor = Cursor::Start(self);
        while let Some(page) = cursor.advance_async().await {
            pages.push(page?);
        }
        Ok(pages)
    }

    /// Block until every page resolves and concatenate the records `map`
    /// extracts from each. The not-found sentinel contributes no records.
    ///
    /// # Errors
    ///
    /// Returns the first page error, or the first error from `map`.
    pub fn collect_records<T, F>(self, mut map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Page) -> Result<Vec<T>>,
    {
        let mut records = Vec::new();
        for page in self.pages() {
            let page = page?;
            if !page.is_not_found() {
                records.extend(map(&page)?);
            }
        }
        Ok(records)
    }

    /// Async counterpart of [`PendingResponse::collect_records`].
    ///
    /// # Errors
    ///
    /// Returns the first page error, or the first error from `map`.
    pub async fn collect_records_async<T, F>(self, mut map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Page) -> Result<Vec<T>>,
    {
        let mut records = Vec::new();
        let mut cursor = Cursor::Start(self);
        while let Some(page) = cursor.advance_async().await {
            let page = page?;
            if !page.is_not_found() {
                records.extend(map(&page)?);
            }
        }
        Ok(records)
    }

    /// Stream of this page and every page after it. Ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> + Send {
        futures_util::stream::unfold(Cursor::Start(self), |mut cursor| async move {
            let page = cursor.advance_async().await?;
            Some((page, cursor))
        })
    }
}

// ============================================================================
// Writer side
// ============================================================================

/// Sole writer of one page. Every resolution consumes it.
///
/// Dropping a writer without resolving resolves the page with an internal
/// error, so readers never park on a page nobody will write.
#[derive(Debug)]
#[must_use = "dropping a PageWriter resolves its page with an error"]
pub struct PageWriter {
    shared: Option<Arc<Shared>>,
    demand: Option<oneshot::Receiver<()>>,
}

impl PageWriter {
    /// Resolve with the last page of the operation.
    pub fn resolve_success(mut self, status: u16, payload: Payload) {
        self.finish(Ok(Page::new(status, payload, true)));
    }

    /// Resolve with a page that has successors.
    ///
    /// The returned [`Continuation`] yields the next page's writer once a
    /// reader asks for it.
    pub fn resolve_partial(mut self, status: u16, payload: Payload) -> Continuation {
        let liveness = self
            .shared
            .as_ref()
            .map_or(DEFAULT_LIVENESS_INTERVAL, |shared| shared.liveness);
        let predecessor = self.shared.as_ref().map_or_else(Weak::new, Arc::downgrade);
        let demand = self.demand.take();
        self.finish(Ok(Page::new(status, payload, false)));
        Continuation {
            predecessor,
            demand,
            liveness,
            attached: false,
        }
    }

    /// Resolve with the not-found sentinel. The operation ends here.
    pub fn resolve_not_found(mut self) {
        self.finish(Ok(Page::not_found()));
    }

    /// Resolve with a terminal error.
    pub fn resolve_error(mut self, error: Error) {
        self.finish(Err(error));
    }

    fn finish(&mut self, resolution: Result<Page>) {
        if let Some(shared) = self.shared.take() {
            shared.resolve(resolution);
        }
    }
}

impl Drop for PageWriter {
    fn drop(&mut self) {
        if self.shared.is_some() {
            tracing::warn!("page writer dropped without resolving");
            self.finish(Err(Error::internal(
                "the page was abandoned before it was resolved",
            )));
        }
    }
}

/// Pending right to write the successor of a partial page.
#[derive(Debug)]
#[must_use = "dropping a Continuation ends the chain"]
pub struct Continuation {
    predecessor: Weak<Shared>,
    demand: Option<oneshot::Receiver<()>>,
    liveness: Duration,
    attached: bool,
}

impl Continuation {
    /// Wait for a reader to ask for the next page, then attach it.
    ///
    /// Returns `None` once every reader handle on the chain is gone; there
    /// is nobody left to fetch for.
    pub async fn requested(mut self) -> Option<PageWriter> {
        let demand = self.demand.take()?;
        demand.await.ok()?;
        let predecessor = self.predecessor.upgrade()?;

        let (writer, pending) = PendingResponse::channel_with_liveness(self.liveness);
        let mut state = predecessor.lock();
        state.next = Some(pending);
        self.attached = true;
        predecessor.publish(state);
        Some(writer)
    }
}

impl Drop for Continuation {
    fn drop(&mut self) {
        if self.attached {
            return;
        }
        if let Some(predecessor) = self.predecessor.upgrade() {
            let mut state = predecessor.lock();
            state.severed = true;
            predecessor.publish(state);
        }
    }
}

// ============================================================================
// Draining
// ============================================================================

#[derive(Debug)]
enum Cursor {
    Start(PendingResponse),
    After(PendingResponse),
    Done,
}

impl Cursor {
    fn settle(&mut self, current: PendingResponse, page: Result<Page>) -> Result<Page> {
        if let Ok(page) = &page
            && !page.is_complete()
        {
            *self = Self::After(current);
        }
        page
    }

    fn advance(&mut self) -> Option<Result<Page>> {
        let current = match std::mem::replace(self, Self::Done) {
            Self::Start(current) => current,
            Self::After(previous) => match previous.next() {
                Ok(next) => next?,
                Err(error) => return Some(Err(error)),
            },
            Self::Done => return None,
        };
        let page = current.wait();
        Some(self.settle(current, page))
    }

    fn advance_async(&mut self) -> impl Future<Output = Option<Result<Page>>> + Send + '_ {
        async move {
            let current = match std::mem::replace(self, Self::Done) {
                Self::Start(current) => current,
                Self::After(previous) => match previous.next_page().await {
                    Ok(next) => next?,
                    Err(error) => return Some(Err(error)),
                },
                Self::Done => return None,
            };
            let page = current.resolved().await;
            Some(self.settle(current, page))
        }
    }
}

/// Blocking iterator over the pages of an operation.
///
/// Created by [`PendingResponse::pages`].
#[derive(Debug)]
pub struct Pages {
    cursor: Cursor,
}

impl Iterator for Pages {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.advance()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use assert2::{check, let_assert};
    use futures_util::StreamExt;

    use super::*;
    use crate::ErrorCategory;

    fn xml_payload(text: &str) -> Payload {
        Payload::Xml(Arc::new(XmlDocument::parse(text).expect("parse")))
    }

    #[test]
    fn waiters_parked_before_resolution_all_wake() {
        let (writer, pending) = PendingResponse::channel();
        let barrier = Arc::new(Barrier::new(4));

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let pending = pending.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (pending.status(), pending.is_done(), pending.error())
                })
            })
            .collect();

        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        check!(!pending.is_resolved());
        writer.resolve_success(200, xml_payload("<archives/>"));

        for reader in readers {
            let (status, done, error) = reader.join().expect("reader thread");
            check!(status.expect("status") == 200);
            check!(done.expect("done"));
            check!(error.is_none());
        }
    }

    #[test]
    fn error_is_reraised_by_every_accessor() {
        let (writer, pending) = PendingResponse::channel();
        let reader = {
            let pending = pending.clone();
            thread::spawn(move || pending.payload())
        };
        writer.resolve_error(Error::api(ErrorCategory::General, 500, "E42", "disk full"));

        let_assert!(Err(error) = reader.join().expect("reader thread"));
        check!(error.reason() == Some("E42"));
        check!(pending.status().is_err());
        check!(pending.is_done().is_err());
        check!(pending.next().is_err());
        let_assert!(Some(Error::Api { message, .. }) = pending.error());
        check!(message == "disk full");
    }

    #[test]
    fn not_found_sentinel_is_done_without_error() {
        let (writer, pending) = PendingResponse::channel();
        writer.resolve_not_found();

        check!(pending.status().expect("status") == 404);
        check!(pending.is_done().expect("done"));
        check!(pending.is_not_found().expect("not found"));
        check!(pending.error().is_none());
        check!(pending.response_type().expect("type") == ResponseType::None);
        check!(pending.next().expect("next").is_none());
    }

    #[test]
    fn short_liveness_interval_keeps_waiting() {
        let (writer, pending) = PendingResponse::channel_with_liveness(Duration::from_millis(5));
        let reader = thread::spawn(move || pending.data());

        thread::sleep(Duration::from_millis(40));
        writer.resolve_success(200, Payload::Raw(Bytes::from_static(b"raw")));

        let data = reader.join().expect("reader thread").expect("data");
        check!(data == Some(Bytes::from_static(b"raw")));
    }

    #[test]
    fn dropped_writer_resolves_with_internal_error() {
        let (writer, pending) = PendingResponse::channel();
        drop(writer);

        let_assert!(Some(Error::Internal(_)) = pending.error());
    }

    #[test]
    fn failed_page_is_resolved_immediately() {
        let pending = PendingResponse::failed(Error::connection("refused"));

        check!(pending.is_resolved());
        check!(pending.error().is_some_and(|e| e.is_connection()));
    }

    #[tokio::test]
    async fn continuation_waits_for_demand() {
        let (writer, first) = PendingResponse::channel();
        let continuation = writer.resolve_partial(200, xml_payload("<page n='1'/>"));

        let fetcher = tokio::spawn(async move {
            let writer = continuation.requested().await?;
            writer.resolve_success(200, xml_payload("<page n='2'/>"));
            Some(())
        });

        tokio::task::yield_now().await;
        check!(!fetcher.is_finished());
        check!(!first.is_done().expect("done"));

        let_assert!(Ok(Some(second)) = first.next_page().await);
        let page = second.resolved().await.expect("page 2");
        check!(page.xml().and_then(|doc| doc.root().attribute("n")) == Some("2"));
        check!(second.next_page().await.expect("next").is_none());
        check!(fetcher.await.expect("join").is_some());
    }

    #[tokio::test]
    async fn next_returns_the_same_successor_to_every_reader() {
        let (writer, first) = PendingResponse::channel();
        let continuation = writer.resolve_partial(200, Payload::None);
        tokio::spawn(async move {
            if let Some(writer) = continuation.requested().await {
                writer.resolve_success(200, Payload::None);
            }
        });

        let blocking = {
            let first = first.clone();
            tokio::task::spawn_blocking(move || first.next())
        };
        let_assert!(Ok(Some(a)) = first.next_page().await);
        let_assert!(Ok(Some(b)) = blocking.await.expect("join"));
        check!(Arc::ptr_eq(&a.shared, &b.shared));
    }

    #[tokio::test]
    async fn dropping_every_reader_stops_the_chain() {
        let (writer, first) = PendingResponse::channel();
        let continuation = writer.resolve_partial(200, Payload::None);
        drop(first);

        check!(continuation.requested().await.is_none());
    }

    #[tokio::test]
    async fn dropped_continuation_fails_next() {
        let (writer, first) = PendingResponse::channel();
        let continuation = writer.resolve_partial(200, Payload::None);
        drop(continuation);

        let_assert!(Err(Error::Internal(_)) = first.next_page().await);
    }

    #[tokio::test]
    async fn collect_pages_follows_the_chain() {
        let (writer, first) = PendingResponse::channel();
        tokio::spawn(async move {
            let mut writer = writer;
            for n in 1..3 {
                let payload = xml_payload(&format!("<page n='{n}'/>"));
                let Some(next) = writer.resolve_partial(200, payload).requested().await else {
                    return;
                };
                writer = next;
            }
            writer.resolve_success(200, xml_payload("<page n='3'/>"));
        });

        let pages = first.collect_pages().await.expect("pages");
        let numbers: Vec<_> = pages
            .iter()
            .filter_map(|page| page.xml()?.root().attribute("n").map(str::to_string))
            .collect();
        check!(numbers == ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn stream_ends_after_the_first_error() {
        let (writer, first) = PendingResponse::channel();
        tokio::spawn(async move {
            if let Some(writer) = writer.resolve_partial(200, Payload::None).requested().await {
                writer.resolve_error(Error::api(ErrorCategory::General, 500, "E1", ""));
            }
        });

        let results: Vec<_> = first.into_stream().collect().await;
        check!(results.len() == 2);
        check!(results.first().is_some_and(Result::is_ok));
        check!(results.get(1).is_some_and(Result::is_err));
    }

    #[tokio::test]
    async fn blocking_records_skip_not_found() {
        let (writer, first) = PendingResponse::channel();
        writer.resolve_not_found();

        let records = tokio::task::spawn_blocking(move || {
            first.collect_records(|_| Ok(vec!["unreachable"]))
        })
        .await
        .expect("join")
        .expect("records");
        check!(records.is_empty());
    }

    #[tokio::test]
    async fn records_concatenate_across_pages() {
        let (writer, first) = PendingResponse::channel();
        tokio::spawn(async move {
            let continuation =
                writer.resolve_partial(200, xml_payload("<list><a/><a/></list>"));
            if let Some(writer) = continuation.requested().await {
                writer.resolve_success(200, xml_payload("<list><a/></list>"));
            }
        });

        let records = first
            .collect_records_async(|page| {
                Ok(page
                    .xml()
                    .map(|doc| doc.elements_by_tag_name("a").count())
                    .into_iter()
                    .collect())
            })
            .await
            .expect("records");
        check!(records == [2, 1]);
    }
}
