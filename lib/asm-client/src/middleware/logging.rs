//! Wire logging middleware.
//!
//! Logs every exchange on the `asm_client::wire` target so wire dumps can be
//! enabled independently of the client's own logging. At [`LogLevel::Info`]
//! only a summary line per request is written; [`LogLevel::Debug`] adds
//! headers, and bodies at `TRACE`.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::{Instrument, Level, span};

use crate::{Error, Request, Response, Result};

/// Target every wire log event is emitted on.
pub const WIRE_TARGET: &str = "asm_client::wire";

/// Header values never written to the wire log.
const REDACTED_HEADERS: &[&str] = &["authorization", "x-asm-connectionid"];

/// Layer that adds wire logging.
///
/// # Example
///
/// ```ignore
/// use asm_client::middleware::LoggingLayer;
/// use asm_client::HyperClient;
///
/// let client = HyperClient::builder()
///     .layer(LoggingLayer::debug())
///     .build()?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    level: LogLevel,
}

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log request/response details.
    Debug,
    /// Log a summary line only.
    #[default]
    Info,
}

impl LoggingLayer {
    /// Create a new logging layer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer that logs at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }

    /// Level this layer logs at.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            level: self.level,
        }
    }
}

/// Service that logs requests and responses.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    level: LogLevel,
}

impl<S> Logging<S> {
    /// Create a new logging service wrapping the given service.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            level: LogLevel::Info,
        }
    }
}

fn redacted<'a>(headers: impl IntoIterator<Item = (&'a String, &'a String)>) -> Vec<(&'a str, &'a str)> {
    let mut headers: Vec<_> = headers
        .into_iter()
        .map(|(name, value)| {
            if REDACTED_HEADERS
                .iter()
                .any(|hidden| name.eq_ignore_ascii_case(hidden))
            {
                (name.as_str(), "<redacted>")
            } else {
                (name.as_str(), value.as_str())
            }
        })
        .collect();
    headers.sort_unstable();
    headers
}

/// Attribute whose value is never written to the wire log.
const SECRET_ATTRIBUTE: &str = "password=";

/// Body as text, with quoted `password` attribute values masked.
fn body_text(body: &[u8]) -> Cow<'_, str> {
    let text = String::from_utf8_lossy(body);
    if !text.contains(SECRET_ATTRIBUTE) {
        return text;
    }

    let mut masked = String::with_capacity(text.len());
    let mut rest: &str = &text;
    while let Some(at) = rest.find(SECRET_ATTRIBUTE) {
        let (head, tail) = rest.split_at(at + SECRET_ATTRIBUTE.len());
        masked.push_str(head);
        let mut chars = tail.chars();
        rest = match chars.next() {
            Some(quote @ ('"' | '\'')) => {
                let value = chars.as_str();
                masked.push(quote);
                masked.push_str("***");
                value.find(quote).and_then(|end| value.get(end..)).unwrap_or_default()
            }
            _ => tail,
        };
    }
    masked.push_str(rest);
    Cow::Owned(masked)
}

impl<S> Service<Request<Bytes>> for Logging<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let method = request.method();
        let url = request.url().to_string();
        let level = self.level;

        let span = span!(target: WIRE_TARGET, Level::DEBUG, "http_request", %method, %url);

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let start = Instant::now();

                match level {
                    LogLevel::Debug => {
                        tracing::debug!(
                            target: WIRE_TARGET,
                            headers = ?redacted(request.headers()),
                            ">> {method} {url}"
                        );
                        if let Some(body) = request.body() {
                            tracing::trace!(target: WIRE_TARGET, body = %body_text(body), ">> body");
                        }
                    }
                    LogLevel::Info => {
                        tracing::info!(target: WIRE_TARGET, "{method} {url}");
                    }
                }

                let result = inner.call(request).await;
                let elapsed = start.elapsed();

                // Saturating conversion to u64 (truncates after ~584 million years)
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        if level == LogLevel::Debug {
                            tracing::debug!(
                                target: WIRE_TARGET,
                                status,
                                elapsed_ms,
                                headers = ?redacted(response.headers()),
                                "<< {status} {}",
                                response.reason()
                            );
                            tracing::trace!(
                                target: WIRE_TARGET,
                                body = %body_text(response.body()),
                                "<< body"
                            );
                        } else if response.is_success() {
                            tracing::info!(target: WIRE_TARGET, status, elapsed_ms, "request completed");
                        } else {
                            tracing::warn!(
                                target: WIRE_TARGET,
                                status,
                                elapsed_ms,
                                "request failed with HTTP error"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::warn!(target: WIRE_TARGET, error = %err, elapsed_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
