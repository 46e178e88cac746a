//! Session tokens, cached per account.
//!
//! Every API call carries a connection id obtained by authenticating against
//! the XML API. Ids are reused for [`DEFAULT_SESSION_TTL`] and then renewed.
//! Population is serialized per [`ContextKey`]: concurrent callers for the
//! same account wait for one authentication exchange and share its result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::{
    ApiHandler, ClientConfig, ContextKey, Error, HttpClient, ProviderContext, Result, XmlDocument,
    XmlElement,
};

/// How long a connection id is reused.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(50 * 60);

/// Operation name of the authentication call.
pub const OPEN_CONNECTION: &str = "openconnection";

/// DTD path, relative to the endpoint, declared by authentication requests.
const OPEN_CONNECTION_DTD: &str = "labmagic/v1_2/api/connection/openConnectionRequest.dtd";

/// Obtains a fresh session token for a context.
pub trait Authenticator: Send + Sync {
    /// Run one authentication exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if no token could be obtained.
    fn authenticate(&self, context: &ProviderContext)
    -> impl Future<Output = Result<String>> + Send;
}

impl<A: Authenticator> Authenticator for Arc<A> {
    fn authenticate(
        &self,
        context: &ProviderContext,
    ) -> impl Future<Output = Result<String>> + Send {
        A::authenticate(self, context)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    acquired: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedToken>>>;

/// Per-account cache of session tokens.
#[derive(Debug)]
pub struct SessionCache<A> {
    authenticator: A,
    ttl: Duration,
    slots: Mutex<HashMap<ContextKey, Slot>>,
}

impl<A: Authenticator> SessionCache<A> {
    /// Create a cache using [`DEFAULT_SESSION_TTL`].
    pub fn new(authenticator: A) -> Self {
        Self::with_ttl(authenticator, DEFAULT_SESSION_TTL)
    }

    /// Create a cache with a custom token lifetime.
    pub fn with_ttl(authenticator: A, ttl: Duration) -> Self {
        Self {
            authenticator,
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, key: ContextKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// A valid token for `context`, authenticating when none is cached or the
    /// cached one has expired.
    ///
    /// # Errors
    ///
    /// Returns an authentication-class error if authentication fails. Failures
    /// are not cached and not retried.
    pub async fn token(&self, context: &ProviderContext) -> Result<String> {
        let slot = self.slot(context.key());
        let mut cached = slot.lock().await;

        if let Some(entry) = cached.as_ref()
            && entry.acquired.elapsed() < self.ttl
        {
            return Ok(entry.token.clone());
        }

        tracing::debug!(account = context.account(), "authenticating");
        *cached = None;
        let token = self
            .authenticator
            .authenticate(context)
            .await
            .map_err(as_authentication)?;
        *cached = Some(CachedToken {
            token: token.clone(),
            acquired: Instant::now(),
        });
        Ok(token)
    }

    /// Forget the cached token for `context`; the next call authenticates.
    pub async fn invalidate(&self, context: &ProviderContext) {
        let slot = self.slot(context.key());
        *slot.lock().await = None;
    }
}

/// Report any authentication failure as authentication-class.
fn as_authentication(error: Error) -> Error {
    if error.is_authentication() {
        return error;
    }
    let status = error.status().unwrap_or(401);
    let reason = error.reason().unwrap_or("NoAuth").to_string();
    Error::authentication(status, reason, error.to_string())
}

/// Authenticates with an `openconnection` call to the XML API.
#[derive(Debug, Clone)]
pub struct XmlApiAuthenticator<C> {
    client: C,
    config: ClientConfig,
}

impl<C: HttpClient + Clone> XmlApiAuthenticator<C> {
    /// Create an authenticator posting through `client`.
    pub fn new(client: C, config: ClientConfig) -> Self {
        Self { client, config }
    }

    /// The `openconnection` request document for `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the DTD location cannot be derived from the endpoint.
    pub fn request_document(context: &ProviderContext) -> Result<XmlDocument> {
        let dtd = context.resource_url(OPEN_CONNECTION_DTD, None)?;
        let root = XmlElement::new("drl").with_attribute("mode", "normal").with_child(
            XmlElement::new(OPEN_CONNECTION)
                .with_attribute("username", context.username())
                .with_attribute("password", context.password()),
        );
        Ok(XmlDocument::new(root).with_doctype(dtd.as_str()))
    }
}

impl<C: HttpClient + Clone> Authenticator for XmlApiAuthenticator<C> {
    async fn authenticate(&self, context: &ProviderContext) -> Result<String> {
        let api = ApiHandler::new(
            self.client.clone(),
            Arc::new(context.clone()),
            &self.config,
        );
        let page = api
            .post(OPEN_CONNECTION, &Self::request_document(context)?)
            .await?;

        let Some(document) = page.xml() else {
            return Err(Error::authentication(
                page.status(),
                "NoAuth",
                "No authentication in response",
            ));
        };

        let mut roots = document.elements_by_tag_name("drl");
        if let (Some(drl), None) = (roots.next(), roots.next())
            && let Some(id) = drl.attribute("connectionid")
        {
            return Ok(id.trim().to_string());
        }

        Err(Error::authentication(
            page.status(),
            page.status().to_string(),
            "no connection id in response",
        ))
    }
}
