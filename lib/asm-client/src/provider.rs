//! Wiring of transport, sessions and calls for one cloud account.

use std::sync::Arc;

use crate::{
    ApiHandler, ClientConfig, HyperClient, ProviderContext, RestMethod, Result, SessionCache,
    XmlApiAuthenticator,
};

/// Authenticator used by [`AsmProvider`].
pub type ProviderAuthenticator = XmlApiAuthenticator<HyperClient>;

/// REST calls, XML API calls and the session cache of one account, sharing
/// one connection pool.
///
/// # Example
///
/// ```ignore
/// use asm_client::{AsmProvider, ProviderContext};
///
/// let context = ProviderContext::new("https://asm.example.com", "1234", "admin", "secret")?;
/// let provider = AsmProvider::from_context(context)?;
///
/// let archives = provider.rest().get("listArchives", "archives", None, [("state", "open")]);
/// for page in archives.pages() {
///     println!("{:?}", page?.xml());
/// }
/// ```
#[derive(Debug)]
pub struct AsmProvider {
    rest: RestMethod<HyperClient, ProviderAuthenticator>,
    api: ApiHandler<HyperClient>,
    sessions: Arc<SessionCache<ProviderAuthenticator>>,
}

impl AsmProvider {
    /// Wire a provider with an explicit configuration.
    ///
    /// Call from within a tokio runtime so list operations can be scheduled,
    /// or attach one with [`RestMethod::with_runtime`] through
    /// [`AsmProvider::with_runtime`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the proxy address is invalid.
    pub fn new(context: ProviderContext, config: ClientConfig) -> Result<Self> {
        let client = HyperClient::builder()
            .config(&config)
            .with_debug_logging()
            .build()?;
        let context = Arc::new(context);

        let authenticator = XmlApiAuthenticator::new(client.clone(), config.clone());
        let sessions = Arc::new(SessionCache::with_ttl(authenticator, config.session_ttl));
        let api = ApiHandler::new(client.clone(), Arc::clone(&context), &config);
        let rest = RestMethod::new(client, Arc::clone(&sessions), context, config);

        Ok(Self {
            rest,
            api,
            sessions,
        })
    }

    /// Wire a provider configured from the context's properties.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the proxy properties are invalid.
    pub fn from_context(context: ProviderContext) -> Result<Self> {
        let config = ClientConfig::from_properties(context.properties())?;
        Self::new(context, config)
    }

    /// Schedule list operations on `runtime`.
    #[must_use]
    pub fn with_runtime(mut self, runtime: tokio::runtime::Handle) -> Self {
        self.rest = self.rest.with_runtime(runtime);
        self
    }

    /// REST calls.
    #[must_use]
    pub const fn rest(&self) -> &RestMethod<HyperClient, ProviderAuthenticator> {
        &self.rest
    }

    /// XML API calls.
    #[must_use]
    pub const fn api(&self) -> &ApiHandler<HyperClient> {
        &self.api
    }

    /// Session cache shared by every call.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionCache<ProviderAuthenticator>> {
        &self.sessions
    }

    /// Session token for this account.
    ///
    /// # Errors
    ///
    /// Returns an authentication-class error if authentication fails.
    pub async fn connection_id(&self) -> Result<String> {
        self.sessions.token(self.rest.context()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_context_reads_proxy_properties() {
        let context = ProviderContext::new("https://asm.example.com", "1", "admin", "secret")
            .expect("context")
            .with_property("proxyHost", "proxy.internal");

        assert!(AsmProvider::from_context(context).is_ok());
    }

    #[test]
    fn from_context_rejects_bad_proxy_port() {
        let context = ProviderContext::new("https://asm.example.com", "1", "admin", "secret")
            .expect("context")
            .with_property("proxyHost", "proxy.internal")
            .with_property("proxyPort", "not-a-port");

        assert!(AsmProvider::from_context(context).is_err());
    }
}
