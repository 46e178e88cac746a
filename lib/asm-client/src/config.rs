//! Client configuration types.

use std::collections::HashMap;
use std::time::Duration;

use crate::{Error, Result};

/// Property naming the forward proxy host.
pub const PROXY_HOST_PROPERTY: &str = "proxyHost";
/// Property naming the forward proxy port.
pub const PROXY_PORT_PROPERTY: &str = "proxyPort";

const DEFAULT_PROXY_PORT: u16 = 80;

/// Forward proxy every connection is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl ProxyConfig {
    /// Create a proxy configuration.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Proxy address as an `http://host:port` URI.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the host does not form a valid URI.
    pub fn uri(&self) -> Result<http::Uri> {
        format!("http://{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::configuration(format!("invalid proxy address: {e}")))
    }
}

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout duration (connect through last body byte).
    pub timeout: Duration,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Optional forward proxy.
    pub proxy: Option<ProxyConfig>,
    /// How long a session token is reused before re-authenticating.
    pub session_ttl: Duration,
    /// How often a reader blocked on a page wakes up to re-check it.
    pub liveness_interval: Duration,
    /// Check that request XML is well formed before sending it.
    pub validate_request_xml: bool,
    /// Treat a page that carries a pagination id but no last-page marker as
    /// the last page. When unset such a chain keeps fetching.
    pub assume_last_page_when_unmarked: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: concat!("asm-client/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy: None,
            session_ttl: Duration::from_secs(50 * 60),
            liveness_interval: asm_core::pending::DEFAULT_LIVENESS_INTERVAL,
            validate_request_xml: false,
            assume_last_page_when_unmarked: false,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Defaults, with the proxy read from `proxyHost` / `proxyPort`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `proxyPort` is not a port number.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        Ok(Self::builder().properties(properties)?.build())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
    user_agent: Option<String>,
    proxy: Option<ProxyConfig>,
    session_ttl: Option<Duration>,
    liveness_interval: Option<Duration>,
    validate_request_xml: Option<bool>,
    assume_last_page_when_unmarked: Option<bool>,
}

impl ClientConfigBuilder {
    /// Set the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the `User-Agent` header.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Route connections through a forward proxy.
    #[must_use]
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set how long session tokens are reused.
    #[must_use]
    pub const fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    /// Set how often blocked readers re-check a page.
    #[must_use]
    pub const fn liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = Some(interval);
        self
    }

    /// Enable or disable request XML validation.
    #[must_use]
    pub const fn validate_request_xml(mut self, validate: bool) -> Self {
        self.validate_request_xml = Some(validate);
        self
    }

    /// Choose how an unmarked paginated page is treated.
    #[must_use]
    pub const fn assume_last_page_when_unmarked(mut self, assume: bool) -> Self {
        self.assume_last_page_when_unmarked = Some(assume);
        self
    }

    /// Apply the recognised provider properties.
    ///
    /// A `proxyHost` without `proxyPort` uses port 80.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `proxyPort` is not a port number.
    pub fn properties(mut self, properties: &HashMap<String, String>) -> Result<Self> {
        let host = properties
            .get(PROXY_HOST_PROPERTY)
            .map(|host| host.trim())
            .filter(|host| !host.is_empty());
        if let Some(host) = host {
            let port = match properties.get(PROXY_PORT_PROPERTY).map(|port| port.trim()) {
                None | Some("") => DEFAULT_PROXY_PORT,
                Some(port) => port.parse().map_err(|_| {
                    Error::configuration(format!("invalid {PROXY_PORT_PROPERTY}: {port:?}"))
                })?,
            };
            self.proxy = Some(ProxyConfig::new(host, port));
        }
        Ok(self)
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            proxy: self.proxy.or(defaults.proxy),
            session_ttl: self.session_ttl.unwrap_or(defaults.session_ttl),
            liveness_interval: self.liveness_interval.unwrap_or(defaults.liveness_interval),
            validate_request_xml: self
                .validate_request_xml
                .unwrap_or(defaults.validate_request_xml),
            assume_last_page_when_unmarked: self
                .assume_last_page_when_unmarked
                .unwrap_or(defaults.assume_last_page_when_unmarked),
        }
    }
}
