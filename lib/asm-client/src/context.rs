//! Provider context: who is calling which endpoint.

use std::collections::HashMap;

use url::Url;

use crate::{Error, Result};

/// Endpoint, account and credentials for one cloud account.
#[derive(Clone)]
pub struct ProviderContext {
    endpoint: Url,
    account: String,
    username: String,
    password: String,
    region: Option<String>,
    properties: HashMap<String, String>,
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("endpoint", &self.endpoint.as_str())
            .field("account", &self.account)
            .field("username", &self.username)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl ProviderContext {
    /// Create a context.
    ///
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not an absolute `http`/`https` URL.
    pub fn new(
        endpoint: &str,
        account: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "endpoint must be an http(s) URL: {endpoint}"
            )));
        }
        Ok(Self {
            endpoint,
            account: account.into(),
            username: username.into(),
            password: password.into(),
            region: None,
            properties: HashMap::new(),
        })
    }

    /// Set the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Add a custom property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// API endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Account number.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Access user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Access password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Region, if one was selected.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Custom properties.
    #[must_use]
    pub const fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Key under which this context's session is cached.
    #[must_use]
    pub fn key(&self) -> ContextKey {
        ContextKey {
            account: self.account.clone(),
            endpoint: self.endpoint.as_str().trim_end_matches('/').to_string(),
        }
    }

    /// `<endpoint>/<resource>[/<id>]`, with trailing slashes on the endpoint
    /// and stray slashes around the resource removed.
    ///
    /// The resource is split into path segments on `/`; the id is always a
    /// single segment, percent-encoded as needed. A query on the endpoint is
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint cannot carry a path.
    pub fn resource_url(&self, resource: &str, id: Option<&str>) -> Result<Url> {
        let mut target = self.endpoint.clone();
        let base = target.path().trim_end_matches('/').to_string();
        target.set_path(&base);
        {
            let mut segments = target
                .path_segments_mut()
                .map_err(|()| Error::configuration("endpoint cannot carry a path"))?;
            segments.pop_if_empty();
            segments.extend(resource.split('/').filter(|segment| !segment.is_empty()));
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(target)
    }
}

/// Identity of a session: one account on one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    account: String,
    endpoint: String,
}

impl ContextKey {
    /// Account number.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Endpoint, without trailing slashes.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
