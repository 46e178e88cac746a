//! Client for the ASM infrastructure API.
//!
//! Listing operations return a [`PendingResponse`] immediately and fetch on a
//! background task; callers read pages with blocking accessors (or await
//! them) and walk the chain of continuation pages with
//! [`PendingResponse::next`]. Sessions are obtained from the XML API and
//! cached per account.
//!
//! # Example
//!
//! ```ignore
//! use asm_client::prelude::*;
//!
//! let context = ProviderContext::new("https://asm.example.com", "1234", "admin", "secret")?;
//! let provider = AsmProvider::from_context(context)?;
//!
//! let names = provider
//!     .rest()
//!     .get("listArchives", "archives", None, NO_PARAMS)
//!     .collect_records_async(|page| {
//!         Ok(page
//!             .xml()
//!             .into_iter()
//!             .flat_map(|doc| doc.elements_by_tag_name("archive"))
//!             .filter_map(|archive| archive.attribute("name").map(str::to_string))
//!             .collect())
//!     })
//!     .await?;
//! ```

mod api;
mod client;
mod config;
mod connector;
mod context;
pub mod middleware;
pub mod prelude;
mod provider;
mod rest;
mod session;

pub use api::{ApiHandler, XML_API_PATH};
pub use client::{BoxedService, HyperClient, HyperClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder, PROXY_HOST_PROPERTY, PROXY_PORT_PROPERTY, ProxyConfig};
pub use context::{ContextKey, ProviderContext};
pub use provider::{AsmProvider, ProviderAuthenticator};
pub use rest::{
    CONNECTION_ID_HEADER, LAST_PAGE_HEADER, NextPage, PAGE_PARAM, PAGINATION_HEADER,
    PAGINATION_ID_PARAM, PaginationCursor, RestMethod, next_page,
};
pub use session::{
    Authenticator, DEFAULT_SESSION_TTL, OPEN_CONNECTION, SessionCache, XmlApiAuthenticator,
};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use asm_core::{
    ContentType, Continuation, Error, ErrorCategory, HttpClient, Method, Page, PageWriter, Pages,
    Payload, PendingResponse, Request, RequestBuilder, Response, ResponseType, Result,
    XmlDocument, XmlElement, XmlNode, classify, decode_payload, default_reason, from_json,
};

// Re-export http types for status codes and headers
pub use asm_core::{StatusCode, header};

/// Empty query parameter list for [`RestMethod::get`].
pub const NO_PARAMS: [(&str, &str); 0] = [];
