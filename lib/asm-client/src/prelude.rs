//! Prelude module for convenient imports.
//!
//! ```ignore
//! use asm_client::prelude::*;
//! ```

pub use crate::{
    AsmProvider, ClientConfig, Error, ErrorCategory, HttpClient, HyperClient, NO_PARAMS, Page,
    Payload, PendingResponse, ProviderContext, ProxyConfig, RestMethod, Result, SessionCache,
    XmlDocument, XmlElement,
};
