//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions
//! for easy glob importing:
//!
//! ```ignore
//! use asm_core::prelude::*;
//! ```

pub use crate::{
    ContentType, Error, ErrorCategory, HttpClient, Method, Page, Payload, PendingResponse,
    Request, RequestBuilder, Response, ResponseType, Result, XmlDocument, XmlElement, classify,
};
