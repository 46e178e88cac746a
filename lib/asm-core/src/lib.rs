//! Core types for the asm-client infrastructure API client.
//!
//! This crate provides the foundational types used by `asm-client`:
//! - [`Method`] - HTTP method enum
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`Response`] - HTTP response type
//! - [`Error`], [`ErrorCategory`] and [`Result`] - Error handling
//! - [`classify`] - Turns an error response into a typed [`Error`]
//! - [`HttpClient`] - Transport trait for HTTP execution
//! - [`XmlDocument`] and [`XmlElement`] - Owned XML trees
//! - [`Page`] and [`Payload`] - One resolved page of an operation
//! - [`PendingResponse`] - Blocking/awaitable future over a chain of pages
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)
//! - [`header`] - HTTP header names (re-exported from `http` crate)

mod body;
mod classify;
mod client;
mod error;
mod method;
mod page;
pub mod pending;
pub mod prelude;
mod request;
mod response;
mod xml;

pub use body::{ContentType, ResponseType, decode_payload, from_json};
pub use classify::{classify, default_reason};
pub use client::HttpClient;
pub use error::{Error, ErrorCategory, Result};
pub use method::Method;
pub use page::{Page, Payload};
pub use pending::{Continuation, PageWriter, Pages, PendingResponse};
pub use request::{Request, RequestBuilder};
pub use response::Response;
pub use xml::{Descendants, XmlDocument, XmlElement, XmlNode};

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
