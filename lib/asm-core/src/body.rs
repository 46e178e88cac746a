//! Body content types and decoding.

use std::sync::Arc;

use bytes::Bytes;

use crate::{Error, Payload, Result, XmlDocument};

/// Content type for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// XML content type (`application/xml`).
    Xml,
    /// JSON content type (`application/json`).
    Json,
    /// Plain text content type (`text/plain`).
    PlainText,
    /// Binary content type (`application/octet-stream`).
    OctetStream,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
        }
    }

    /// MIME type with an explicit UTF-8 charset, as sent on text bodies.
    #[must_use]
    pub fn with_utf8(&self) -> String {
        format!("{};charset=utf-8", self.as_str())
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of body carried by a resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// Parsed XML document.
    Xml,
    /// Parsed JSON value.
    Json,
    /// Raw bytes in an unrecognised content type.
    Raw,
    /// No body.
    None,
}

impl ResponseType {
    /// How a response body with the given `Content-Type` is decoded.
    ///
    /// Untyped bodies are treated as XML, the API's native format.
    #[must_use]
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Xml;
        };
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("json") {
            Self::Json
        } else if content_type.contains("xml") {
            Self::Xml
        } else {
            Self::Raw
        }
    }
}

/// Decode a success body according to its `Content-Type`.
///
/// # Errors
///
/// Returns an error if an XML or JSON typed body does not parse.
pub fn decode_payload(content_type: Option<&str>, body: &Bytes) -> Result<Payload> {
    match ResponseType::for_content_type(content_type) {
        ResponseType::Xml => Ok(Payload::Xml(Arc::new(XmlDocument::parse_bytes(body)?))),
        ResponseType::Json => Ok(Payload::Json(Arc::new(from_json(body)?))),
        ResponseType::Raw => Ok(Payload::Raw(body.clone())),
        ResponseType::None => Ok(Payload::None),
    }
}

/// Deserialize JSON bytes to a value.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails.
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::json(e.to_string()))
}
