//! Resolved pages.

use std::sync::Arc;

use bytes::Bytes;

use crate::{ResponseType, Result, XmlDocument};

/// Body of a resolved page.
///
/// Documents are reference counted so every waiter on a page shares one parse.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// Parsed XML document.
    Xml(Arc<XmlDocument>),
    /// Parsed JSON value.
    Json(Arc<serde_json::Value>),
    /// Raw bytes of a body in any other content type.
    Raw(Bytes),
    /// No body.
    #[default]
    None,
}

impl Payload {
    /// Which variant this payload is.
    #[must_use]
    pub const fn response_type(&self) -> ResponseType {
        match self {
            Self::Xml(_) => ResponseType::Xml,
            Self::Json(_) => ResponseType::Json,
            Self::Raw(_) => ResponseType::Raw,
            Self::None => ResponseType::None,
        }
    }

    /// The XML document, if this is an XML payload.
    #[must_use]
    pub fn xml(&self) -> Option<&Arc<XmlDocument>> {
        match self {
            Self::Xml(document) => Some(document),
            _ => None,
        }
    }

    /// The JSON value, if this is a JSON payload.
    #[must_use]
    pub fn json(&self) -> Option<&Arc<serde_json::Value>> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The raw bytes, if this is a raw payload.
    #[must_use]
    pub const fn data(&self) -> Option<&Bytes> {
        match self {
            Self::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// One resolved page of an operation.
#[derive(Debug, Clone)]
pub struct Page {
    status: u16,
    payload: Payload,
    complete: bool,
}

impl Page {
    /// Creates a page.
    ///
    /// `complete` is `true` when no further page follows this one.
    #[must_use]
    pub const fn new(status: u16, payload: Payload, complete: bool) -> Self {
        Self {
            status,
            payload,
            complete,
        }
    }

    /// The not-found sentinel: status 404, no payload, last page.
    #[must_use]
    pub const fn not_found() -> Self {
        Self::new(404, Payload::None, true)
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Page body.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume into the body.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// No page follows this one.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    /// This is the not-found sentinel.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status == 404 && matches!(self.payload, Payload::None)
    }

    /// Which kind of body this page carries.
    #[must_use]
    pub const fn response_type(&self) -> ResponseType {
        self.payload.response_type()
    }

    /// The XML document, if any.
    #[must_use]
    pub fn xml(&self) -> Option<&XmlDocument> {
        self.payload.xml().map(AsRef::as_ref)
    }

    /// Deserialize a JSON page into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the page is not JSON or does not match `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .payload
            .json()
            .ok_or_else(|| crate::Error::json("page does not carry a JSON body"))?;
        T::deserialize(value.as_ref()).map_err(|e| crate::Error::json(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_sentinel() {
        let page = Page::not_found();

        assert!(page.is_not_found());
        assert!(page.is_complete());
        assert_eq!(page.response_type(), ResponseType::None);
        assert!(page.xml().is_none());
    }

    #[test]
    fn json_page_deserializes() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Region {
            id: String,
        }

        let value = serde_json::json!({ "id": "r-1" });
        let page = Page::new(200, Payload::Json(Arc::new(value)), true);

        assert_eq!(
            page.json::<Region>().expect("json"),
            Region {
                id: "r-1".to_string()
            }
        );
    }

    #[test]
    fn json_on_xml_page_fails() {
        let document = XmlDocument::parse("<drl/>").expect("parse");
        let page = Page::new(200, Payload::Xml(Arc::new(document)), false);

        assert!(page.json::<serde_json::Value>().is_err());
        assert!(!page.is_complete());
    }
}
