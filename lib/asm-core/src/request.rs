//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers, query parameters, and bodies.
//!
//! # Example
//!
//! ```
//! use asm_core::{Request, Method};
//! use bytes::Bytes;
//!
//! let request = Request::<Bytes>::builder(Method::Get, "https://asm.example.com/archives".parse().unwrap())
//!     .header("Accept", "application/xml")
//!     .query("requestPage", "2")
//!     .build();
//! ```

use std::collections::HashMap;

use bytes::Bytes;

use crate::{ContentType, Method, XmlDocument};

/// An HTTP request with method, URL, headers, and optional body.
#[derive(Debug, Clone)]
pub struct Request<B = Bytes> {
    method: Method,
    url: url::Url,
    headers: HashMap<String, String>,
    body: Option<B>,
}

impl<B> Request<B> {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder<B> {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, url::Url, HashMap<String, String>, Option<B>) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder<B = Bytes> {
    method: Method,
    url: url::Url,
    headers: HashMap<String, String>,
    body: Option<B>,
}

impl<B> RequestBuilder<B> {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets multiple headers.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Appends multiple query parameters to the URL.
    ///
    /// An empty iterator leaves the URL untouched (no dangling `?`).
    #[must_use]
    pub fn query_pairs<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs = pairs.into_iter().peekable();
        if pairs.peek().is_some() {
            let mut query = self.url.query_pairs_mut();
            for (name, value) in pairs {
                query.append_pair(name.as_ref(), value.as_ref());
            }
        }
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: B) -> Self {
        self.body = Some(body);
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request<B> {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl RequestBuilder<Bytes> {
    /// Set an XML body from pre-rendered text.
    #[must_use]
    pub fn xml_text(self, xml: impl Into<String>) -> Self {
        self.header("Content-Type", ContentType::Xml.with_utf8())
            .body(Bytes::from(xml.into()))
    }

    /// Set an XML body from a document.
    #[must_use]
    pub fn xml(self, document: &XmlDocument) -> Self {
        self.xml_text(document.to_xml_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XmlElement;

    #[test]
    fn request_builder_basic() {
        let url = url::Url::parse("https://asm.example.com/archives").expect("valid URL");
        let request = Request::<Bytes>::builder(Method::Get, url)
            .header("Accept", "application/xml")
            .build();

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url().as_str(), "https://asm.example.com/archives");
        assert_eq!(request.header("Accept"), Some("application/xml"));
        assert!(request.body().is_none());
    }

    #[test]
    fn request_builder_with_query() {
        let url = url::Url::parse("https://asm.example.com/archives").expect("valid URL");
        let request = Request::<Bytes>::builder(Method::Get, url)
            .query("requestPaginationId", "abc")
            .query("requestPage", "2")
            .build();

        assert_eq!(
            request.url().as_str(),
            "https://asm.example.com/archives?requestPaginationId=abc&requestPage=2"
        );
    }

    #[test]
    fn request_builder_empty_query_pairs() {
        let url = url::Url::parse("https://asm.example.com/archives").expect("valid URL");
        let request = Request::<Bytes>::builder(Method::Get, url)
            .query_pairs(Vec::<(String, String)>::new())
            .build();

        assert_eq!(request.url().as_str(), "https://asm.example.com/archives");
    }

    #[test]
    fn request_builder_xml() {
        let url = url::Url::parse("https://asm.example.com/xmlApiServlet").expect("valid URL");
        let document = XmlDocument::new(XmlElement::new("drl").with_attribute("mode", "normal"));
        let request = Request::builder(Method::Post, url).xml(&document).build();

        assert_eq!(
            request.header("Content-Type"),
            Some("application/xml;charset=utf-8")
        );
        assert_eq!(
            request.body().map(Bytes::as_ref),
            Some(&br#"<?xml version="1.0" encoding="UTF-8"?><drl mode="normal"/>"#[..])
        );
    }
}
