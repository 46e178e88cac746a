//! Calls to the XML API servlet.

use std::sync::Arc;

use bytes::Bytes;
use tracing::Instrument;

use crate::{
    ClientConfig, ContentType, Error, ErrorCategory, HttpClient, Method, Page, Payload,
    ProviderContext, Request, Result, XmlDocument, classify, default_reason,
};

/// Path of the XML API servlet below the endpoint.
pub const XML_API_PATH: &str = "xmlApiServlet";

/// Posts XML API documents and turns the replies into pages.
///
/// The servlet answers `200` even for failed calls and reports the failure in
/// an `error` element, so every reply body is inspected.
#[derive(Debug, Clone)]
pub struct ApiHandler<C> {
    client: C,
    context: Arc<ProviderContext>,
    validate_request_xml: bool,
}

impl<C: HttpClient> ApiHandler<C> {
    /// Create a handler for `context`.
    pub fn new(client: C, context: Arc<ProviderContext>, config: &ClientConfig) -> Self {
        Self {
            client,
            context,
            validate_request_xml: config.validate_request_xml,
        }
    }

    /// Context this handler posts for.
    #[must_use]
    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Post a request document.
    ///
    /// # Errors
    ///
    /// Returns a communication error when the servlet is not found, the
    /// classified error for other failure statuses or for an `error` element
    /// in the reply, and a parse error when the reply is not XML.
    pub async fn post(&self, operation: &str, document: &XmlDocument) -> Result<Page> {
        self.post_text(operation, document.to_xml_string()).await
    }

    /// Post a pre-rendered request document.
    ///
    /// # Errors
    ///
    /// See [`ApiHandler::post`].
    pub async fn post_text(&self, operation: &str, xml: String) -> Result<Page> {
        let span = tracing::info_span!("asm.api", operation);
        self.exchange(xml).instrument(span).await
    }

    async fn exchange(&self, xml: String) -> Result<Page> {
        let target = self.context.resource_url(XML_API_PATH, None)?;

        if self.validate_request_xml
            && let Err(error) = XmlDocument::parse(&xml)
        {
            tracing::warn!(%error, "request is not a well-formed XML document");
        }

        let request = Request::builder(Method::Post, target.clone())
            .header("Accept", ContentType::Xml.as_str())
            .xml_text(xml)
            .build();
        let response = self.client.execute(request).await?;
        let status = response.status();
        tracing::debug!(status, "XML API replied");

        if status == 404 {
            return Err(Error::api(
                ErrorCategory::Communication,
                status,
                default_reason(status),
                format!("no such endpoint: {target}"),
            ));
        }

        let body: Bytes = response.into_body();
        if body.is_empty() {
            let reason = default_reason(status);
            return Err(Error::api(ErrorCategory::General, status, reason, reason));
        }
        if status != 200 {
            return Err(classify(status, default_reason(status), &body));
        }

        let document = XmlDocument::parse_bytes(&body)?;
        if document.elements_by_tag_name("error").next().is_some() {
            return Err(classify(status, default_reason(status), &body));
        }

        Ok(Page::new(status, Payload::Xml(Arc::new(document)), true))
    }
}
