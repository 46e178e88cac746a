//! Error classification for non-success responses.

use crate::{Error, ErrorCategory, XmlDocument};

/// Canonical reason phrase for a status code, or `"Unknown"`.
#[must_use]
pub fn default_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown")
}

/// Turn an error response into a typed [`Error`].
///
/// The body is inspected for a vendor `error` element: its `code` attribute
/// becomes the reason and its `message` attribute the message. Without one
/// (or when the body is not XML at all) the `default_reason` is used and the
/// message is empty.
#[must_use]
pub fn classify(status: u16, default_reason: &str, body: &[u8]) -> Error {
    let category = match status {
        401 | 403 => ErrorCategory::Authentication,
        _ => ErrorCategory::General,
    };

    let mut reason = default_reason.to_string();
    let mut message = String::new();

    if let Ok(document) = XmlDocument::parse_bytes(body)
        && let Some(error) = document.elements_by_tag_name("error").next()
    {
        if let Some(code) = error.attribute("code") {
            reason = code.trim().to_string();
        }
        if let Some(text) = error.attribute("message") {
            message = text.trim().to_string();
        }
    }

    Error::api(category, status, reason, message)
}
