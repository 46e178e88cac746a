//! Error types for asm-client.

use derive_more::{Display, Error, From};

// ============================================================================
// Error Category
// ============================================================================

/// Broad classification of a failure, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorCategory {
    /// Session token missing, rejected, or not obtainable.
    #[display("authentication")]
    Authentication,
    /// Transport failure or an endpoint that could not be reached.
    #[display("communication")]
    Communication,
    /// Malformed responses, missing structure, and other failures.
    #[display("general")]
    General,
}

// ============================================================================
// Error Type
// ============================================================================

/// Main error type for asm-client operations.
///
/// Errors are `Clone` so that a failed page can hand the same error to every
/// caller parked on it.
#[derive(Debug, Clone, Display, Error, From)]
pub enum Error {
    /// The API answered with an error (non-success status or an `error` element).
    #[display("{category} error {status} ({reason}): {message}")]
    #[from(skip)]
    Api {
        /// Error category.
        category: ErrorCategory,
        /// HTTP status code.
        status: u16,
        /// Provider-specific reason code.
        reason: String,
        /// Human-readable message, possibly empty.
        message: String,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// Response body is not a well-formed XML document.
    #[display("malformed XML document: {_0}")]
    #[from(skip)]
    Xml(#[error(not(source))] String),

    /// Response body is not valid JSON, or does not match the expected shape.
    #[display("JSON deserialization error: {_0}")]
    #[from(skip)]
    Json(#[error(not(source))] String),

    /// A success status came back without a body.
    #[display("no entity: {_0}")]
    #[from(skip)]
    NoEntity(#[error(not(source))] String),

    /// Missing or invalid client configuration.
    #[display("configuration error: {_0}")]
    #[from(skip)]
    Configuration(#[error(not(source))] String),

    /// Internal failure of the client machinery.
    #[display("internal error: {_0}")]
    #[from(skip)]
    Internal(#[error(not(source))] String),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an API error.
    #[must_use]
    pub fn api(
        category: ErrorCategory,
        status: u16,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Api {
            category,
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn authentication(status: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::api(ErrorCategory::Authentication, status, reason, message)
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a malformed XML error.
    #[must_use]
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml(message.into())
    }

    /// Create a JSON error.
    #[must_use]
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json(message.into())
    }

    /// Create a missing entity error.
    #[must_use]
    pub fn no_entity(message: impl Into<String>) -> Self {
        Self::NoEntity(message.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The category this error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Api { category, .. } => *category,
            Self::Connection(_) | Self::Tls(_) | Self::Timeout => ErrorCategory::Communication,
            Self::InvalidRequest(_)
            | Self::InvalidUrl(_)
            | Self::Xml(_)
            | Self::Json(_)
            | Self::NoEntity(_)
            | Self::Configuration(_)
            | Self::Internal(_) => ErrorCategory::General,
        }
    }

    /// Returns the HTTP status code if the API reported this error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the provider-specific reason code if the API reported this error.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Api { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if this is an authentication-class error.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self.category(), ErrorCategory::Authentication)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::api(ErrorCategory::General, 500, "E100", "disk full");
        assert_eq!(err.to_string(), "general error 500 (E100): disk full");

        let err = Error::Timeout;
        assert_eq!(err.to_string(), "request timeout");

        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "connection error: failed to connect");

        let err = Error::no_entity("no entity was returned from an HTTP GET");
        assert_eq!(
            err.to_string(),
            "no entity: no entity was returned from an HTTP GET"
        );
    }

    #[test]
    fn error_category() {
        assert_eq!(Error::Timeout.category(), ErrorCategory::Communication);
        assert_eq!(Error::tls("bad cert").category(), ErrorCategory::Communication);
        assert_eq!(Error::xml("eof").category(), ErrorCategory::General);
        assert_eq!(
            Error::authentication(200, "NoAuth", "no session").category(),
            ErrorCategory::Authentication
        );
    }

    #[test]
    fn error_status_and_reason() {
        let err = Error::api(ErrorCategory::General, 409, "Conflict", "");
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.reason(), Some("Conflict"));

        assert_eq!(Error::Timeout.status(), None);
        assert_eq!(Error::Timeout.reason(), None);
    }

    #[test]
    fn error_predicates() {
        assert!(Error::Timeout.is_timeout());
        assert!(Error::connection("refused").is_connection());
        assert!(!Error::Timeout.is_connection());
        assert!(Error::authentication(401, "Unauthorized", "").is_authentication());
        assert!(!Error::internal("boom").is_authentication());
    }

    #[test]
    fn error_from_url_parse() {
        let err: Error = url::Url::parse("not a url").expect_err("invalid").into();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
