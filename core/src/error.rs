//! Error types for the work-item client and the façade on top of it.
//!
//! # Design
//! `ApiError` belongs to the collaborator layer: it describes what went wrong
//! building a request, moving it over the wire, or reading the response.
//! `NotFound` gets a dedicated variant because the façade turns a missing
//! record into `None` rather than an error.
//!
//! `ServiceError` is the façade's own taxonomy. Remote failures pass through
//! it untouched via the transparent `Api` variant.

use thiserror::Error;

/// Errors returned by `TfsClient` parse methods and by transports.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404: the requested resource does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-success status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The server address could not be turned into a request URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The transport failed before an HTTP status was received.
    #[error("transport failed: {0}")]
    Transport(String),
}

/// Result type alias for façade operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by `TfsService` and `WorkItem`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A data operation was attempted before a successful `connect`.
    #[error("disconnected from TFS service")]
    NotConnected,

    /// A list- or map-typed argument had the wrong shape or content.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The work item to copy does not exist.
    #[error("source work item {0} not found")]
    SourceNotFound(i64),

    /// Failure reported by the remote side, unchanged.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ServiceError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(msg.into())
    }
}
