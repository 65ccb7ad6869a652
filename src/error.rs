//! # Error Handling
//!
//! Centralized error types for the webcore runtime.
//! Uses `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Result type alias for webcore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the request-handling runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Request URI exceeds the hard length limit
    #[error("URI is too long: {actual} bytes (limit {limit})")]
    UriTooLong {
        /// Actual URI length
        actual: usize,
        /// Max allowed length
        limit: usize,
    },

    /// Request pathname exceeds the hard length limit
    #[error("Pathname is too long: {actual} bytes (limit {limit})")]
    PathnameTooLong {
        /// Actual pathname length
        actual: usize,
        /// Max allowed length
        limit: usize,
    },

    /// Pathname failed normalization (traversal stripped it below a valid shape)
    #[error("Malformed pathname: {path:?}")]
    MalformedPath {
        /// The pathname after normalization
        path: String,
    },

    /// Too many keys in the query string
    #[error("Too many keys in querystring: {actual} (limit {limit})")]
    QueryTooLarge {
        /// Actual key count
        actual: usize,
        /// Max allowed key count
        limit: usize,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// HTTP method token outside the supported set
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod {
        /// The offending method token
        method: String,
    },

    /// JSON parse failure (simd-json)
    #[error("JSON parse error: {reason}")]
    JsonParse {
        /// Parser error message
        reason: String,
    },

    /// Handler-level failure surfaced out of the pipeline
    #[error("Handler error: {message}")]
    Handler {
        /// What the handler reported
        message: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
