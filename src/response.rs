//! # HTTP Response
//!
//! Response state shared down the middleware pipeline. A response is
//! *finalized* by the first `send`; the pipeline checks that flag after
//! every hook to decide whether to keep going.

use crate::error::Result;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// HTTP Response wrapper
pub struct Response {
    status: u16,
    body: String,
    content_type: String,
    headers: HashMap<String, String>,
    finalized: bool,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "application/json".to_string(),
            headers: HashMap::new(),
            finalized: false,
        }
    }
}

impl Response {
    /// Create a new, unsent response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize the response with a status, body, and content type
    ///
    /// The first send wins; later sends are ignored.
    pub fn send(&mut self, status: u16, body: impl Into<String>, content_type: &str) {
        if self.finalized {
            warn!(status, "send on finalized response ignored");
            return;
        }
        self.status = status;
        self.body = body.into();
        self.content_type = content_type.to_string();
        self.finalized = true;
    }

    /// Finalize with a serialized JSON body
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if serialization fails
    pub fn send_json<T: Serialize>(&mut self, status: u16, value: &T) -> Result<()> {
        let body = crate::json::to_json(value)?;
        self.send(status, body, "application/json");
        Ok(())
    }

    /// Finalize with an HTML body
    pub fn send_html(&mut self, status: u16, body: impl Into<String>) {
        self.send(status, body, "text/html");
    }

    /// Whether the response has been sent
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// HTTP status code
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response body
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Content type
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Get a previously set header
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers.insert(key.to_string(), value.to_string());
        }
    }

    /// Convert to a hyper response
    #[must_use]
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder().status(status);
        builder = builder.header("Content-Type", &self.content_type);
        for (k, v) in &self.headers {
            if !k.eq_ignore_ascii_case("content-type") {
                builder = builder.header(k.as_str(), v.as_str());
            }
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| {
                hyper::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Full::new(Bytes::from("Internal Server Error")))
                    .expect("static fallback response is valid")
            })
    }
}
