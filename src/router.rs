//! # Router
//!
//! An ordered collection of routes per HTTP method. Resolution is a linear
//! scan in registration order; the first matching route wins and there is
//! no priority reordering. A miss is reported upward as "unhandled", never
//! as an error — an outer layer owns the 404 decision.

use crate::error::Result;
use crate::hook::Handler;
use crate::request::Request;
use crate::response::Response;
use crate::route::{HandlerKind, Route};
use std::collections::HashMap;
use std::sync::Arc;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Parse an exact HTTP method token, case-sensitively
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
        }
    }
}

/// Frozen route table, built once via [`RouterBuilder`]
///
/// Read-only after construction; shared across in-flight requests behind
/// an `Arc` with no locking.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    /// Number of registered routes across all methods
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Dispatch a request to the first matching route
    ///
    /// Tries the method's routes in registration order. On the first
    /// match, merges the extracted parameters into `req.params` and
    /// awaits the handler. Returns `Ok(false)` when no route applies.
    ///
    /// # Errors
    ///
    /// Propagates pattern-compilation failures and handler failures.
    pub async fn handle(&self, req: &mut Request, res: &mut Response) -> Result<bool> {
        let Some(routes) = self.routes.get(&req.method) else {
            return Ok(false);
        };

        for route in routes {
            if let Some(params) = route.matches(&req.pathname)? {
                req.params.merge(params);
                route.handler().handle(req, res).await?;
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Builder producing a frozen [`Router`]
///
/// Registration order is preserved per method.
#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<Method, Vec<Route>>,
}

impl RouterBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route under a method
    pub fn route(
        &mut self,
        method: Method,
        pattern: impl Into<String>,
        kind: HandlerKind,
        handler: Arc<dyn Handler>,
    ) -> &mut Self {
        self.routes
            .entry(method)
            .or_default()
            .push(Route::new(pattern, kind, handler));
        self
    }

    /// Convenience registration for a GET route
    pub fn get(&mut self, pattern: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
        self.route(Method::Get, pattern, HandlerKind::TwoArg, handler)
    }

    /// Convenience registration for a POST route
    pub fn post(&mut self, pattern: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
        self.route(Method::Post, pattern, HandlerKind::TwoArg, handler)
    }

    /// Convenience registration for a PUT route
    pub fn put(&mut self, pattern: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
        self.route(Method::Put, pattern, HandlerKind::TwoArg, handler)
    }

    /// Convenience registration for a DELETE route
    pub fn delete(&mut self, pattern: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
        self.route(Method::Delete, pattern, HandlerKind::TwoArg, handler)
    }

    /// Freeze the table
    #[must_use]
    pub fn build(self) -> Router {
        Router {
            routes: self.routes,
        }
    }
}
