//! # Hooks
//!
//! A hook binds a literal URL prefix to a handler and is the unit the
//! middleware pipeline sequences. Hooks use plain prefix containment, not
//! the route pattern language; the hook at `/` matches every pathname.

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;
use crate::route::HandlerKind;
use crate::router::Router;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by handlers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Request handler seam
///
/// Implemented by middleware structs directly, and by plain async
/// functions through [`handler_fn`].
pub trait Handler: Send + Sync {
    /// Process one request, awaited to completion before the pipeline
    /// moves on
    fn handle<'a>(&'a self, req: &'a mut Request, res: &'a mut Response)
        -> BoxFuture<'a, Result<()>>;
}

/// Adapter implementing [`Handler`] for a plain async function
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync,
{
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Result<()>> {
        (self.0)(req, res)
    }
}

/// Wrap a plain async function as a shareable [`Handler`]
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Result<()>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHandler(f))
}

/// Handler slot of a hook, resolved once at registration time
#[derive(Clone)]
pub enum HookHandler {
    /// A callable middleware function
    Function(Arc<dyn Handler>),
    /// A mounted router, driven through its `handle` entry point
    Router(Arc<Router>),
}

/// A (prefix, handler) binding used for middleware dispatch
///
/// Immutable once constructed; owned exclusively by the pipeline's
/// ordered hook list.
#[derive(Clone)]
pub struct Hook {
    path: String,
    handler: HookHandler,
    kind: HandlerKind,
}

impl Hook {
    /// Create a hook from a prefix and a resolved handler
    ///
    /// # Panics
    ///
    /// Panics if `path` is empty or does not start with `/` (programming
    /// error).
    #[must_use]
    pub fn new(path: impl Into<String>, handler: HookHandler, kind: HandlerKind) -> Self {
        let path = path.into();
        assert!(
            !path.is_empty() && path.starts_with('/'),
            "hook path must be non-empty and start with '/'"
        );
        Self {
            path,
            handler,
            kind,
        }
    }

    /// Create a hook around a middleware function
    #[must_use]
    pub fn function(path: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self::new(path, HookHandler::Function(handler), HandlerKind::TwoArg)
    }

    /// Create a hook that mounts a router
    #[must_use]
    pub fn router(path: impl Into<String>, router: Arc<Router>) -> Self {
        Self::new(path, HookHandler::Router(router), HandlerKind::TwoArg)
    }

    /// The literal prefix this hook is mounted at
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Declared handler arity (informational; the third slot is reserved)
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Whether this hook applies to a pathname
    ///
    /// The hook at `/` matches unconditionally. Otherwise this is literal
    /// prefix containment, so `/api` also matches `/api2`.
    #[must_use]
    pub fn is_prefix(&self, pathname: &str) -> bool {
        if self.path == "/" {
            return true;
        }
        pathname.starts_with(&self.path)
    }

    /// Run the hook's handler
    ///
    /// A mounted router that does not match is not an error; the request
    /// simply passes through.
    ///
    /// # Errors
    ///
    /// Propagates the handler's failure to the pipeline.
    pub async fn invoke(&self, req: &mut Request, res: &mut Response) -> Result<()> {
        match &self.handler {
            HookHandler::Function(f) => f.handle(req, res).await,
            HookHandler::Router(r) => {
                r.handle(req, res).await?;
                Ok(())
            }
        }
    }
}
