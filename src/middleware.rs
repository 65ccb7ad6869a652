//! # Middleware Pipeline
//!
//! An ordered list of hooks executed sequentially per request. Every hook
//! whose prefix matches the pathname runs, one at a time, until a handler
//! finalizes the response or one fails. Built-in middleware lives here:
//! CORS, request logging, and the JSON-RPC entry point.

use crate::error::Result;
use crate::hook::{BoxFuture, Handler, Hook};
use crate::request::Request;
use crate::response::Response;
use crate::router::Method;
use crate::rpc::RpcDispatcher;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Frozen, ordered hook list
///
/// One pass per request: hooks are evaluated in registration order, each
/// awaited to completion before the next starts. A finalized response
/// terminates the pass immediately; a handler error propagates to the
/// caller, which owns the 500 decision.
#[derive(Clone, Default)]
pub struct Pipeline {
    hooks: Vec<Hook>,
}

impl Pipeline {
    /// Create a pipeline from an ordered hook list
    #[must_use]
    pub fn new(hooks: Vec<Hook>) -> Self {
        Self { hooks }
    }

    /// Number of hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the pipeline has no hooks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run one request through the pipeline
    ///
    /// # Errors
    ///
    /// Propagates the first handler failure; later hooks are skipped.
    pub async fn dispatch(&self, req: &mut Request, res: &mut Response) -> Result<()> {
        for hook in &self.hooks {
            if !hook.is_prefix(&req.pathname) {
                continue;
            }

            hook.invoke(req, res).await?;

            if res.is_finalized() {
                break;
            }
        }
        Ok(())
    }
}

/// CORS middleware
///
/// Reflects the request origin (falling back to `*`), allows credentials,
/// and answers `OPTIONS` preflight requests directly.
#[derive(Clone)]
pub struct Cors {
    allow_methods: String,
    allow_headers: String,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            allow_methods: "GET,HEAD,PUT,PATCH,POST,DELETE".to_string(),
            allow_headers: "Authorization".to_string(),
        }
    }
}

impl Cors {
    /// Create a CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }
}

impl Handler for Cors {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let origin = req.header("origin").unwrap_or("*").to_string();

            res.set_header("Access-Control-Allow-Origin", &origin);
            res.set_header("Access-Control-Allow-Credentials", "true");
            res.set_header("Access-Control-Allow-Methods", &self.allow_methods);
            res.set_header("Access-Control-Allow-Headers", &self.allow_headers);

            if req.method == Method::Options {
                res.send(200, "", "text/plain");
            }

            Ok(())
        })
    }
}

/// Request logging middleware
#[derive(Clone, Copy, Default)]
pub struct RequestLog;

impl RequestLog {
    /// Create a logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Handler for RequestLog {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        _res: &'a mut Response,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request_id = req.header("x-request-id").unwrap_or("-");
            info!(
                method = %req.method,
                pathname = %req.pathname,
                request_id = %request_id,
                "Request received"
            );
            Ok(())
        })
    }
}

/// JSON-RPC middleware
///
/// Fires only for `POST /` carrying a JSON object body whose `method`
/// field is a string; anything else passes through untouched. The
/// dispatcher's output is serialized, newline-terminated, and sent as
/// `application/json`.
pub struct JsonRpc {
    rpc: Arc<RpcDispatcher>,
}

impl JsonRpc {
    /// Create the middleware around a frozen dispatcher
    #[must_use]
    pub fn new(rpc: Arc<RpcDispatcher>) -> Self {
        Self { rpc }
    }
}

impl Handler for JsonRpc {
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if req.method != Method::Post || req.pathname != "/" {
                return Ok(());
            }

            let Some(body) = req.body_json() else {
                return Ok(());
            };

            if !body.get("method").is_some_and(Value::is_string) {
                return Ok(());
            }

            let body = body.clone();
            let out = self.rpc.call(body, req.query()).await;

            let mut text = crate::json::to_json(&out)?;
            text.push('\n');

            res.send(200, text, "application/json");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::rpc::{rpc_fn, DispatcherBuilder, RpcResult};
    use hyper::body::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        finalize: bool,
        fail: bool,
    }

    impl Recorder {
        fn hook(
            path: &'static str,
            name: &'static str,
            log: &Arc<Mutex<Vec<&'static str>>>,
        ) -> Hook {
            Hook::function(
                path,
                Arc::new(Self {
                    name,
                    log: Arc::clone(log),
                    finalize: false,
                    fail: false,
                }),
            )
        }
    }

    impl Handler for Recorder {
        fn handle<'a>(
            &'a self,
            _req: &'a mut Request,
            res: &'a mut Response,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(self.name);
                if self.fail {
                    return Err(Error::Handler {
                        message: "recorder failure".to_string(),
                    });
                }
                if self.finalize {
                    res.send(200, self.name, "text/plain");
                }
                Ok(())
            })
        }
    }

    fn request(method: Method, uri: &str) -> Request {
        Request::new(method, uri, HashMap::new(), None).unwrap()
    }

    fn json_request(uri: &str, body: &str) -> Request {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Request::new(
            Method::Post,
            uri,
            headers,
            Some(Bytes::copy_from_slice(body.as_bytes())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Recorder::hook("/", "h1", &log),
            Recorder::hook("/api", "h2", &log),
        ]);

        let mut req = request(Method::Get, "/api/x");
        let mut res = Response::new();
        pipeline.dispatch(&mut req, &mut res).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn test_non_matching_prefix_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![
            Recorder::hook("/", "h1", &log),
            Recorder::hook("/api", "h2", &log),
        ]);

        let mut req = request(Method::Get, "/other");
        let mut res = Response::new();
        pipeline.dispatch(&mut req, &mut res).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["h1"]);
    }

    #[tokio::test]
    async fn test_finalized_response_terminates_pipeline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Hook::function(
            "/",
            Arc::new(Recorder {
                name: "h1",
                log: Arc::clone(&log),
                finalize: true,
                fail: false,
            }),
        );
        let pipeline = Pipeline::new(vec![first, Recorder::hook("/api", "h2", &log)]);

        let mut req = request(Method::Get, "/api/x");
        let mut res = Response::new();
        pipeline.dispatch(&mut req, &mut res).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["h1"]);
        assert!(res.is_finalized());
    }

    #[tokio::test]
    async fn test_handler_error_propagates_and_stops() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing = Hook::function(
            "/",
            Arc::new(Recorder {
                name: "h1",
                log: Arc::clone(&log),
                finalize: false,
                fail: true,
            }),
        );
        let pipeline = Pipeline::new(vec![failing, Recorder::hook("/", "h2", &log)]);

        let mut req = request(Method::Get, "/");
        let mut res = Response::new();
        let result = pipeline.dispatch(&mut req, &mut res).await;
        assert!(matches!(result, Err(Error::Handler { .. })));
        assert_eq!(*log.lock().unwrap(), vec!["h1"]);
    }

    #[tokio::test]
    async fn test_cors_sets_headers_and_passes_through() {
        let cors = Cors::new();
        let mut req = request(Method::Get, "/");
        req.set_header("origin", "https://example.com");
        let mut res = Response::new();
        cors.handle(&mut req, &mut res).await.unwrap();

        assert!(!res.is_finalized());
        assert_eq!(
            res.header("Access-Control-Allow-Origin"),
            Some("https://example.com")
        );
        assert_eq!(res.header("Access-Control-Allow-Credentials"), Some("true"));
    }

    #[tokio::test]
    async fn test_cors_answers_preflight() {
        let cors = Cors::new();
        let mut req = request(Method::Options, "/api");
        let mut res = Response::new();
        cors.handle(&mut req, &mut res).await.unwrap();

        assert!(res.is_finalized());
        assert_eq!(res.status(), 200);
        assert_eq!(res.header("Access-Control-Allow-Origin"), Some("*"));
    }

    fn foo<'a>(
        _params: &'a [Value],
        _query: &'a HashMap<String, String>,
    ) -> BoxFuture<'a, RpcResult> {
        Box::pin(async { Ok(serde_json::json!({ "ok": true })) })
    }

    fn rpc_middleware() -> JsonRpc {
        let mut builder = DispatcherBuilder::new();
        builder.add("foo", rpc_fn(foo));
        JsonRpc::new(builder.build())
    }

    #[tokio::test]
    async fn test_json_rpc_responds_newline_terminated() {
        let rpc = rpc_middleware();
        let mut req = json_request("/", r#"{"method": "foo", "params": []}"#);
        let mut res = Response::new();
        rpc.handle(&mut req, &mut res).await.unwrap();

        assert!(res.is_finalized());
        assert_eq!(res.content_type(), "application/json");
        assert!(res.body().ends_with('\n'));
        let value: Value = serde_json::from_str(res.body()).unwrap();
        assert_eq!(value["result"]["ok"], true);
    }

    #[tokio::test]
    async fn test_json_rpc_ignores_non_root_paths() {
        let rpc = rpc_middleware();
        let mut req = json_request("/other", r#"{"method": "foo"}"#);
        let mut res = Response::new();
        rpc.handle(&mut req, &mut res).await.unwrap();
        assert!(!res.is_finalized());
    }

    #[tokio::test]
    async fn test_json_rpc_ignores_get_requests() {
        let rpc = rpc_middleware();
        let mut req = request(Method::Get, "/");
        let mut res = Response::new();
        rpc.handle(&mut req, &mut res).await.unwrap();
        assert!(!res.is_finalized());
    }

    #[tokio::test]
    async fn test_json_rpc_ignores_bodies_without_method() {
        let rpc = rpc_middleware();
        let mut req = json_request("/", r#"{"not_method": 1}"#);
        let mut res = Response::new();
        rpc.handle(&mut req, &mut res).await.unwrap();
        assert!(!res.is_finalized());
    }
}
