//! # HTTP Server
//!
//! HTTP server built on Hyper and Tokio. Owns the hook list, freezes it
//! into a [`Pipeline`] at startup, and drives every connection through it.
//! Implements graceful shutdown with signal handling.
//!
//! ## Key Features
//!
//! - Async request handling with Tokio runtime
//! - Graceful shutdown on SIGINT
//! - Connection keep-alive support
//! - Network-free dispatch entry point for tests

use crate::error::{Error, Result};
use crate::hook::{Handler, Hook};
use crate::middleware::Pipeline;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Method, Router};
pub use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

/// HTTP server wrapping an ordered hook list
///
/// Hooks accumulate in registration order; [`serve`](Self::serve) and
/// [`dispatch`](Self::dispatch) both run the same pipeline, so tests
/// exercise the exact production path minus the network stack.
pub struct Server {
    config: ServerConfig,
    hooks: Vec<Hook>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Create a server with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            hooks: Vec::new(),
        }
    }

    /// Create a server with an explicit configuration
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            hooks: Vec::new(),
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// Mount a middleware function at a prefix
    pub fn use_at(&mut self, path: impl Into<String>, handler: Arc<dyn Handler>) -> &mut Self {
        self.hooks.push(Hook::function(path, handler));
        self
    }

    /// Mount a router at a prefix
    pub fn use_router(&mut self, path: impl Into<String>, router: Arc<Router>) -> &mut Self {
        self.hooks.push(Hook::router(path, router));
        self
    }

    /// Append a pre-built hook
    pub fn use_hook(&mut self, hook: Hook) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.hooks.clone())
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;

        let socket = tokio::net::TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        #[cfg(not(windows))]
        {
            socket.set_reuseport(true)?;
        }
        socket.bind(addr).map_err(|source| Error::BindError {
            address: addr.to_string(),
            source,
        })?;

        let listener = socket.listen(1024).map_err(|source| Error::BindError {
            address: addr.to_string(),
            source,
        })?;

        info!("Server listening on http://{}", addr);

        let pipeline = Arc::new(self.pipeline());
        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);

                    let pipeline = pipeline.clone();
                    let active = active.clone();

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service_fn(move |req| {
                                    let pipeline = pipeline.clone();
                                 async move {
                                     let method = req.method().clone();
                                     let path = req.uri().path().to_string();
                                     let version = format!("{:?}", req.version());

                                     let response = handle_request(
                                         req,
                                         &pipeline,
                                         remote_addr,
                                         max_body_size
                                     ).await;

                                     info!("    {} - \"{} {} {}\" {}",
                                         remote_addr,
                                         method,
                                         path,
                                         version,
                                         response.status()
                                     );
                                     Ok::<_, hyper::Error>(response.into_hyper())
                                 }
                            }))
                            .await
                        {
                            error!("Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                _ = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }
        let timeout = self.config.shutdown_timeout;
        let drain = async {
            loop {
                if active.load(Ordering::Relaxed) == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        let _ = tokio::time::timeout(timeout, drain).await;
        Ok(())
    }

    /// Execute a request directly without the network stack
    pub async fn dispatch(
        &self,
        method: Method,
        uri: &str,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Response {
        if let Some(b) = body.as_ref() {
            if b.len() > self.config.max_body_size {
                return error_response(&Error::PayloadTooLarge {
                    limit: self.config.max_body_size,
                    actual: b.len(),
                });
            }
        }

        let mut req = match Request::new(method, uri, headers, body) {
            Ok(r) => r,
            Err(e) => return error_response(&e),
        };
        req.set_header("x-client-ip", "local");

        process_request(&mut req, &self.pipeline()).await
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}

/// Core request processing logic (network agnostic)
async fn process_request(req: &mut Request, pipeline: &Pipeline) -> Response {
    if req.header("x-request-id").is_none() {
        let request_id = generate_request_id();
        req.set_header("x-request-id", &request_id);
    }

    let mut response = Response::new();
    if let Err(e) = pipeline.dispatch(req, &mut response).await {
        error!("Handler failed: {}", e);
        let mut response = Response::new();
        response.send(500, r#"{"error": "Internal Server Error"}"#, "application/json");
        return response;
    }

    if !response.is_finalized() {
        response.send(404, r#"{"error": "Not Found"}"#, "application/json");
    }

    if let Some(request_id) = req.header("x-request-id") {
        response.set_header("x-request-id", request_id);
    }
    response
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    pipeline: &Pipeline,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> Response {
    let mut request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(r) => r,
        Err(e) => {
            if !matches!(e, Error::PayloadTooLarge { .. }) {
                error!("Failed to parse request: {}", e);
            }
            return error_response(&e);
        }
    };

    request.set_header("x-client-ip", &remote_addr.ip().to_string());
    process_request(&mut request, pipeline).await
}

fn error_response(e: &Error) -> Response {
    let (status, message) = match e {
        Error::PayloadTooLarge { .. } => (413, "Payload Too Large"),
        Error::UnsupportedMethod { .. } => (501, "Not Implemented"),
        _ => (400, "Bad Request"),
    };
    let mut response = Response::new();
    response.send(
        status,
        format!(r#"{{"error": "{message}"}}"#),
        "application/json",
    );
    response
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::{handler_fn, BoxFuture};
    use crate::router::RouterBuilder;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[tokio::test]
    async fn test_unmatched_request_is_404() {
        let server = Server::new();
        let res = server
            .dispatch(Method::Get, "/nowhere", HashMap::new(), None)
            .await;
        assert_eq!(res.status(), 404);
        assert!(res.body().contains("Not Found"));
    }

    #[tokio::test]
    async fn test_mounted_router_serves_route() {
        fn hello<'a>(req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                let name = req.params.get("name").unwrap_or("world").to_string();
                res.send(200, format!("hello {name}"), "text/plain");
                Ok(())
            })
        }

        let mut builder = RouterBuilder::new();
        builder.get("/hello/:name", handler_fn(hello));
        let router = Arc::new(builder.build());

        let mut server = Server::new();
        server.use_router("/", router);

        let res = server
            .dispatch(Method::Get, "/hello/ada", HashMap::new(), None)
            .await;
        assert_eq!(res.status(), 200);
        assert_eq!(res.body(), "hello ada");
    }

    #[tokio::test]
    async fn test_hooks_run_before_router() {
        fn stamp<'a>(req: &'a mut Request, _res: &'a mut Response) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                req.set_header("x-stamped", "yes");
                Ok(())
            })
        }

        fn echo_stamp<'a>(
            req: &'a mut Request,
            res: &'a mut Response,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                let stamped = req.header("x-stamped").unwrap_or("no").to_string();
                res.send(200, stamped, "text/plain");
                Ok(())
            })
        }

        let mut builder = RouterBuilder::new();
        builder.get("/", handler_fn(echo_stamp));

        let mut server = Server::new();
        server.use_at("/", handler_fn(stamp));
        server.use_router("/", Arc::new(builder.build()));

        let res = server.dispatch(Method::Get, "/", HashMap::new(), None).await;
        assert_eq!(res.body(), "yes");
    }

    #[tokio::test]
    async fn test_oversize_body_is_413() {
        let mut server = Server::new();
        server.set_max_body_size(4);
        let res = server
            .dispatch(
                Method::Post,
                "/",
                HashMap::new(),
                Some(Bytes::from_static(b"too large")),
            )
            .await;
        assert_eq!(res.status(), 413);
    }

    #[tokio::test]
    async fn test_malformed_path_is_400() {
        let server = Server::new();
        let res = server
            .dispatch(Method::Get, "/../etc", HashMap::new(), None)
            .await;
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn test_handler_error_is_500() {
        fn fail<'a>(_req: &'a mut Request, _res: &'a mut Response) -> BoxFuture<'a, Result<()>> {
            Box::pin(async {
                Err(Error::Handler {
                    message: "broken".to_string(),
                })
            })
        }

        let mut server = Server::new();
        server.use_at("/", handler_fn(fail));
        let res = server.dispatch(Method::Get, "/", HashMap::new(), None).await;
        assert_eq!(res.status(), 500);
    }

    #[tokio::test]
    async fn test_request_id_propagated_to_response() {
        let server = Server::new();
        let res = server
            .dispatch(Method::Get, "/nowhere", HashMap::new(), None)
            .await;
        assert!(res.header("x-request-id").is_some());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
    }
}
