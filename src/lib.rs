//! # webcore
//!
//! HTTP request-handling core: a prefix-matched middleware pipeline, a
//! pattern-based router with parameter extraction, and a batched JSON-RPC
//! dispatcher, served over Hyper on the Tokio runtime.
//!
//! ## Architecture
//!
//! A request flows through an ordered list of hooks. Each hook binds a
//! literal URL prefix to either a middleware function or a mounted router;
//! the first handler to finalize the response ends the pass. JSON-RPC
//! traffic is just another middleware, gated on `POST /`.
//!
//! ## Modules
//!
//! - `server` - HTTP server built on Hyper with graceful shutdown
//! - `middleware` - Pipeline plus built-in CORS, logging, and JSON-RPC hooks
//! - `hook` - Prefix-to-handler bindings and the `Handler` trait
//! - `router` - Per-method route tables with first-match dispatch
//! - `route` - Route pattern compilation and parameter extraction
//! - `rpc` - Batched JSON-RPC dispatcher with per-call error isolation
//! - `request` - HTTP request wrapper with strict URL normalization
//! - `response` - Response state with first-send-wins finalization
//! - `json` - High-performance JSON parsing with simd-json
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod hook;
pub mod json;
pub mod middleware;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod rpc;
pub mod server;

pub use error::{Error, Result};
pub use hook::{handler_fn, BoxFuture, Handler, Hook, HookHandler};
pub use json::{parse_json, to_json};
pub use middleware::{Cors, JsonRpc, Pipeline, RequestLog};
pub use request::Request;
pub use response::Response;
pub use route::{HandlerKind, Params, PathMatcher, Route};
pub use router::{Method, Router, RouterBuilder};
pub use rpc::{
    rpc_fn, DispatcherBuilder, RpcCall, RpcDispatcher, RpcError, RpcMethod, RpcObserver, RpcResult,
};
pub use server::{Server, ServerConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the library
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("webcore=info")),
        )
        .json()
        .try_init();
}
