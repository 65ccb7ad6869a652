//! # JSON-RPC Dispatcher
//!
//! Executes single or batched call objects against a frozen method
//! registry, with per-call validation and error isolation: one malformed
//! or failing call never aborts its siblings, and results always preserve
//! input order because execution is sequential.
//!
//! Dispatchers can be chained: a method missing from the local registry is
//! searched across mounted dispatchers in registration order.

use crate::hook::BoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// JSON-RPC error codes
pub mod codes {
    /// The call object is not structurally valid
    pub const INVALID_REQUEST: i64 = -32600;
    /// No registry (local or mounted) knows the method
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// `params` is present but not an ordered sequence
    pub const INVALID_PARAMS: i64 = -32602;
    /// Unrecognized failure inside a method implementation
    pub const INTERNAL_ERROR: i64 = -32603;
    /// The request body was not parseable JSON
    pub const PARSE_ERROR: i64 = -32700;
}

/// An RPC-level error carrying its wire code
///
/// Methods return these directly for expected failures; anything
/// constructed through [`RpcError::internal`] is classified as anomalous
/// and additionally surfaced to error observers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RpcError {
    /// Numeric JSON-RPC error code
    pub code: i64,
    /// Human-readable message passed through to the caller
    pub message: String,
}

impl RpcError {
    /// Create an error with an explicit code
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create an `INTERNAL_ERROR`-classified error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }
}

/// Result type returned by RPC method implementations
pub type RpcResult = std::result::Result<Value, RpcError>;

/// A registered RPC method
///
/// `query` is the shared out-of-band context (e.g. the parsed URL query)
/// common to the whole batch.
pub trait RpcMethod: Send + Sync {
    /// Execute the method
    fn call<'a>(
        &'a self,
        params: &'a [Value],
        query: &'a HashMap<String, String>,
    ) -> BoxFuture<'a, RpcResult>;
}

/// Adapter implementing [`RpcMethod`] for a plain async function
pub struct FnMethod<F>(F);

impl<F> RpcMethod for FnMethod<F>
where
    F: for<'a> Fn(&'a [Value], &'a HashMap<String, String>) -> BoxFuture<'a, RpcResult>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        params: &'a [Value],
        query: &'a HashMap<String, String>,
    ) -> BoxFuture<'a, RpcResult> {
        (self.0)(params, query)
    }
}

/// Wrap a plain async function as a shareable [`RpcMethod`]
pub fn rpc_fn<F>(f: F) -> Arc<dyn RpcMethod>
where
    F: for<'a> Fn(&'a [Value], &'a HashMap<String, String>) -> BoxFuture<'a, RpcResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnMethod(f))
}

/// A structurally valid call, as handed to observers
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    /// Method name
    pub method: String,
    /// Positional parameters (defaulted to empty when absent)
    pub params: Vec<Value>,
    /// Call id (defaulted to null when absent)
    pub id: Value,
}

/// Observer of dispatch side effects
///
/// `on_call` fires unconditionally for every structurally valid call
/// before execution; `on_error` fires only for `INTERNAL_ERROR`-classified
/// failures — recognized RPC errors are expected, not anomalies.
pub trait RpcObserver: Send + Sync {
    /// A structurally valid call is about to execute
    fn on_call(&self, _call: &RpcCall, _query: &HashMap<String, String>) {}

    /// A method failed with an unrecognized (internal) error
    fn on_error(&self, _err: &RpcError) {}
}

/// Frozen dispatcher, built once via [`DispatcherBuilder`]
pub struct RpcDispatcher {
    calls: HashMap<String, Arc<dyn RpcMethod>>,
    mounts: Vec<Arc<RpcDispatcher>>,
    observers: Vec<Arc<dyn RpcObserver>>,
}

impl RpcDispatcher {
    /// Whether this dispatcher's local registry knows a method
    ///
    /// Mounts are not consulted; this mirrors the resolution guard, which
    /// only enters a mount whose own registry contains the method.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.calls.contains_key(method)
    }

    /// Ask another builder to mount this dispatcher
    pub fn attach(self: &Arc<Self>, other: &mut DispatcherBuilder) {
        other.mount(Arc::clone(self));
    }

    /// Execute a single or batched call body
    ///
    /// A non-array body is treated as a one-element batch and the output
    /// is unwrapped back to a scalar. Calls run strictly one at a time;
    /// the output order always matches the input order.
    pub async fn call(&self, body: Value, query: &HashMap<String, String>) -> Value {
        let (cmds, was_array) = match body {
            Value::Array(items) => (items, true),
            other => (vec![other], false),
        };

        let mut out = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            out.push(self.call_one(cmd, query).await);
        }

        if was_array {
            Value::Array(out)
        } else {
            out.remove(0)
        }
    }

    async fn call_one(&self, cmd: Value, query: &HashMap<String, String>) -> Value {
        let Value::Object(cmd) = cmd else {
            return outcome_err("Invalid request.", codes::INVALID_REQUEST, Value::Null);
        };

        let id = cmd.get("id").cloned().unwrap_or(Value::Null);
        if id.is_object() || id.is_array() {
            return outcome_err("Invalid ID.", codes::INVALID_REQUEST, Value::Null);
        }

        let method = match cmd.get("method") {
            Some(Value::String(m)) => m.clone(),
            _ => return outcome_err("Method not found.", codes::METHOD_NOT_FOUND, id),
        };

        let params = match cmd.get("params") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return outcome_err("Invalid params.", codes::INVALID_PARAMS, id),
        };

        let call = RpcCall { method, params, id };
        debug!(method = %call.method, "rpc call");
        for observer in &self.observers {
            observer.on_call(&call, query);
        }

        match self.execute(&call.method, &call.params, query).await {
            Ok(result) => json!({ "result": result, "error": null, "id": call.id }),
            Err(err) => {
                if err.code == codes::INTERNAL_ERROR {
                    error!(method = %call.method, error = %err, "rpc method failed");
                    for observer in &self.observers {
                        observer.on_error(&err);
                    }
                }
                outcome_err(err.message, err.code, call.id)
            }
        }
    }

    /// Resolve and run a method
    ///
    /// Local registry first; on a miss, the first mount whose local
    /// registry contains the method takes over, recursively applying its
    /// own resolution.
    fn execute<'a>(
        &'a self,
        method: &'a str,
        params: &'a [Value],
        query: &'a HashMap<String, String>,
    ) -> BoxFuture<'a, RpcResult> {
        Box::pin(async move {
            if let Some(func) = self.calls.get(method) {
                return func.call(params, query).await;
            }

            for mount in &self.mounts {
                if mount.contains(method) {
                    return mount.execute(method, params, query).await;
                }
            }

            Err(RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {method}."),
            ))
        })
    }
}

fn outcome_err(message: impl Into<String>, code: i64, id: Value) -> Value {
    json!({
        "result": null,
        "error": { "message": message.into(), "code": code },
        "id": id,
    })
}

/// Builder producing a frozen [`RpcDispatcher`]
#[derive(Default)]
pub struct DispatcherBuilder {
    calls: HashMap<String, Arc<dyn RpcMethod>>,
    mounts: Vec<Arc<RpcDispatcher>>,
    observers: Vec<Arc<dyn RpcObserver>>,
}

impl DispatcherBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method
    ///
    /// # Panics
    ///
    /// Panics on a duplicate name (programming error, not a runtime
    /// fault).
    pub fn add(&mut self, name: impl Into<String>, method: Arc<dyn RpcMethod>) -> &mut Self {
        let name = name.into();
        assert!(
            !self.calls.contains_key(&name),
            "duplicate RPC call: {name}"
        );
        self.calls.insert(name, method);
        self
    }

    /// Append another dispatcher to the resolution chain
    pub fn mount(&mut self, dispatcher: Arc<RpcDispatcher>) -> &mut Self {
        self.mounts.push(dispatcher);
        self
    }

    /// Register a dispatch observer
    pub fn observe(&mut self, observer: Arc<dyn RpcObserver>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> Arc<RpcDispatcher> {
        Arc::new(RpcDispatcher {
            calls: self.calls,
            mounts: self.mounts,
            observers: self.observers,
        })
    }
}
