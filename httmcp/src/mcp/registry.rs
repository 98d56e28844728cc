//! Method-name to handler registry
//!
//! Populated once at startup and read-only afterwards. A method with no entry
//! is an ordinary state: dispatch reports it as "method not found".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::context::ExecutionContext;
use super::envelope::{error_codes, JsonRpcError, JsonRpcRequest};

/// Largest integer a JSON number can carry without losing precision (2^53 - 1)
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Failure reported by a handler.
///
/// `code` is kept as a raw JSON value so handlers forwarding foreign errors can
/// hand over whatever they received; dispatch decides whether it is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerError {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl HandlerError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(Value::from(code)),
            message: Some(message.into()),
        }
    }

    /// Error without a code; normalises to an internal error
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: Some(message.into()),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    pub fn with_raw_code(code: Value, message: Option<String>) -> Self {
        Self {
            code: Some(code),
            message,
        }
    }

    /// Collapse into a wire error: safe-integer codes survive, everything
    /// else becomes an internal error; a missing message gets a default.
    pub fn normalize(self) -> JsonRpcError {
        JsonRpcError {
            code: self
                .code
                .as_ref()
                .and_then(safe_integer)
                .unwrap_or(error_codes::INTERNAL_ERROR),
            message: self.message.unwrap_or_else(|| "Internal error".to_string()),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => write!(f, "{} ({})", msg, code),
            (None, Some(msg)) => write!(f, "{}", msg),
            (Some(code), None) => write!(f, "handler error ({})", code),
            (None, None) => write!(f, "handler error"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<crate::Error> for HandlerError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::InvalidRequest(msg) => Self::invalid_params(msg),
            other => Self::msg(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_params(err.to_string())
    }
}

/// Integer value of `code` if it is a whole number within ±(2^53 - 1)
pub fn safe_integer(code: &Value) -> Option<i64> {
    let n = code.as_number()?;
    if let Some(i) = n.as_i64() {
        return (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER)
            .contains(&i)
            .then_some(i);
    }
    if n.is_u64() {
        // Above i64::MAX, so certainly above the safe range
        return None;
    }
    let f = n.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64 {
        Some(f as i64)
    } else {
        None
    }
}

pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// A callable bound to one RPC method
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: JsonRpcRequest, ctx: ExecutionContext) -> HandlerResult;
}

/// Adapter turning an async closure into a [`RequestHandler`]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(JsonRpcRequest, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(JsonRpcRequest, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, request: JsonRpcRequest, ctx: ExecutionContext) -> HandlerResult {
        (self.f)(request, ctx).await
    }
}

/// Registry of method handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to a method name, replacing any previous binding
    pub fn register(&mut self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        let method = method.into();
        if self.handlers.insert(method.clone(), handler).is_some() {
            tracing::warn!("Replaced handler for method {}", method);
        }
    }

    /// Bind an async closure to a method name
    pub fn register_fn<F, Fut>(&mut self, method: impl Into<String>, f: F)
    where
        F: Fn(JsonRpcRequest, ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(method, Arc::new(handler_fn(f)));
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}
