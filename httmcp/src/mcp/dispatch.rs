//! Dispatch core: resolve a method, invoke its handler, normalize the outcome
//!
//! Every path (unknown method, handler error, panic, timeout, cancellation)
//! ends in one [`JsonRpcResponse`] carrying exactly one of `result`/`error`.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::context::ExecutionContext;
use super::envelope::{error_codes, JsonRpcRequest, JsonRpcResponse};
use super::inflight::InFlightRequests;
use super::registry::{HandlerError, HandlerRegistry, HandlerResult, RequestHandler};
use crate::metrics::{record_dispatch, DispatchStatus, UNKNOWN_METHOD_LABEL};
use crate::{Error, Result};

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    in_flight: Arc<InFlightRequests>,
    handler_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            in_flight: Arc::new(InFlightRequests::new()),
            handler_timeout: None,
        }
    }

    /// Abort handler invocations that run longer than `timeout`
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn in_flight(&self) -> &Arc<InFlightRequests> {
        &self.in_flight
    }

    /// Dispatch a request. Cancellation is scoped to the session named in
    /// `params._meta.sessionId`.
    pub async fn dispatch(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let scope = request.session_id().map(str::to_string);
        self.dispatch_in(request, scope.as_deref()).await
    }

    /// Dispatch a request, registering it for cancellation under `scope`
    /// (normally the caller's `X-MCP-Session-ID`).
    pub async fn dispatch_in(&self, request: JsonRpcRequest, scope: Option<&str>) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.try_dispatch(request, scope).await {
            Ok(response) => response,
            Err(e) => JsonRpcResponse::server_fault(id, e),
        }
    }

    async fn try_dispatch(
        &self,
        request: JsonRpcRequest,
        scope: Option<&str>,
    ) -> Result<JsonRpcResponse> {
        let started = Instant::now();
        let method = request.method.clone();
        let id = request.id.clone();

        let Some(handler) = self.registry.get(&method) else {
            tracing::debug!(method = %method, "Method not found");
            // The name came from the caller; keep it out of metric labels
            record_dispatch(UNKNOWN_METHOD_LABEL, DispatchStatus::NotFound, started.elapsed());
            return Ok(JsonRpcResponse::method_not_found(id));
        };

        let ctx = ExecutionContext::new(request.session_id().map(str::to_string), id.clone());
        let _guard = id
            .as_ref()
            .map(|id| self.in_flight.register(scope, id, ctx.signal().clone()));

        tracing::debug!(
            method = %method,
            id = ?id,
            session = ?ctx.session_id(),
            "Dispatching request"
        );

        let outcome = self.invoke(handler, request, ctx.clone()).await;

        // A call cancelled while running never reports its late result
        if ctx.is_cancelled() {
            tracing::warn!(method = %method, id = ?id, "Request was aborted");
            record_dispatch(&method, DispatchStatus::Aborted, started.elapsed());
            return Err(Error::Aborted);
        }

        let response = match outcome {
            Ok(result) => {
                record_dispatch(&method, DispatchStatus::Ok, started.elapsed());
                JsonRpcResponse::success(id, result)
            }
            Err(err) => {
                tracing::warn!(method = %method, id = ?id, "Handler failed: {}", err);
                record_dispatch(&method, DispatchStatus::Error, started.elapsed());
                let error = err.normalize();
                JsonRpcResponse::error(id, error.code, error.message)
            }
        };

        Ok(response)
    }

    async fn invoke(
        &self,
        handler: Arc<dyn RequestHandler>,
        request: JsonRpcRequest,
        ctx: ExecutionContext,
    ) -> HandlerResult {
        let signal = ctx.signal().clone();
        let call = AssertUnwindSafe(handler.handle(request, ctx)).catch_unwind();
        let deadline = async {
            match self.handler_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            caught = call => caught.unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                tracing::error!("{}", message);
                Err(HandlerError::new(error_codes::INTERNAL_ERROR, message))
            }),
            _ = signal.cancelled() => Err(HandlerError::msg("Request was aborted")),
            _ = deadline => {
                tracing::warn!("Handler exceeded {:?}, aborting", self.handler_timeout);
                signal.cancel();
                Err(HandlerError::msg("Request timed out"))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic in handler: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic in handler: {s}")
    } else {
        "panic in handler".to_string()
    }
}
