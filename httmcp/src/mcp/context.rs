//! Per-call execution context handed to handlers

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Created fresh for each dispatched call and dropped when it completes.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    signal: CancellationToken,
    session_id: Option<String>,
    request_id: Option<Value>,
}

impl ExecutionContext {
    pub fn new(session_id: Option<String>, request_id: Option<Value>) -> Self {
        Self {
            signal: CancellationToken::new(),
            session_id,
            request_id,
        }
    }

    /// Cancellation signal for this call. Long-running handlers should select on
    /// `signal().cancelled()`.
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn request_id(&self) -> Option<&Value> {
        self.request_id.as_ref()
    }
}
