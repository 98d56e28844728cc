//! HTTP handlers for session lifecycle and MCP methods
//!
//! RPC failures always travel inside a 200 response body; the status line is
//! never used to report them.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use super::server::AppState;
use crate::mcp::envelope::{JsonRpcRequest, JsonRpcResponse};
use crate::mcp::normalize::apply_session;
use crate::mcp::publisher::ENDPOINT_EVENT;
use crate::metrics::record_session_started;

pub const SESSION_HEADER: &str = "x-mcp-session-id";
pub const TRANSPORT_HEADER: &str = "x-mcp-transport";
pub const SSE_TRANSPORT: &str = "sse";
pub const REDIRECT_HEADER: &str = "x-accel-redirect";
pub const BUFFERING_HEADER: &str = "x-accel-buffering";

/// Methods routed through the dispatcher
pub const RPC_METHODS: [&str; 8] = [
    "initialize",
    "resources/list",
    "resources/read",
    "prompts/list",
    "prompts/get",
    "resources/templates/list",
    "tools/list",
    "tools/call",
];

/// Methods answered with a fixed `{result: {}}`
pub const ACK_METHODS: [&str; 2] = ["ping", "notifications/initialized"];

pub const CANCELLED_METHOD: &str = "notifications/cancelled";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// GET / - start a session and hand the client to its event stream
pub async fn session_start(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = Uuid::new_v4().to_string();
    record_session_started();
    tracing::info!(session = %session_id, "Session started");

    (
        StatusCode::OK,
        [
            (REDIRECT_HEADER, state.mcp.redirect_target(&session_id)),
            (BUFFERING_HEADER, "no".to_string()),
        ],
    )
}

/// GET /endpoint - publish the session's callback path to its channel
pub async fn endpoint(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let session_id = header(&headers, SESSION_HEADER);
    let transport = header(&headers, TRANSPORT_HEADER);

    match (transport, session_id) {
        (Some(SSE_TRANSPORT), Some(session_id)) => {
            let endpoint = state.mcp.session_endpoint(session_id);
            // Delivery is best effort; the caller gets 200 either way
            if !state
                .publisher
                .publish(session_id, endpoint, ENDPOINT_EVENT)
                .await
            {
                tracing::warn!(session = %session_id, "Endpoint was not delivered");
            }
        }
        _ => {
            tracing::debug!(
                transport = ?transport,
                session = ?session_id,
                "Endpoint query without sse transport and session, nothing published"
            );
        }
    }

    StatusCode::OK
}

/// POST /{method} - normalize, dispatch and answer with the response envelope
pub async fn mcp_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<JsonRpcResponse> {
    let session_id = header(&headers, SESSION_HEADER);

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Error handling MCP request: {}", e);
            return Json(JsonRpcResponse::server_fault(None, e));
        }
    };

    let id = value.get("id").filter(|id| !id.is_null()).cloned();
    let request = match JsonRpcRequest::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!("Error handling MCP request: {}", e);
            return Json(JsonRpcResponse::server_fault(id, e));
        }
    };

    let request = apply_session(request, session_id);
    Json(state.dispatcher.dispatch_in(request, session_id).await)
}

fn body_id(body: &[u8]) -> Option<Value> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("id").cloned())
}

/// POST /ping, /notifications/initialized - fixed acknowledgement
pub async fn empty_response(body: Bytes) -> Json<JsonRpcResponse> {
    Json(JsonRpcResponse::empty(body_id(&body)))
}

/// POST /notifications/cancelled - fixed acknowledgement, and cancel the
/// named in-flight request of the caller's session if there is one
pub async fn cancelled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<JsonRpcResponse> {
    let value = serde_json::from_slice::<Value>(&body).unwrap_or_default();

    if let Some(request_id) = value.pointer("/params/requestId") {
        let session_id = header(&headers, SESSION_HEADER);
        let found = state.dispatcher.in_flight().cancel(session_id, request_id);
        tracing::debug!(
            session = ?session_id,
            request_id = %request_id,
            found,
            "Cancellation requested"
        );
    }

    Json(JsonRpcResponse::empty(value.get("id").cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_id() {
        assert_eq!(body_id(br#"{"id": 3}"#), Some(json!(3)));
        assert_eq!(body_id(br#"{"method": "ping"}"#), None);
        assert_eq!(body_id(b"not json"), None);
        assert_eq!(body_id(b""), None);
    }

    #[test]
    fn test_header_ignores_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, "".parse().unwrap());
        assert!(header(&headers, SESSION_HEADER).is_none());

        headers.insert(SESSION_HEADER, "abc".parse().unwrap());
        assert_eq!(header(&headers, SESSION_HEADER), Some("abc"));
    }
}
