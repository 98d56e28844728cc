//! JSON-RPC 2.0 envelopes

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and adapter-specific error codes
pub mod error_codes {
    pub const INVALID_PARAMS: i64 = -32602;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Faults caught at the HTTP route boundary
    pub const SERVER_FAULT: i64 = 0;
}

/// Key of the metadata object inside `params`
pub const META_KEY: &str = "_meta";
/// Session field inside the metadata object
pub const META_SESSION_ID: &str = "sessionId";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Keeps an explicit `"id": null` as `Some(Value::Null)`; only a missing
/// field becomes `None`.
fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC request. Notifications carry no id.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JsonRpcRequest {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Option<Value>>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// `params._meta`, when present as an object
    pub fn meta(&self) -> Option<&serde_json::Map<String, Value>> {
        self.params.as_ref()?.get(META_KEY)?.as_object()
    }

    pub fn meta_mut(&mut self) -> Option<&mut serde_json::Map<String, Value>> {
        self.params.as_mut()?.get_mut(META_KEY)?.as_object_mut()
    }

    /// Session identity carried in `params._meta.sessionId`
    pub fn session_id(&self) -> Option<&str> {
        self.meta()?.get(META_SESSION_ID)?.as_str()
    }

    /// Parse a request out of an already-decoded JSON body
    pub fn from_value(value: Value) -> crate::Result<Self> {
        let request: JsonRpcRequest = serde_json::from_value(value)?;
        if request.method.is_empty() {
            return Err(crate::Error::InvalidRequest(
                "method must not be empty".to_string(),
            ));
        }
        Ok(request)
    }
}

/// JSON-RPC error
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// JSON-RPC response. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_version(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn method_not_found(id: Option<Value>) -> Self {
        Self::error(id, error_codes::METHOD_NOT_FOUND, "Method not found")
    }

    /// Fault caught outside normal dispatch. The id is always present on the
    /// wire, `null` when the request's id is unknown.
    pub fn server_fault(id: Option<Value>, detail: impl std::fmt::Display) -> Self {
        Self::error(
            Some(id.unwrap_or(Value::Null)),
            error_codes::SERVER_FAULT,
            format!("Internal server error: {}", detail),
        )
    }

    /// `{result: {}}` acknowledgement. Missing or null ids become `""`.
    pub fn empty(id: Option<Value>) -> Self {
        let id = match id {
            Some(Value::Null) | None => Value::String(String::new()),
            Some(id) => id,
        };
        Self::success(Some(id), json!({}))
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_version() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"id": 7, "method": "tools/list"})).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, Some(json!(7)));
        assert!(req.params.is_none());
    }

    #[test]
    fn test_null_id_is_kept_apart_from_missing() {
        let req = JsonRpcRequest::from_value(json!({"id": null, "method": "tools/list"})).unwrap();
        assert_eq!(req.id, Some(Value::Null));

        let req = JsonRpcRequest::from_value(json!({"method": "tools/list"})).unwrap();
        assert!(req.id.is_none());

        let wire = serde_json::to_value(JsonRpcResponse::success(Some(Value::Null), json!({}))).unwrap();
        assert_eq!(wire, json!({"jsonrpc": "2.0", "id": null, "result": {}}));

        let parsed: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": null, "result": {}})).unwrap();
        assert_eq!(parsed.id, Some(Value::Null));
    }

    #[test]
    fn test_empty_method_rejected() {
        let err = JsonRpcRequest::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": ""}));
        assert!(matches!(err, Err(crate::Error::InvalidRequest(_))));

        let err = JsonRpcRequest::from_value(json!({"jsonrpc": "2.0", "id": 1}));
        assert!(matches!(err, Err(crate::Error::Json(_))));
    }

    #[test]
    fn test_session_id_from_meta() {
        let req = JsonRpcRequest::new(
            json!(1),
            "tools/call",
            Some(json!({"name": "x", "_meta": {"sessionId": "abc"}})),
        );
        assert_eq!(req.session_id(), Some("abc"));

        let req = JsonRpcRequest::new(json!(1), "tools/call", Some(json!({"_meta": "nope"})));
        assert!(req.meta().is_none());
        assert!(req.session_id().is_none());
    }

    #[test]
    fn test_response_serializes_exactly_one_outcome() {
        let ok = serde_json::to_value(JsonRpcResponse::success(Some(json!(1)), json!({}))).unwrap();
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": {}}));

        let err = serde_json::to_value(JsonRpcResponse::method_not_found(Some(json!("a")))).unwrap();
        assert_eq!(
            err,
            json!({"jsonrpc": "2.0", "id": "a", "error": {"code": -32601, "message": "Method not found"}})
        );
    }

    #[test]
    fn test_server_fault_keeps_null_id() {
        let fault = JsonRpcResponse::server_fault(None, "boom");
        let value = serde_json::to_value(&fault).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], 0);
        assert_eq!(value["error"]["message"], "Internal server error: boom");
    }

    #[test]
    fn test_empty_response_id_rules() {
        assert_eq!(JsonRpcResponse::empty(None).id, Some(json!("")));
        assert_eq!(JsonRpcResponse::empty(Some(Value::Null)).id, Some(json!("")));
        assert_eq!(JsonRpcResponse::empty(Some(json!(0))).id, Some(json!(0)));
        assert_eq!(JsonRpcResponse::empty(Some(json!("p1"))).result, Some(json!({})));
    }
}
