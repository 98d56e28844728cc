//! Thread the transport session identity into the request envelope

use serde_json::Value;

use super::envelope::{JsonRpcRequest, META_SESSION_ID};

/// Overwrite `params._meta.sessionId` with the header value.
///
/// Only touches an existing `_meta` object; none is created. With no header
/// the field is removed, so a caller cannot claim a session it did not send.
pub fn apply_session(mut request: JsonRpcRequest, session_id: Option<&str>) -> JsonRpcRequest {
    if let Some(meta) = request.meta_mut() {
        match session_id {
            Some(id) => {
                meta.insert(META_SESSION_ID.to_string(), Value::String(id.to_string()));
            }
            None => {
                meta.remove(META_SESSION_ID);
            }
        }
    }
    request
}
