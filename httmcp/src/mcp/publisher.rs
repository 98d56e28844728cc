//! Best-effort push delivery to a publish/subscribe server
//!
//! Messages go to `POST {publish_server}/mcp/{name}/{channel}` with the event
//! label in `X-EventSource-Event`, which nchan-style servers relay to the
//! subscribed event-stream client. One attempt, no retries; failures are
//! logged and reported as `false`.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::envelope::JsonRpcResponse;
use crate::config::{McpConfig, PublishConfig};
use crate::metrics::record_publish;
use crate::{Error, Result};

pub const EVENT_HEADER: &str = "x-eventsource-event";
pub const DEFAULT_EVENT: &str = "message";
pub const ENDPOINT_EVENT: &str = "endpoint";

/// Payload of a publish: structured values are serialized, text is sent as is
#[derive(Debug, Clone, PartialEq)]
pub enum PublishMessage {
    Json(Value),
    Text(String),
}

impl PublishMessage {
    fn into_body(self) -> Result<String> {
        match self {
            PublishMessage::Json(value) => Ok(serde_json::to_string(&value)?),
            PublishMessage::Text(text) => Ok(text),
        }
    }
}

impl From<Value> for PublishMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => PublishMessage::Text(text),
            other => PublishMessage::Json(other),
        }
    }
}

impl From<String> for PublishMessage {
    fn from(text: String) -> Self {
        PublishMessage::Text(text)
    }
}

impl From<&str> for PublishMessage {
    fn from(text: &str) -> Self {
        PublishMessage::Text(text.to_string())
    }
}

impl From<&JsonRpcResponse> for PublishMessage {
    fn from(response: &JsonRpcResponse) -> Self {
        PublishMessage::Json(serde_json::to_value(response).unwrap_or_default())
    }
}

/// Whether `channel_id` can be used as a single path segment of the publish
/// URL. Session ids minted by this server are UUIDs; anything that could
/// escape the segment (`/`, `?`, `#`, `%`, dot segments) is refused.
pub fn is_valid_channel_id(channel_id: &str) -> bool {
    !channel_id.is_empty()
        && channel_id.len() <= 128
        && channel_id != "."
        && channel_id != ".."
        && channel_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    client: Client,
    publish_server: Option<String>,
    server_name: String,
}

impl ChannelPublisher {
    pub fn new(
        server_name: impl Into<String>,
        publish_server: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            publish_server: publish_server.map(|s| s.trim_end_matches('/').to_string()),
            server_name: server_name.into(),
        })
    }

    pub fn from_config(mcp: &McpConfig, publish: &PublishConfig) -> Result<Self> {
        Self::new(mcp.name.clone(), mcp.publish_server.clone(), publish.timeout())
    }

    pub fn is_configured(&self) -> bool {
        self.publish_server.is_some()
    }

    /// Publish URL for a channel, if a publish server is configured and the
    /// channel id is a safe path segment
    pub fn channel_url(&self, channel_id: &str) -> Option<String> {
        if !is_valid_channel_id(channel_id) {
            return None;
        }
        self.publish_server
            .as_ref()
            .map(|base| format!("{}/mcp/{}/{}", base, self.server_name, channel_id))
    }

    /// Attempt one delivery. Returns true only on HTTP 200.
    pub async fn publish(
        &self,
        channel_id: &str,
        message: impl Into<PublishMessage>,
        event: &str,
    ) -> bool {
        if !self.is_configured() {
            tracing::error!("Publish server not configured");
            record_publish(event, "skipped");
            return false;
        }
        let Some(url) = self.channel_url(channel_id) else {
            tracing::warn!(channel = ?channel_id, "Refusing to publish to invalid channel id");
            record_publish(event, "rejected");
            return false;
        };

        match self.send(&url, message.into(), event).await {
            Ok(()) => {
                tracing::debug!(channel = %channel_id, event = %event, "Published to channel");
                record_publish(event, "ok");
                true
            }
            Err(e) => {
                tracing::error!("Error publishing to channel {}: {}", channel_id, e);
                record_publish(event, "failed");
                false
            }
        }
    }

    async fn send(&self, url: &str, message: PublishMessage, event: &str) -> Result<()> {
        let body = message.into_body()?;

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, event)
            .body(body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!("{} returned {}: {}", url, status, body)));
        }

        Ok(())
    }

    /// Push a finished tool result to a session as a JSON-RPC response.
    ///
    /// Used by tools that acknowledge a call immediately and deliver the real
    /// result later over the session's event stream.
    pub async fn publish_tool_result(
        &self,
        channel_id: &str,
        request_id: Option<Value>,
        text: &str,
    ) -> bool {
        let response = JsonRpcResponse::success(
            request_id,
            json!({
                "content": [{
                    "type": "text",
                    "text": text
                }]
            }),
        );
        self.publish(channel_id, &response, DEFAULT_EVENT).await
    }
}
