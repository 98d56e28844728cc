//! Built-in demo tools

use async_trait::async_trait;
use httmcp::mcp::{HandlerError, HandlerResult, McpTool, ToolContext};
use serde_json::{json, Value};

fn text_argument(arguments: &Value) -> Result<String, HandlerError> {
    arguments
        .get("text")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| HandlerError::invalid_params("Missing 'text' argument"))
}

fn text_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "text": {
                "type": "string",
                "description": "Text to echo back"
            }
        },
        "required": ["text"]
    })
}

pub struct EchoTool;

#[async_trait]
impl McpTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text"
    }

    fn input_schema(&self) -> Value {
        text_schema()
    }

    async fn call(&self, arguments: Value, _ctx: &ToolContext) -> HandlerResult {
        Ok(Value::String(text_argument(&arguments)?))
    }
}

/// Acknowledges at once and delivers the echo over the session's event stream
pub struct EchoLaterTool;

#[async_trait]
impl McpTool for EchoLaterTool {
    fn name(&self) -> &str {
        "echo_later"
    }

    fn description(&self) -> &str {
        "Echo the given text asynchronously over the session event stream"
    }

    fn input_schema(&self) -> Value {
        text_schema()
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> HandlerResult {
        let text = text_argument(&arguments)?;

        let Some(publisher) = ctx.publisher.clone().filter(|p| p.is_configured()) else {
            return Err(HandlerError::msg("No publish server configured"));
        };
        let Some(session_id) = ctx.session_id().map(String::from) else {
            return Err(HandlerError::invalid_params("Missing _meta.sessionId"));
        };

        let request_id = ctx.request_id().cloned();
        tokio::spawn(async move {
            publisher
                .publish_tool_result(&session_id, request_id, &text)
                .await;
        });

        Ok(json!("Result will be delivered on the event stream"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httmcp::mcp::ExecutionContext;

    fn ctx(session: Option<&str>) -> ToolContext {
        ToolContext {
            exec: ExecutionContext::new(session.map(String::from), Some(json!(1))),
            publisher: None,
        }
    }

    #[tokio::test]
    async fn test_echo() {
        let out = EchoTool.call(json!({"text": "hi"}), &ctx(None)).await.unwrap();
        assert_eq!(out, json!("hi"));

        let err = EchoTool.call(json!({}), &ctx(None)).await.unwrap_err();
        assert_eq!(err.normalize().code, -32602);
    }

    #[tokio::test]
    async fn test_echo_later_requires_publisher() {
        let err = EchoLaterTool
            .call(json!({"text": "hi"}), &ctx(Some("s1")))
            .await
            .unwrap_err();
        assert_eq!(err.message.as_deref(), Some("No publish server configured"));
    }
}
