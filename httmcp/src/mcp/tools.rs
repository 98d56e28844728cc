//! MCP tool registry and the standard method handlers

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::context::ExecutionContext;
use super::envelope::JsonRpcRequest;
use super::publisher::ChannelPublisher;
use super::registry::{HandlerError, HandlerRegistry, HandlerResult, RequestHandler};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Context passed to tool calls
pub struct ToolContext {
    pub exec: ExecutionContext,
    /// Set when a publish server is configured; lets tools push results later
    pub publisher: Option<Arc<ChannelPublisher>>,
}

impl ToolContext {
    pub fn session_id(&self) -> Option<&str> {
        self.exec.session_id()
    }

    pub fn request_id(&self) -> Option<&Value> {
        self.exec.request_id()
    }
}

/// Trait for MCP tools
#[async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (used in tools/call)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn call(&self, arguments: Value, ctx: &ToolContext) -> HandlerResult;
}

/// Registry of available MCP tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn McpTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn McpTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// List all tools in MCP format, sorted by name
    pub fn list(&self) -> Vec<Value> {
        let mut tools: Vec<&Arc<dyn McpTool>> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
            .into_iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "inputSchema": t.input_schema()
                })
            })
            .collect()
    }

    /// Call a tool by name
    pub async fn call(&self, name: &str, arguments: Value, ctx: &ToolContext) -> HandlerResult {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| HandlerError::invalid_params(format!("Unknown tool: {}", name)))?;

        tool.call(arguments, ctx).await
    }

    /// Get tool count
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Wrap a tool's return value as a tool-call result unless it already is one
fn tool_result(value: Value) -> Value {
    if value.get("content").is_some_and(Value::is_array) {
        return value;
    }
    let text = match value {
        Value::String(text) => text,
        other => serde_json::to_string_pretty(&other).unwrap_or_default(),
    };
    json!({
        "content": [{
            "type": "text",
            "text": text
        }]
    })
}

/// Name and version reported by `initialize`
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

struct InitializeHandler {
    info: ServerInfo,
}

#[async_trait]
impl RequestHandler for InitializeHandler {
    async fn handle(&self, _request: JsonRpcRequest, _ctx: ExecutionContext) -> HandlerResult {
        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {}
            },
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version
            }
        }))
    }
}

struct ListToolsHandler {
    tools: Arc<ToolRegistry>,
}

#[async_trait]
impl RequestHandler for ListToolsHandler {
    async fn handle(&self, _request: JsonRpcRequest, _ctx: ExecutionContext) -> HandlerResult {
        Ok(json!({ "tools": self.tools.list() }))
    }
}

struct CallToolHandler {
    tools: Arc<ToolRegistry>,
    publisher: Option<Arc<ChannelPublisher>>,
}

#[async_trait]
impl RequestHandler for CallToolHandler {
    async fn handle(&self, request: JsonRpcRequest, ctx: ExecutionContext) -> HandlerResult {
        let params = request
            .params
            .ok_or_else(|| HandlerError::invalid_params("Missing params"))?;

        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerError::invalid_params("Missing tool name"))?;

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let ctx = ToolContext {
            exec: ctx,
            publisher: self.publisher.clone(),
        };

        let value = self.tools.call(name, arguments, &ctx).await?;
        Ok(tool_result(value))
    }
}

/// Answers a listing method with an empty collection under `key`
struct EmptyListHandler {
    key: &'static str,
}

#[async_trait]
impl RequestHandler for EmptyListHandler {
    async fn handle(&self, _request: JsonRpcRequest, _ctx: ExecutionContext) -> HandlerResult {
        let mut body = serde_json::Map::new();
        body.insert(self.key.to_string(), Value::Array(Vec::new()));
        Ok(Value::Object(body))
    }
}

/// Bind `initialize`, the tool methods and the empty resource/prompt listings.
///
/// `resources/read` and `prompts/get` stay unbound and resolve as method not found.
pub fn register_standard_handlers(
    registry: &mut HandlerRegistry,
    info: ServerInfo,
    tools: Arc<ToolRegistry>,
    publisher: Option<Arc<ChannelPublisher>>,
) {
    registry.register("initialize", Arc::new(InitializeHandler { info }));
    registry.register(
        "tools/list",
        Arc::new(ListToolsHandler {
            tools: tools.clone(),
        }),
    );
    registry.register("tools/call", Arc::new(CallToolHandler { tools, publisher }));
    registry.register("resources/list", Arc::new(EmptyListHandler { key: "resources" }));
    registry.register(
        "resources/templates/list",
        Arc::new(EmptyListHandler {
            key: "resourceTemplates",
        }),
    );
    registry.register("prompts/list", Arc::new(EmptyListHandler { key: "prompts" }));
}
