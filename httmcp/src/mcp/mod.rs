//! MCP (Model Context Protocol) over stateless HTTP
//!
//! This module provides:
//! - Dispatcher: method lookup, invocation and outcome normalization
//! - HandlerRegistry: method-name to handler bindings
//! - ChannelPublisher: best-effort delivery to a session's event stream
//! - ToolRegistry: extensible tool registration for `tools/*`

pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod inflight;
pub mod normalize;
pub mod publisher;
pub mod registry;
pub mod tools;

pub use context::ExecutionContext;
pub use dispatch::Dispatcher;
pub use envelope::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use publisher::ChannelPublisher;
pub use registry::{handler_fn, HandlerError, HandlerRegistry, HandlerResult, RequestHandler};
pub use tools::{McpTool, ToolContext, ToolRegistry};
