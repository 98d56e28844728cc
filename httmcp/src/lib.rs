//! MCP over plain HTTP.
//!
//! A client opens a session with `GET /`, learns its callback endpoint through a
//! publish/subscribe channel, then issues one stateless HTTP call per JSON-RPC
//! request. Calls are re-correlated to the session via the `X-MCP-Session-ID`
//! header.

pub mod api;
pub mod config;
pub mod error;
pub mod mcp;
pub mod metrics;

pub use config::Config;
pub use error::{Error, Result};
