//! HTTP surface: session lifecycle and one POST route per MCP method

pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
