//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for communicating with MCP servers via stdio:
//! newline-delimited JSON-RPC 2.0 written to the child's stdin and read back
//! from its stdout. One request is in flight per [`Server`] at a time.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{DEFAULT_TIMEOUT, Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig {
//!     name: "research".to_string(),
//!     command: "uv".to_string(),
//!     args: vec!["run".to_string(), "research_server.py".to_string()],
//!     ..Default::default()
//! };
//!
//! let server = Server::spawn(config).await?;
//! server.initialize(DEFAULT_TIMEOUT).await?;
//!
//! for tool in server.list_tools(DEFAULT_TIMEOUT).await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("topic".into(), "llm".into());
//! let result = server.call_tool("search_papers", Some(args)).await?;
//! println!("{}", result.text());
//!
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, EMPTY_RESULT_TEXT, EmbeddedResource, INVALID_PARAMS,
    InitializeParams, InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId, ServerCapabilities,
    ServerInfo, Tool, ToolContent,
};
pub use server::{DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, SHUTDOWN_GRACE, Server, ServerConfig};
