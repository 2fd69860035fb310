//! Tool providers: sessions, the host trait, and MCP integration.

pub mod errors;
mod host;
mod mcp_host;
mod session;

pub use errors::{ProviderError, ToolError};
pub use host::ToolHost;
pub use mcp_host::{McpConnector, McpSession};
pub use session::{Connector, ProviderConfig, ProviderSession};
