//! MCP-backed provider sessions.

use super::{Connector, ProviderConfig, ProviderError, ProviderSession, ToolError};
use crate::model::ToolSpec;
use mcp::{DEFAULT_TIMEOUT, Server};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Spawns stdio MCP servers and performs the handshake.
#[derive(Debug, Clone)]
pub struct McpConnector {
    handshake_timeout: Duration,
}

impl McpConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for McpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Connector for McpConnector {
    type Session = McpSession;

    async fn connect(&self, config: &ProviderConfig) -> Result<McpSession, ProviderError> {
        let server = Server::spawn(config.server.clone())
            .await
            .map_err(|e| ProviderError::Spawn(e.to_string()))?;

        match server.initialize(self.handshake_timeout).await {
            Ok(info) => {
                info!(
                    provider = %config.name(),
                    server = %info.server_info.name,
                    "connected to tool provider"
                );
                Ok(McpSession {
                    server,
                    request_timeout: self.handshake_timeout,
                })
            }
            Err(e) => {
                if let Err(close) = server.shutdown().await {
                    warn!(provider = %config.name(), error = %close, "failed to stop provider");
                }
                Err(ProviderError::Handshake(e.to_string()))
            }
        }
    }
}

/// A session with one MCP server subprocess.
pub struct McpSession {
    server: Server,
    request_timeout: Duration,
}

impl ProviderSession for McpSession {
    async fn discover(&self) -> Result<Vec<ToolSpec>, ProviderError> {
        let tools = self
            .server
            .list_tools(self.request_timeout)
            .await
            .map_err(|e| ProviderError::Discovery(e.to_string()))?;
        Ok(tools.into_iter().map(ToolSpec::from).collect())
    }

    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let result = self.server.call_tool(name, Some(arguments)).await?;
        Ok(result.text())
    }

    async fn shutdown(self) {
        let name = self.server.name().to_string();
        if let Err(e) = self.server.shutdown().await {
            warn!(provider = %name, error = %e, "failed to stop provider");
        }
    }
}
