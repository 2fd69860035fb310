//! Provider sessions: one live connection to one tool provider.

use crate::model::ToolSpec;
use crate::tools::{ProviderError, ToolError};
use mcp::ServerConfig;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::future::Future;

/// How to launch one tool provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(flatten)]
    pub server: ServerConfig,

    /// Abort registration instead of skipping when this provider fails.
    #[serde(default)]
    pub required: bool,
}

impl ProviderConfig {
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.server.name
    }
}

/// A connected tool provider.
///
/// Implementations serialize their own calls: at most one request is on
/// the wire per session.
pub trait ProviderSession: Send + Sync {
    /// Fetch the provider's tools, in declaration order.
    fn discover(&self) -> impl Future<Output = Result<Vec<ToolSpec>, ProviderError>> + Send;

    /// Invoke one tool and wait for its textual result.
    fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;

    /// Close the connection and terminate the provider.
    fn shutdown(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Brings provider sessions up from configuration.
pub trait Connector: Send + Sync {
    type Session: ProviderSession;

    fn connect(
        &self,
        config: &ProviderConfig,
    ) -> impl Future<Output = Result<Self::Session, ProviderError>> + Send;
}
