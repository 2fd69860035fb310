//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn server: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("pipe to server failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("server not initialized")]
    NotInitialized,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("failed to encode or decode message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("output line exceeds {max} bytes")]
    OutputTooLarge { max: usize },

    #[error("an interrupted write left the stream out of sync")]
    Desynchronized,
}

impl Error {
    /// Whether the server itself reported the failure, as opposed to the
    /// pipe or the framing breaking down.
    pub fn is_application(&self) -> bool {
        matches!(self, Self::JsonRpc(_) | Self::ToolCallFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
