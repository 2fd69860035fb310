use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool execution.
///
/// These never abort a conversation; the engine turns them into an
/// error tool result the model can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("tool failed: {0}")]
    Application(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
}

impl ToolError {
    /// Short machine-readable failure class, used in logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "unknown_tool",
            Self::InvalidInput(_) => "invalid_input",
            Self::Transport(_) => "transport",
            Self::Application(_) => "application",
            Self::Timeout(_) => "timeout",
        }
    }
}

impl From<mcp::Error> for ToolError {
    fn from(err: mcp::Error) -> Self {
        match err {
            mcp::Error::ToolCallFailed(detail) => Self::Application(detail),
            mcp::Error::JsonRpc(e) if e.code == mcp::INVALID_PARAMS => {
                Self::InvalidInput(e.message)
            }
            mcp::Error::JsonRpc(e) => Self::Application(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// A tool provider could not be brought up.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to start: {0}")]
    Spawn(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("tool discovery failed: {0}")]
    Discovery(String),
}
