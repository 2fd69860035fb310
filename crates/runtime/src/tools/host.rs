//! Tool host trait.

use crate::model::{ToolSpec, ToolUse};
use crate::tools::ToolError;
use std::future::Future;

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute tool calls.
/// This is the boundary between the model loop and side effects.
pub trait ToolHost: Send + Sync {
    /// The catalog handed to the model, in a stable order.
    fn specs(&self) -> &[ToolSpec];

    /// Execute a tool call, returning the text to send back to the model.
    fn execute(&self, call: &ToolUse) -> impl Future<Output = Result<String, ToolError>> + Send;
}

impl<T: ToolHost> ToolHost for &T {
    fn specs(&self) -> &[ToolSpec] {
        (**self).specs()
    }

    fn execute(&self, call: &ToolUse) -> impl Future<Output = Result<String, ToolError>> + Send {
        (**self).execute(call)
    }
}
