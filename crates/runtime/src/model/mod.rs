//! LLM protocol types and backend trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, ContentBlock, Message, ModelRequest, ModelResponse, ResponseBlock, Role, ToolResult,
    ToolSpec, ToolUse, Usage,
};
