//! Deckhand runtime: the conversation engine and its tool providers.
//!
//! The runtime is organized around these pieces:
//!
//! - **Backend**: a trait over the hosted model service, with an Anthropic
//!   Messages API implementation.
//! - **SessionRegistry**: connects MCP tool servers, merges their catalogs,
//!   and routes tool calls by name.
//! - **with_registry**: scoped startup and reverse-order teardown of every
//!   configured provider.
//! - **ConversationEngine**: runs one query to completion, alternating model
//!   turns and tool calls.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{
//!     AnthropicAuth, AnthropicBackend, ConversationEngine, McpConnector, RegistryOptions,
//!     with_registry,
//! };
//!
//! # async fn example() -> runtime::Result<()> {
//! let auth = AnthropicAuth::ApiKey("sk-ant-api01-...".into());
//! let backend = AnthropicBackend::builder(auth, "claude-sonnet-4-20250514").build();
//!
//! let transcript = with_registry(
//!     McpConnector::default(),
//!     RegistryOptions::default(),
//!     &[],
//!     async |registry| {
//!         let engine = ConversationEngine::new(backend, registry);
//!         engine.process_query("What is 2+2?").await
//!     },
//! )
//! .await??;
//! println!("{}", transcript.answer().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod lifecycle;
pub mod model;
pub mod providers;
mod registry;
#[cfg(test)]
mod testing;
pub mod tools;

pub use engine::{
    ConversationEngine, EngineEvent, EngineOptions, StopReason, Transcript, check_tool_pairing,
};
pub use error::{Error, Result};
pub use lifecycle::with_registry;
pub use model::{
    Backend, ContentBlock, Message, ModelError, ModelRequest, ModelResponse, ResponseBlock, Role,
    ToolResult, ToolSpec, ToolUse, Usage,
};
pub use providers::{AnthropicAuth, AnthropicBackend, AnthropicBackendBuilder};
pub use registry::{DEFAULT_TOOL_TIMEOUT, RegistryOptions, SessionRegistry};
pub use tools::{
    Connector, McpConnector, McpSession, ProviderConfig, ProviderError, ProviderSession,
    ToolError, ToolHost,
};
