use crate::model::ModelError;
use crate::tools::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The model round-trip failed; fatal for the current query.
    #[error("model service error: {0}")]
    Model(#[from] ModelError),

    /// A required tool provider could not be brought up.
    #[error("tool provider {name} unavailable: {source}")]
    ProviderUnavailable {
        name: String,
        #[source]
        source: ProviderError,
    },

    /// The conversation history is not well-formed for the next model call.
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
