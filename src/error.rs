//! Error types for Gardenbook chat

use thiserror::Error;

/// Result type alias for Gardenbook chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving a chat request.
///
/// Degradable conditions (an unreachable user-data service, an unknown
/// timezone) are not represented here; they travel as
/// [`Resolved`](crate::fallback::Resolved) values instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    /// Tool provider failed to start or to list its capabilities.
    #[error("Failed to create agent: {0}")]
    Session(String),

    /// The agent failed while reasoning or calling tools.
    #[error("Agent invocation failed: {0}")]
    Invocation(String),

    #[error("Agent session already released")]
    SessionReleased,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Max iterations reached")]
    MaxIterations,

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
