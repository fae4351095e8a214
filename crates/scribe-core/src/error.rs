//! Error types for the Scribe core

use thiserror::Error;

/// Result type alias for Scribe core operations
pub type ScribeResult<T> = Result<T, ScribeError>;

/// Main error type for the caching and orchestration layer
#[derive(Error, Debug, Clone)]
pub enum ScribeError {
    /// Cache related errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Tool execution errors
    #[error("Tool error: {tool_name}: {message}")]
    Tool { tool_name: String, message: String },

    /// A chain or parallel call referenced an unknown tool name
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A workflow name was executed before being created
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A step's deadline elapsed before the tool settled
    #[error("Execution timed out after {ms} ms")]
    Timeout { ms: u64 },

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl ScribeError {
    /// Create a new cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a new tool error
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub const fn timeout(ms: u64) -> Self {
        Self::Timeout { ms }
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<anyhow::Error> for ScribeError {
    fn from(error: anyhow::Error) -> Self {
        Self::Other(error.to_string())
    }
}

impl From<serde_json::Error> for ScribeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}
