//! Base trait and types for orchestrated tools

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Error type for tool implementations
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid arguments provided to the tool
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Tool execution failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Tool execution timeout
    #[error("Tool execution timeout")]
    Timeout,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Base trait for all orchestrated tools
///
/// A tool is any caller-supplied asynchronous operation — typically a
/// remote AI call — addressed by name in chains, workflows, and parallel
/// execution. This is the only contract external code must satisfy.
#[async_trait]
pub trait AiTool: Send + Sync {
    /// Unique name used to address the tool
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Execute the tool against an input payload
    ///
    /// `config` carries the step-local configuration of the chain step
    /// being executed, if any.
    async fn execute(&self, input: Value, config: Option<&Value>) -> Result<Value, ToolError>;
}

/// Adapter that turns an async closure into an [`AiTool`]
///
/// ```rust
/// use scribe_core::tools::FnTool;
/// use serde_json::json;
///
/// let summarize = FnTool::new("summarize", |input| async move {
///     Ok(json!({ "summary": input["text"] }))
/// });
/// ```
pub struct FnTool<F> {
    name: String,
    description: String,
    func: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    /// Wrap an async closure as a named tool
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            func,
        }
    }

    /// Set the tool description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl<F, Fut> AiTool for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, input: Value, _config: Option<&Value>) -> Result<Value, ToolError> {
        (self.func)(input).await
    }
}
