//! Tool orchestration for AI-backed operations

pub mod base;
pub mod chain;
pub mod orchestrator;
pub mod registry;

#[cfg(test)]
mod tests;

pub use base::{AiTool, FnTool, ToolError};
pub use chain::{
    BackoffKind, ChainContext, ChainError, ChainResult, OrchestratorMetrics, ParallelOutcome,
    RetryConfig, StepResult, StepStatus, ToolChainStep,
};
pub use orchestrator::{OrchestratorConfig, ToolOrchestrator};
pub use registry::ToolRegistry;
