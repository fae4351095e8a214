//! Scribe Core Library
//!
//! This crate provides the caching and orchestration layer that every
//! AI-backed operation in Scribe is routed through: a result cache with
//! freshness/staleness semantics and request collapsing, and a tool-chain
//! orchestrator that sequences, retries, times out, and parallelizes calls
//! to pluggable asynchronous tools.
//!
//! The two components are independent; a caller composes them by wrapping a
//! chain step's fetch in a cache lookup. Neither performs any I/O of its
//! own — both only wrap caller-supplied asynchronous operations.

pub mod cache;
pub mod error;
pub mod monitoring;
pub mod tools;

// Re-export commonly used types
pub use cache::{CacheMetrics, CacheOptions, CacheStrategy, FetchConfig, ResultCache};
pub use error::{ScribeError, ScribeResult};
pub use monitoring::{MetricsCollector, SystemMetrics, ToolMetrics};
pub use tools::{
    AiTool, BackoffKind, ChainResult, FnTool, RetryConfig, ToolChainStep, ToolError,
    ToolOrchestrator, ToolRegistry,
};
