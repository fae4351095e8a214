//! Chain step descriptions and execution results

use crate::error::{ScribeError, ScribeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Transform applied to a step's input or output payload
pub type StepTransform = Arc<dyn Fn(Value, &ChainContext) -> ScribeResult<Value> + Send + Sync>;

/// Fallback invoked when a step has exhausted its retries
///
/// The returned value becomes the step's output and the chain continues;
/// an error here halts the chain.
pub type StepErrorHandler =
    Arc<dyn Fn(&ScribeError, &ChainContext) -> ScribeResult<Value> + Send + Sync>;

/// Backoff shape between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// `min(1000 * 2^(attempt-1), 30000)` ms
    #[default]
    Exponential,
    /// `attempt * 1000` ms
    Linear,
}

/// Retry policy for a single chain step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Backoff shape between attempts
    pub backoff: BackoffKind,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with the given attempt budget
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffKind::Exponential,
        }
    }

    /// Linear backoff with the given attempt budget
    pub fn linear(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffKind::Linear,
        }
    }

    /// Delay before the next attempt, given the 1-based attempt that just
    /// failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffKind::Linear => Duration::from_millis(u64::from(attempt) * 1_000),
            BackoffKind::Exponential => {
                let exponent = attempt.saturating_sub(1).min(63);
                let ms = 1_000u64.saturating_mul(1u64 << exponent);
                Duration::from_millis(ms.min(30_000))
            }
        }
    }
}

/// One step of a tool chain
///
/// Immutable description of a single invocation: which tool to call, how
/// to shape its input and output, and how to recover when it fails.
#[derive(Clone)]
pub struct ToolChainStep {
    /// Step identifier, unique within the chain
    pub id: String,
    /// Name of the tool to invoke
    pub tool: String,
    /// Step-local configuration passed through to the tool
    pub config: Option<Value>,
    /// Applied to the step input before invocation
    pub input_transform: Option<StepTransform>,
    /// Applied to the tool output after invocation
    pub output_transform: Option<StepTransform>,
    /// Fallback invoked after retries are exhausted
    pub error_handler: Option<StepErrorHandler>,
    /// Per-attempt deadline; the orchestrator default applies when unset
    pub timeout: Option<Duration>,
    /// Retry policy; a single attempt when unset
    pub retry: Option<RetryConfig>,
}

impl ToolChainStep {
    /// Create a step invoking `tool`, with no transforms or retry
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            config: None,
            input_transform: None,
            output_transform: None,
            error_handler: None,
            timeout: None,
            retry: None,
        }
    }

    /// Set the step-local tool configuration
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the input transform
    pub fn with_input_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value, &ChainContext) -> ScribeResult<Value> + Send + Sync + 'static,
    {
        self.input_transform = Some(Arc::new(transform));
        self
    }

    /// Set the output transform
    pub fn with_output_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value, &ChainContext) -> ScribeResult<Value> + Send + Sync + 'static,
    {
        self.output_transform = Some(Arc::new(transform));
        self
    }

    /// Set the error handler
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ScribeError, &ChainContext) -> ScribeResult<Value> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

impl fmt::Debug for ToolChainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolChainStep")
            .field("id", &self.id)
            .field("tool", &self.tool)
            .field("config", &self.config)
            .field("input_transform", &self.input_transform.is_some())
            .field("output_transform", &self.output_transform.is_some())
            .field("error_handler", &self.error_handler.is_some())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Read-only snapshot passed to transforms and error handlers
#[derive(Debug, Clone)]
pub struct ChainContext {
    /// Zero-based index of the current step
    pub step_index: usize,
    /// Identifier of the current step
    pub step_id: String,
    /// Name of the tool being invoked
    pub tool_name: String,
    /// Outputs of all prior steps, keyed by step id
    pub previous_outputs: HashMap<String, Value>,
    /// The chain's original input
    pub initial_input: Value,
    /// When the chain started
    pub started_at: Instant,
}

/// Outcome status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step produced an output, possibly via its error handler
    Success,
    /// The step failed and halted the chain
    Error,
    /// The step never ran because an earlier step halted the chain
    Skipped,
}

/// Result of a single chain step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Outcome status
    pub status: StepStatus,
    /// Step output, present on success
    pub output: Option<Value>,
    /// Error message, present on failure
    pub error: Option<String>,
    /// Elapsed time for the step, all attempts included
    pub duration_ms: u64,
    /// Number of attempts made
    pub attempts: u32,
}

/// One recorded step failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainError {
    /// Step that failed
    pub step_id: String,
    /// Tool that was invoked
    pub tool_name: String,
    /// Error message
    pub error: String,
    /// 1-based attempt number that produced this error
    pub attempt: u32,
}

/// Outcome of a whole chain execution
///
/// Immutable once returned; recorded into the orchestrator's bounded
/// execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    /// Unique id of this execution
    pub id: Uuid,
    /// Whether every step completed (directly or via a fallback)
    pub success: bool,
    /// Per-step results, keyed by step id
    pub steps: HashMap<String, StepResult>,
    /// Output of the last successfully completed or fallback-produced step
    pub final_output: Option<Value>,
    /// Total elapsed time
    pub duration_ms: u64,
    /// Every recorded step failure, in order of occurrence
    pub errors: Vec<ChainError>,
    /// Wall-clock time the chain was executed
    pub executed_at: DateTime<Utc>,
}

/// Outcome of one tool in a parallel execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelOutcome {
    /// Whether the tool settled successfully
    pub success: bool,
    /// Tool output, present on success
    pub output: Option<Value>,
    /// Error message, present on failure
    pub error: Option<String>,
    /// Elapsed time for this tool
    pub duration_ms: u64,
}

/// Metrics derived from the orchestrator's bounded execution history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    /// Executions currently held in the history buffer
    pub total_executions: u64,
    /// Of those, how many succeeded
    pub successful_executions: u64,
    /// Mean chain duration
    pub average_duration_ms: f64,
    /// Fastest chain duration
    pub min_duration_ms: u64,
    /// Slowest chain duration
    pub max_duration_ms: u64,
    /// Flattened step failures across the history buffer
    pub recent_errors: Vec<ChainError>,
}

impl OrchestratorMetrics {
    /// Fraction of recorded executions that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}
