//! Tool chain execution engine
//!
//! Executes ordered chains of tool invocations with per-step transforms,
//! timeout, retry with backoff, and error-handler fallback; runs tools in
//! parallel with isolated failure; and replays saved chains as named
//! workflows. `execute_chain` never returns an error itself — failure is
//! represented in the [`ChainResult`], not as an exception.

use crate::error::{ScribeError, ScribeResult};
use crate::tools::base::AiTool;
use crate::tools::chain::{
    ChainContext, ChainError, ChainResult, OrchestratorMetrics, ParallelOutcome, RetryConfig,
    StepResult, StepStatus, ToolChainStep,
};
use crate::tools::registry::ToolRegistry;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use uuid::Uuid;

/// Construction-time orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-attempt deadline applied when a step specifies none
    pub default_timeout: Duration,
    /// Maximum number of chain results kept in the history buffer
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(30_000),
            history_limit: 100,
        }
    }
}

/// Registry of named tools plus the engine that executes chains of them
///
/// Instances are constructed explicitly and shared by whatever composition
/// root wires up the callers; there is no implicit process-wide
/// orchestrator. The orchestrator has no knowledge of any cache — a caller
/// may wrap any step's fetch in a cache lookup.
pub struct ToolOrchestrator {
    registry: ToolRegistry,
    workflows: DashMap<String, Vec<ToolChainStep>>,
    history: Mutex<VecDeque<ChainResult>>,
    config: OrchestratorConfig,
}

impl ToolOrchestrator {
    /// Create an orchestrator with default settings
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    /// Create an orchestrator with custom settings
    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self {
            registry: ToolRegistry::new(),
            workflows: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Register a tool under its own name, replacing any previous entry
    pub fn register_tool(&self, tool: Arc<dyn AiTool>) {
        debug!(tool = tool.name(), "registered tool");
        self.registry.register(tool);
    }

    /// Names of all registered tools
    pub fn registered_tools(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// The underlying tool registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `steps` strictly in order
    ///
    /// Step *i*'s input is the previous step's (possibly transformed)
    /// output, or `initial_input` for the first step. A step failure runs
    /// its error handler if present; otherwise the chain halts and the
    /// remaining steps are recorded as skipped.
    pub async fn execute_chain(&self, steps: &[ToolChainStep], initial_input: Value) -> ChainResult {
        let started = Instant::now();
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut step_results: HashMap<String, StepResult> = HashMap::new();
        let mut errors: Vec<ChainError> = Vec::new();
        let mut current = initial_input.clone();
        let mut final_output: Option<Value> = None;
        let mut success = true;

        for (index, step) in steps.iter().enumerate() {
            let context = ChainContext {
                step_index: index,
                step_id: step.id.clone(),
                tool_name: step.tool.clone(),
                previous_outputs: outputs.clone(),
                initial_input: initial_input.clone(),
                started_at: started,
            };

            let step_started = Instant::now();
            let (outcome, attempts) = self
                .run_step(step, current.clone(), &context, &mut errors)
                .await;
            let step_duration = step_started.elapsed().as_millis() as u64;

            let output = match outcome {
                Ok(output) => output,
                Err(error) => match &step.error_handler {
                    Some(handler) => match handler(&error, &context) {
                        Ok(fallback) => {
                            debug!(step = %step.id, "error handler produced fallback output");
                            fallback
                        }
                        Err(handler_error) => {
                            errors.push(ChainError {
                                step_id: step.id.clone(),
                                tool_name: step.tool.clone(),
                                error: handler_error.to_string(),
                                attempt: attempts,
                            });
                            warn!(step = %step.id, error = %handler_error, "error handler failed");
                            step_results.insert(
                                step.id.clone(),
                                StepResult {
                                    status: StepStatus::Error,
                                    output: None,
                                    error: Some(handler_error.to_string()),
                                    duration_ms: step_duration,
                                    attempts,
                                },
                            );
                            success = false;
                            mark_skipped(&mut step_results, &steps[index + 1..]);
                            break;
                        }
                    },
                    None => {
                        step_results.insert(
                            step.id.clone(),
                            StepResult {
                                status: StepStatus::Error,
                                output: None,
                                error: Some(error.to_string()),
                                duration_ms: step_duration,
                                attempts,
                            },
                        );
                        success = false;
                        mark_skipped(&mut step_results, &steps[index + 1..]);
                        break;
                    }
                },
            };

            // Success, directly or via the handler's fallback
            outputs.insert(step.id.clone(), output.clone());
            step_results.insert(
                step.id.clone(),
                StepResult {
                    status: StepStatus::Success,
                    output: Some(output.clone()),
                    error: None,
                    duration_ms: step_duration,
                    attempts,
                },
            );
            final_output = Some(output.clone());
            current = output;
        }

        let result = ChainResult {
            id: Uuid::new_v4(),
            success,
            steps: step_results,
            final_output,
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
            executed_at: Utc::now(),
        };
        self.record(result.clone()).await;
        result
    }

    /// Invoke every named tool concurrently with the same input
    ///
    /// Each tool's outcome is isolated: one failure does not cancel or
    /// affect the others. Resolves only once every tool has settled.
    pub async fn execute_parallel(
        &self,
        tool_names: &[String],
        input: Value,
    ) -> HashMap<String, ParallelOutcome> {
        let tasks = tool_names.iter().map(|name| {
            let name = name.clone();
            let input = input.clone();
            let tool = self.registry.get(&name);
            async move {
                let started = Instant::now();
                let outcome = match tool {
                    Some(tool) => match tool.execute(input, None).await {
                        Ok(output) => ParallelOutcome {
                            success: true,
                            output: Some(output),
                            error: None,
                            duration_ms: started.elapsed().as_millis() as u64,
                        },
                        Err(error) => ParallelOutcome {
                            success: false,
                            output: None,
                            error: Some(error.to_string()),
                            duration_ms: started.elapsed().as_millis() as u64,
                        },
                    },
                    None => ParallelOutcome {
                        success: false,
                        output: None,
                        error: Some(ScribeError::ToolNotFound(name.clone()).to_string()),
                        duration_ms: 0,
                    },
                };
                (name, outcome)
            }
        });
        futures::future::join_all(tasks).await.into_iter().collect()
    }

    /// Save a named step sequence for reuse
    pub fn create_workflow(&self, name: impl Into<String>, steps: Vec<ToolChainStep>) {
        let name = name.into();
        debug!(workflow = %name, steps = steps.len(), "created workflow");
        self.workflows.insert(name, steps);
    }

    /// Execute a previously created workflow
    pub async fn execute_workflow(&self, name: &str, input: Value) -> ScribeResult<ChainResult> {
        let steps = self
            .workflows
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ScribeError::WorkflowNotFound(name.to_string()))?;
        Ok(self.execute_chain(&steps, input).await)
    }

    /// Names of all saved workflows
    pub fn workflows(&self) -> Vec<String> {
        self.workflows
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Most recent chain results, newest first
    pub async fn history(&self, limit: usize) -> Vec<ChainResult> {
        let history = self.history.lock().await;
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Drop the execution history
    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Metrics derived from the bounded execution history
    pub async fn metrics(&self) -> OrchestratorMetrics {
        let history = self.history.lock().await;
        let total_executions = history.len() as u64;
        let successful_executions = history.iter().filter(|result| result.success).count() as u64;
        let durations: Vec<u64> = history.iter().map(|result| result.duration_ms).collect();
        let average_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };
        OrchestratorMetrics {
            total_executions,
            successful_executions,
            average_duration_ms,
            min_duration_ms: durations.iter().copied().min().unwrap_or(0),
            max_duration_ms: durations.iter().copied().max().unwrap_or(0),
            recent_errors: history
                .iter()
                .flat_map(|result| result.errors.iter().cloned())
                .collect(),
        }
    }

    /// Run one step through its transforms, timeout, and retry budget
    ///
    /// Every failed attempt is appended to `errors`; only the last
    /// attempt's error is returned.
    async fn run_step(
        &self,
        step: &ToolChainStep,
        input: Value,
        context: &ChainContext,
        errors: &mut Vec<ChainError>,
    ) -> (ScribeResult<Value>, u32) {
        let tool = match self.registry.get(&step.tool) {
            Some(tool) => tool,
            None => {
                let error = ScribeError::ToolNotFound(step.tool.clone());
                errors.push(ChainError {
                    step_id: step.id.clone(),
                    tool_name: step.tool.clone(),
                    error: error.to_string(),
                    attempt: 1,
                });
                return (Err(error), 1);
            }
        };

        let input = match &step.input_transform {
            Some(transform) => match transform(input, context) {
                Ok(value) => value,
                Err(error) => {
                    errors.push(ChainError {
                        step_id: step.id.clone(),
                        tool_name: step.tool.clone(),
                        error: error.to_string(),
                        attempt: 1,
                    });
                    return (Err(error), 1);
                }
            },
            None => input,
        };

        let deadline = step.timeout.unwrap_or(self.config.default_timeout);
        let retry = step.retry.unwrap_or(RetryConfig {
            max_attempts: 1,
            backoff: Default::default(),
        });
        let max_attempts = retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let attempt_result =
                match timeout(deadline, tool.execute(input.clone(), step.config.as_ref())).await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(tool_error)) => {
                        Err(ScribeError::tool(&step.tool, tool_error.to_string()))
                    }
                    Err(_) => Err(ScribeError::timeout(deadline.as_millis() as u64)),
                };

            match attempt_result {
                Ok(output) => {
                    if attempt > 1 {
                        debug!(step = %step.id, attempt, "step succeeded after retry");
                    }
                    let output = match &step.output_transform {
                        Some(transform) => match transform(output, context) {
                            Ok(value) => value,
                            Err(error) => {
                                errors.push(ChainError {
                                    step_id: step.id.clone(),
                                    tool_name: step.tool.clone(),
                                    error: error.to_string(),
                                    attempt,
                                });
                                return (Err(error), attempt);
                            }
                        },
                        None => output,
                    };
                    return (Ok(output), attempt);
                }
                Err(error) => {
                    errors.push(ChainError {
                        step_id: step.id.clone(),
                        tool_name: step.tool.clone(),
                        error: error.to_string(),
                        attempt,
                    });
                    last_error = Some(error);
                    if attempt < max_attempts {
                        let delay = retry.delay_after(attempt);
                        warn!(
                            step = %step.id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "step failed, retrying"
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| ScribeError::tool(&step.tool, "no attempts were executed"));
        (Err(error), max_attempts)
    }

    async fn record(&self, result: ChainResult) {
        let mut history = self.history.lock().await;
        history.push_back(result);
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }
}

impl Default for ToolOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn mark_skipped(step_results: &mut HashMap<String, StepResult>, remaining: &[ToolChainStep]) {
    for step in remaining {
        step_results.insert(
            step.id.clone(),
            StepResult {
                status: StepStatus::Skipped,
                output: None,
                error: None,
                duration_ms: 0,
                attempts: 0,
            },
        );
    }
}
