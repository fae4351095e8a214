//! Orchestrator tests

use super::*;
use crate::error::ScribeError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fails a fixed number of times, then echoes its input
struct FlakyTool {
    name: String,
    failures_before_success: usize,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AiTool for FlakyTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: Value, _config: Option<&Value>) -> Result<Value, ToolError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            Err(ToolError::ExecutionFailed("transient failure".to_string()))
        } else {
            Ok(input)
        }
    }
}

fn echo_tool(name: &str) -> Arc<dyn AiTool> {
    Arc::new(FnTool::new(name, |input| async move { Ok(input) }))
}

fn fail_tool(name: &str) -> Arc<dyn AiTool> {
    Arc::new(FnTool::new(name, |_input| async move {
        Err(ToolError::ExecutionFailed("broken".to_string()))
    }))
}

#[tokio::test]
async fn test_chain_feeds_outputs_forward() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(Arc::new(FnTool::new("wrap", |input| async move {
        Ok(json!({ "wrapped": input }))
    })));
    orchestrator.register_tool(echo_tool("echo"));

    let steps = vec![
        ToolChainStep::new("first", "wrap"),
        ToolChainStep::new("second", "echo"),
    ];
    let result = orchestrator.execute_chain(&steps, json!("seed")).await;

    assert!(result.success);
    assert_eq!(result.final_output, Some(json!({ "wrapped": "seed" })));
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps["first"].status, StepStatus::Success);
    assert_eq!(result.steps["second"].status, StepStatus::Success);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_unhandled_failure_halts_chain() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(echo_tool("echo"));
    orchestrator.register_tool(fail_tool("fail"));

    let steps = vec![
        ToolChainStep::new("a", "echo"),
        ToolChainStep::new("b", "fail"),
        ToolChainStep::new("c", "echo"),
    ];
    let result = orchestrator.execute_chain(&steps, json!(1)).await;

    assert!(!result.success);
    assert_eq!(result.steps["a"].status, StepStatus::Success);
    assert_eq!(result.steps["b"].status, StepStatus::Error);
    assert_eq!(result.steps["c"].status, StepStatus::Skipped);
    // Final output is the last step that completed
    assert_eq!(result.final_output, Some(json!(1)));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].step_id, "b");
}

#[tokio::test]
async fn test_error_handler_recovers_and_chain_continues() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(echo_tool("echo"));
    orchestrator.register_tool(fail_tool("fail"));

    let steps = vec![
        ToolChainStep::new("a", "echo"),
        ToolChainStep::new("b", "fail").with_error_handler(|_error, _context| {
            Ok(json!("fallback"))
        }),
        ToolChainStep::new("c", "echo"),
    ];
    let result = orchestrator.execute_chain(&steps, json!(1)).await;

    assert!(result.success);
    assert_eq!(result.steps["b"].status, StepStatus::Success);
    assert_eq!(result.steps["b"].output, Some(json!("fallback")));
    assert_eq!(result.steps["c"].status, StepStatus::Success);
    assert_eq!(result.final_output, Some(json!("fallback")));
    // The failure is still on the record
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn test_failing_error_handler_halts_chain() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(echo_tool("echo"));
    orchestrator.register_tool(fail_tool("fail"));

    let steps = vec![
        ToolChainStep::new("a", "echo"),
        ToolChainStep::new("b", "fail").with_error_handler(|_error, _context| {
            Err(ScribeError::Other("handler broke too".to_string()))
        }),
        ToolChainStep::new("c", "echo"),
    ];
    let result = orchestrator.execute_chain(&steps, json!(1)).await;

    assert!(!result.success);
    assert_eq!(result.steps["b"].status, StepStatus::Error);
    assert_eq!(result.steps["c"].status, StepStatus::Skipped);
    // One error for the step failure, one for the handler failure
    assert_eq!(result.errors.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_succeeds_after_transient_failures() {
    let orchestrator = ToolOrchestrator::new();
    let calls = Arc::new(AtomicUsize::new(0));
    orchestrator.register_tool(Arc::new(FlakyTool {
        name: "flaky".to_string(),
        failures_before_success: 2,
        calls: calls.clone(),
    }));

    let steps =
        vec![ToolChainStep::new("only", "flaky").with_retry(RetryConfig::linear(3))];
    let result = orchestrator.execute_chain(&steps, json!("in")).await;

    assert!(result.success);
    assert_eq!(result.steps["only"].attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Both failed attempts are recorded
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.errors[0].attempt, 1);
    assert_eq!(result.errors[1].attempt, 2);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_surfaces_last_error() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(fail_tool("fail"));

    let steps = vec![ToolChainStep::new("only", "fail").with_retry(RetryConfig::new(2))];
    let result = orchestrator.execute_chain(&steps, json!(1)).await;

    assert!(!result.success);
    assert_eq!(result.steps["only"].attempts, 2);
    assert_eq!(result.errors.len(), 2);
    assert!(result.steps["only"]
        .error
        .as_ref()
        .unwrap()
        .contains("broken"));
}

#[test]
fn test_backoff_delays() {
    let exponential = RetryConfig::new(8);
    assert_eq!(exponential.delay_after(1), Duration::from_millis(1_000));
    assert_eq!(exponential.delay_after(2), Duration::from_millis(2_000));
    assert_eq!(exponential.delay_after(3), Duration::from_millis(4_000));
    // Capped at 30 seconds
    assert_eq!(exponential.delay_after(7), Duration::from_millis(30_000));

    let linear = RetryConfig::linear(3);
    assert_eq!(linear.delay_after(1), Duration::from_millis(1_000));
    assert_eq!(linear.delay_after(2), Duration::from_millis(2_000));
}

#[tokio::test(start_paused = true)]
async fn test_step_timeout_is_a_failure() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(Arc::new(FnTool::new("slow", |input| async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(input)
    })));

    let steps =
        vec![ToolChainStep::new("s", "slow").with_timeout(Duration::from_millis(100))];
    let result = orchestrator.execute_chain(&steps, json!(1)).await;

    assert!(!result.success);
    assert!(result.steps["s"]
        .error
        .as_ref()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn test_unregistered_tool_halts_chain() {
    let orchestrator = ToolOrchestrator::new();

    let steps = vec![ToolChainStep::new("s", "ghost")];
    let result = orchestrator.execute_chain(&steps, json!(1)).await;

    assert!(!result.success);
    assert!(result.errors[0].error.contains("Tool not found"));
}

#[tokio::test]
async fn test_input_transform_shapes_step_input() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(Arc::new(FnTool::new("emit", |_input| async move {
        Ok(json!({ "n": 2 }))
    })));
    orchestrator.register_tool(Arc::new(FnTool::new("times-ten", |input| async move {
        let n = input["n"].as_i64().unwrap_or(0);
        Ok(json!(n * 10))
    })));

    let steps = vec![
        ToolChainStep::new("produce", "emit"),
        ToolChainStep::new("scale", "times-ten").with_input_transform(|value, _context| {
            let n = value["n"].as_i64().unwrap_or(0);
            Ok(json!({ "n": n * 2 }))
        }),
    ];
    let result = orchestrator.execute_chain(&steps, json!(null)).await;

    assert!(result.success);
    assert_eq!(result.final_output, Some(json!(40)));
}

#[tokio::test]
async fn test_output_transform_shapes_step_output() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(echo_tool("echo"));

    let steps = vec![ToolChainStep::new("only", "echo").with_output_transform(
        |value, _context| Ok(json!({ "annotated": value })),
    )];
    let result = orchestrator.execute_chain(&steps, json!("raw")).await;

    assert_eq!(result.final_output, Some(json!({ "annotated": "raw" })));
}

#[tokio::test]
async fn test_context_exposes_previous_outputs() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(Arc::new(FnTool::new("emit", |_input| async move {
        Ok(json!("first output"))
    })));
    orchestrator.register_tool(echo_tool("echo"));

    let steps = vec![
        ToolChainStep::new("produce", "emit"),
        ToolChainStep::new("inspect", "echo").with_input_transform(|_value, context| {
            assert_eq!(context.step_index, 1);
            assert_eq!(context.initial_input, json!("seed"));
            Ok(context.previous_outputs["produce"].clone())
        }),
    ];
    let result = orchestrator.execute_chain(&steps, json!("seed")).await;

    assert_eq!(result.final_output, Some(json!("first output")));
}

#[tokio::test]
async fn test_parallel_isolates_failures() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(fail_tool("t1"));
    orchestrator.register_tool(echo_tool("t2"));

    let results = orchestrator
        .execute_parallel(&["t1".to_string(), "t2".to_string()], json!("in"))
        .await;

    assert_eq!(results.len(), 2);
    assert!(!results["t1"].success);
    assert!(results["t1"].error.as_ref().unwrap().contains("broken"));
    assert!(results["t2"].success);
    assert_eq!(results["t2"].output, Some(json!("in")));
}

#[tokio::test]
async fn test_parallel_unknown_tool_gets_error_slot() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(echo_tool("known"));

    let results = orchestrator
        .execute_parallel(&["known".to_string(), "ghost".to_string()], json!(1))
        .await;

    assert!(results["known"].success);
    assert!(results["ghost"].error.as_ref().unwrap().contains("Tool not found"));
}

#[tokio::test]
async fn test_workflow_roundtrip() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(echo_tool("echo"));
    orchestrator.create_workflow("pipeline", vec![ToolChainStep::new("only", "echo")]);

    assert_eq!(orchestrator.workflows(), vec!["pipeline".to_string()]);

    let result = orchestrator
        .execute_workflow("pipeline", json!("payload"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.final_output, Some(json!("payload")));
}

#[tokio::test]
async fn test_unknown_workflow_fails() {
    let orchestrator = ToolOrchestrator::new();

    let result = orchestrator.execute_workflow("nope", json!(1)).await;
    assert!(matches!(result, Err(ScribeError::WorkflowNotFound(_))));
}

#[tokio::test]
async fn test_metrics_derive_from_history() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(echo_tool("echo"));
    orchestrator.register_tool(fail_tool("fail"));

    orchestrator
        .execute_chain(&[ToolChainStep::new("ok", "echo")], json!(1))
        .await;
    orchestrator
        .execute_chain(&[ToolChainStep::new("bad", "fail")], json!(1))
        .await;

    let metrics = orchestrator.metrics().await;
    assert_eq!(metrics.total_executions, 2);
    assert_eq!(metrics.successful_executions, 1);
    assert!((metrics.success_rate() - 0.5).abs() < f64::EPSILON);
    assert_eq!(metrics.recent_errors.len(), 1);
    assert_eq!(metrics.recent_errors[0].step_id, "bad");

    orchestrator.clear_history().await;
    assert_eq!(orchestrator.metrics().await.total_executions, 0);
}

#[tokio::test]
async fn test_history_is_bounded_and_newest_first() {
    let orchestrator = ToolOrchestrator::with_config(OrchestratorConfig {
        history_limit: 2,
        ..Default::default()
    });
    orchestrator.register_tool(echo_tool("echo"));

    let mut last_id = None;
    for _ in 0..3 {
        let result = orchestrator
            .execute_chain(&[ToolChainStep::new("only", "echo")], json!(1))
            .await;
        last_id = Some(result.id);
    }

    let history = orchestrator.history(10).await;
    assert_eq!(history.len(), 2);
    assert_eq!(Some(history[0].id), last_id);
}

#[tokio::test]
async fn test_duplicate_registration_overwrites() {
    let orchestrator = ToolOrchestrator::new();
    orchestrator.register_tool(Arc::new(FnTool::new("tool", |_input| async move {
        Ok(json!("old"))
    })));
    orchestrator.register_tool(Arc::new(FnTool::new("tool", |_input| async move {
        Ok(json!("new"))
    })));

    assert_eq!(orchestrator.registered_tools(), vec!["tool".to_string()]);

    let result = orchestrator
        .execute_chain(&[ToolChainStep::new("only", "tool")], json!(1))
        .await;
    assert_eq!(result.final_output, Some(json!("new")));
}
