//! Example of composing the result cache with a tool chain
//!
//! Registers a couple of custom tools, runs them as a workflow, and routes
//! the whole chain through the cache so repeated requests for the same
//! document are served without re-invoking the tools.

use async_trait::async_trait;
use scribe_core::cache::{CacheOptions, FetchConfig, ResultCache};
use scribe_core::tools::{AiTool, FnTool, ToolChainStep, ToolError, ToolOrchestrator};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// A tool that pretends to ask a model for an outline
struct OutlineTool;

#[async_trait]
impl AiTool for OutlineTool {
    fn name(&self) -> &str {
        "outline"
    }

    fn description(&self) -> &str {
        "Draft a section outline for a document"
    }

    async fn execute(&self, input: Value, _config: Option<&Value>) -> Result<Value, ToolError> {
        let topic = input["topic"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'topic'".to_string()))?;
        Ok(json!({
            "topic": topic,
            "sections": ["Introduction", "Method", "Results", "Discussion"],
        }))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("scribe_core=debug")
        .init();

    let orchestrator = Arc::new(ToolOrchestrator::new());
    orchestrator.register_tool(Arc::new(OutlineTool));
    orchestrator.register_tool(Arc::new(FnTool::new("summarize", |input| async move {
        let sections = input["sections"].as_array().map(Vec::len).unwrap_or(0);
        Ok(json!(format!("outline with {sections} sections")))
    })));

    orchestrator.create_workflow(
        "draft-outline",
        vec![
            ToolChainStep::new("outline", "outline"),
            ToolChainStep::new("summary", "summarize").with_timeout(Duration::from_secs(10)),
        ],
    );

    let cache = ResultCache::new(CacheOptions::with_capacity(100));
    let config = FetchConfig::default()
        .with_ttl(Duration::from_secs(300))
        .with_dependency("doc:42");

    for round in 1..=2 {
        let orchestrator = orchestrator.clone();
        let summary: Value = cache
            .get_or_fetch(
                "outline:doc:42",
                move || async move {
                    let result = orchestrator
                        .execute_workflow("draft-outline", json!({ "topic": "soil moisture" }))
                        .await?;
                    Ok(result.final_output.unwrap_or(Value::Null))
                },
                config.clone(),
            )
            .await
            .expect("workflow failed");
        println!("round {round}: {summary}");
    }

    // The second round was a cache hit; the tools ran once
    let metrics = cache.metrics().await;
    println!(
        "cache: {} hit(s), {} miss(es)",
        metrics.hits, metrics.misses
    );
}
