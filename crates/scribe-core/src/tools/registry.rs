//! Flat registry of orchestrated tools

use crate::tools::base::AiTool;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry mapping tool names to implementations
///
/// Registration is overwrite-on-duplicate; there is no versioning.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn AiTool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// Register a tool under its own name, replacing any previous entry
    pub fn register(&self, tool: Arc<dyn AiTool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Register multiple tools
    pub fn register_all(&self, tools: Vec<Arc<dyn AiTool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn AiTool>> {
        self.tools.get(name).map(|entry| entry.value().clone())
    }

    /// Check if a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove a tool
    pub fn remove(&self, name: &str) -> Option<Arc<dyn AiTool>> {
        self.tools.remove(name).map(|(_, tool)| tool)
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Remove all tools
    pub fn clear(&self) {
        self.tools.clear();
    }
}
