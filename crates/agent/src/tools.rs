use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use gingga_core::domain::agent::Agent;
use gingga_core::domain::chat::ChatId;
use gingga_core::domain::message::ChatMessage;

use crate::llm::ToolDefinition;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Failed(String),
}

/// What a tool can see of the conversation it runs in.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub chat_id: ChatId,
    pub agent: Option<Agent>,
    pub history: Vec<ChatMessage>,
    pub correlation_id: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;
    /// Approval-gated tools only run after the user confirms them.
    fn requires_approval(&self) -> bool {
        false
    }
    async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Provider tool definitions, sorted by name for stable prompts.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect::<Vec<_>>();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{Tool, ToolContext, ToolError};

    /// Counts executions and echoes its arguments, or fails when asked to.
    pub(crate) struct RecordingTool {
        pub name: &'static str,
        pub approval: bool,
        pub fail: bool,
        pub calls: Arc<AtomicUsize>,
    }

    impl RecordingTool {
        pub(crate) fn new(name: &'static str, approval: bool) -> Self {
            Self { name, approval, fail: false, calls: Arc::new(AtomicUsize::new(0)) }
        }

        pub(crate) fn failing(name: &'static str) -> Self {
            Self { fail: true, ..Self::new(name, true) }
        }
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "test tool"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        fn requires_approval(&self) -> bool {
            self.approval
        }

        async fn execute(&self, args: Value, context: &ToolContext) -> Result<Value, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ToolError::Failed("upstream unavailable".to_string()));
            }
            Ok(json!({ "echo": args, "historyLen": context.history.len() }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingTool;
    use super::ToolRegistry;

    #[test]
    fn registry_lists_definitions_by_name() {
        let mut registry = ToolRegistry::default();
        assert!(registry.is_empty());
        registry.register(RecordingTool::new("weather", false));
        registry.register(RecordingTool::new("capture_lead", true));

        let names = registry.definitions().into_iter().map(|d| d.name).collect::<Vec<_>>();
        assert_eq!(names, vec!["capture_lead", "weather"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("capture_lead").is_some_and(|tool| tool.requires_approval()));
        assert!(registry.get("missing").is_none());
    }
}
