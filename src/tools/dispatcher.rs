//! Name-to-executor routing for function calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::ToolDeclaration;
use crate::error::ParleyError;

/// Routes function-call requests to registered tools.
///
/// The declarations advertised to the service are derived from the registered
/// tools, so every declared name has an executor.
#[derive(Clone, Default)]
pub struct ToolDispatcher {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    /// Build a dispatcher for an explicit declaration list.
    ///
    /// Fails with a configuration error when a declaration has no executor
    /// among `executors`, so a declared-but-unhandled tool never reaches the
    /// service.
    pub fn for_declarations(
        declarations: &[ToolDeclaration],
        executors: &[Arc<dyn Tool>],
    ) -> Result<Self, ParleyError> {
        let mut dispatcher = Self::new();
        for declaration in declarations {
            let executor = executors
                .iter()
                .find(|tool| tool.name() == declaration.name)
                .ok_or_else(|| {
                    ParleyError::Configuration(format!(
                        "Tool '{}' is declared but has no executor",
                        declaration.name
                    ))
                })?;
            dispatcher.register(Arc::clone(executor));
        }
        Ok(dispatcher)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Declarations to send in the session handshake.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|tool| tool.declaration()).collect()
    }

    /// Execute `name` with its raw JSON arguments.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: &str,
        call_id: &str,
    ) -> Result<String, ParleyError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ParleyError::UnknownTool(name.to_string()))?;
        let args = ToolArguments::parse(arguments)?;
        let ctx = ToolExecutionContext {
            call_id: call_id.to_string(),
        };
        tracing::debug!(tool = name, call_id, "dispatching tool call");
        tool.execute(&args, &ctx).await
    }

    /// Dispatch and fold any failure into an output string, so the call
    /// still gets a function-call-output turn.
    pub async fn dispatch_to_output(&self, name: &str, arguments: &str, call_id: &str) -> String {
        match self.dispatch(name, arguments, call_id).await {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(tool = name, call_id, error = %error, "tool call failed");
                format!("Error: {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::{calculator_declaration, get_time_tool, search_tool, weather_declaration};
    use crate::tools::tool::FnTool;

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let dispatcher = ToolDispatcher::new();
        let error = dispatcher
            .dispatch("get_weather", "{}", "call-1")
            .await
            .unwrap_err();
        assert!(matches!(error, ParleyError::UnknownTool(name) if name == "get_weather"));
    }

    #[test]
    fn declarations_without_executors_fail_at_registration() {
        let executors = vec![get_time_tool()];
        let result = ToolDispatcher::for_declarations(
            &[weather_declaration(), calculator_declaration()],
            &executors,
        );
        assert!(matches!(result, Err(ParleyError::Configuration(_))));
    }

    #[test]
    fn declared_set_matches_registered_set() {
        let executors = vec![get_time_tool(), search_tool(None)];
        let declarations: Vec<_> = executors.iter().map(|tool| tool.declaration()).collect();
        let dispatcher = ToolDispatcher::for_declarations(&declarations, &executors).unwrap();

        let mut names: Vec<_> = dispatcher
            .declarations()
            .into_iter()
            .map(|declaration| declaration.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["get_time", "search"]);
    }

    #[tokio::test]
    async fn failing_tool_still_yields_output() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(FnTool::new(
            "explode",
            "always fails",
            None,
            |_args, _ctx| async { Err(ParleyError::tool("explode", "boom")) },
        )));
        let output = dispatcher.dispatch_to_output("explode", "", "call-9").await;
        assert!(output.starts_with("Error:"));
        assert!(output.contains("boom"));
    }
}
