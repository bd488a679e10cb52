use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tether_model::{ContentBlock, ToolDefinition};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::object::{ApprovalHandler, Gate, ToolObject, ToolObjectImpl};
use super::{Approval, Tool};
use crate::permission::PermissionEngine;

/// A set of tools the model may call, keyed by name.
///
/// Cloning is cheap, the tools themselves are shared.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolObject>>,
    permission: Option<Arc<dyn PermissionEngine>>,
    on_request: Option<ApprovalHandler>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool, replacing any tool with the same name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        self.tools.insert(name, Arc::new(ToolObjectImpl(tool)));
    }

    /// Adds a tool and returns the registry.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.add_tool(tool);
        self
    }

    /// Sets the engine consulted before every call.
    ///
    /// Without an engine every call is executed.
    #[inline]
    pub fn set_permission_engine<E: PermissionEngine + 'static>(
        &mut self,
        engine: E,
    ) {
        self.permission = Some(Arc::new(engine));
    }

    /// Sets the permission engine and returns the registry.
    #[inline]
    pub fn with_permission_engine<E: PermissionEngine + 'static>(
        mut self,
        engine: E,
    ) -> Self {
        self.set_permission_engine(engine);
        self
    }

    /// Sets the handler that receives approvals when the permission engine
    /// asks. Calls needing an approval are rejected if no handler is set.
    #[inline]
    pub fn on_request<F: Fn(Approval) + Send + Sync + 'static>(
        &mut self,
        on_request: F,
    ) {
        self.on_request = Some(Arc::new(on_request));
    }

    /// Returns the number of tools.
    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if there are no tools.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns `true` if a tool named `name` is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the definitions sent to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                input_schema: tool.input_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Executes one call and returns its `tool_result` block.
    ///
    /// Failures never escape: an unknown tool, a rejected call and a
    /// failing tool all produce a result with `is_error` set.
    pub fn execute(
        &self,
        id: &str,
        name: &str,
        input: Value,
        cancel: CancellationToken,
    ) -> impl Future<Output = ContentBlock> + Send + 'static {
        let gate = Gate {
            permission: self.permission.as_deref(),
            on_request: self.on_request.as_ref(),
        };
        let pending = self
            .tools
            .get(name)
            .map(|tool| Arc::clone(tool).execute(input, gate, cancel));
        let id = id.to_owned();
        let name = name.to_owned();

        async move {
            let Some(pending) = pending else {
                warn!("tool not found: {name}");
                let message = format!("Error: Tool '{name}' not found");
                return ContentBlock::tool_error(id, message);
            };
            match pending.await {
                Ok(content) => {
                    trace!("tool {name} ({id}) finished");
                    ContentBlock::tool_result(id, content)
                }
                Err(err) => {
                    warn!("tool {name} ({id}) failed: {err}");
                    ContentBlock::tool_error(id, format!("Error: {err}"))
                }
            }
        }
    }

    /// Executes every `tool_use` block concurrently.
    ///
    /// The results are in the order of the calls, regardless of which
    /// finishes first.
    pub fn execute_all<'a, I>(
        &self,
        calls: I,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Vec<ContentBlock>> + Send + 'static
    where
        I: IntoIterator<Item = &'a ContentBlock>,
    {
        let pending: Vec<_> = calls
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse {
                    id, name, input, ..
                } => {
                    let cancel = cancel.clone();
                    Some(self.execute(id, name, input.clone(), cancel))
                }
                _ => None,
            })
            .collect();
        let count = pending.len();
        join_all(pending).instrument(debug_span!("tool batch", count))
    }
}

impl Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry")
            .field("tools", &names)
            .field("has_permission_engine", &self.permission.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;
    use std::sync::Mutex;

    use serde::Deserialize;
    use serde_json::json;
    use tether_model::ToolResultContent;

    use super::*;
    use crate::permission::{PermissionContext, PermissionMode, ToolRule};
    use crate::tool::{Error, ToolOutput};

    static EMPTY_SCHEMA: &Value = &Value::Null;

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool;

    impl Tool for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the text"
        }

        fn input_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            input: Self::Input,
            _cancel: CancellationToken,
        ) -> impl Future<Output = ToolOutput> + Send + 'static {
            ready(Ok(input.text.into()))
        }
    }

    struct BoomTool;

    impl Tool for BoomTool {
        type Input = Value;

        fn name(&self) -> &str {
            "boom"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn input_schema(&self) -> &Value {
            EMPTY_SCHEMA
        }

        fn execute(
            &self,
            _input: Self::Input,
            _cancel: CancellationToken,
        ) -> impl Future<Output = ToolOutput> + Send + 'static {
            ready(Err(Error::execution_error().with_reason("boom")))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with_tool(EchoTool).with_tool(BoomTool)
    }

    fn text_of(block: &ContentBlock) -> String {
        match block {
            ContentBlock::ToolResult { content, .. } => content.to_text(),
            _ => panic!("not a tool result: {block:?}"),
        }
    }

    #[test]
    fn test_definitions_sorted() {
        let names: Vec<_> = registry()
            .definitions()
            .into_iter()
            .map(|definition| definition.name)
            .collect();
        assert_eq!(names, ["boom", "echo"]);
    }

    #[tokio::test]
    async fn test_execute() {
        let registry = registry();
        let cancel = CancellationToken::new();

        let block = registry
            .execute("t1", "echo", json!({"text": "hi"}), cancel.clone())
            .await;
        assert_eq!(
            block,
            ContentBlock::tool_result("t1", ToolResultContent::from("hi"))
        );

        let block = registry
            .execute("t2", "missing", json!({}), cancel.clone())
            .await;
        assert!(block.is_error_result());
        assert_eq!(text_of(&block), "Error: Tool 'missing' not found");

        let block = registry.execute("t3", "echo", json!({}), cancel).await;
        assert!(block.is_error_result());
        assert!(text_of(&block).starts_with("Error: missing field"));
    }

    #[tokio::test]
    async fn test_failure_keeps_siblings() {
        let calls = [
            ContentBlock::tool_use("t1", "boom", json!({})),
            ContentBlock::text("between"),
            ContentBlock::tool_use("t2", "echo", json!({"text": "ok"})),
        ];
        let results = registry()
            .execute_all(&calls, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_result_id(), Some("t1"));
        assert_eq!(text_of(&results[0]), "Error: boom");
        assert_eq!(results[1].tool_result_id(), Some("t2"));
        assert!(!results[1].is_error_result());
    }

    #[tokio::test]
    async fn test_permissions() {
        let context = PermissionContext::new(PermissionMode::Default)
            .with_deny_rule(ToolRule::parse("boom"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = registry().with_permission_engine(context);

        // Nobody to ask, so the call is rejected.
        let block = registry
            .execute("t1", "echo", json!({"text": "hi"}), Default::default())
            .await;
        assert_eq!(text_of(&block), "Error: no approval handler");

        registry.on_request({
            let seen = Arc::clone(&seen);
            move |approval: Approval| {
                seen.lock().unwrap().push(approval.tool_name().to_owned());
                approval.approve();
            }
        });
        let block = registry
            .execute("t2", "echo", json!({"text": "hi"}), Default::default())
            .await;
        assert!(!block.is_error_result());
        assert_eq!(*seen.lock().unwrap(), ["echo"]);

        let block = registry
            .execute("t3", "boom", json!({}), Default::default())
            .await;
        assert!(block.is_error_result());
        assert_eq!(text_of(&block), "Error: denied by rule `boom`");

        registry.on_request(|approval: Approval| {
            approval.reject(Some("not now".to_owned()));
        });
        let block = registry
            .execute("t4", "echo", json!({"text": "hi"}), Default::default())
            .await;
        assert_eq!(text_of(&block), "Error: not now");
    }
}
