//! Runtime pairing of tool descriptors with executable handlers.

use crate::error::{CatalogError, ToolCallError};
use crate::model::{DEFAULT_HTTP_PORT, ToolDescriptor, Transport};
use futures::future::BoxFuture;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Async function executing one tool invocation.
pub type ToolHandler = Arc<
    dyn Fn(JsonObject) -> BoxFuture<'static, Result<CallToolResult, ToolCallError>> + Send + Sync,
>;

/// A descriptor together with the handler that executes it.
#[derive(Clone)]
pub struct BoundTool {
    pub descriptor: Arc<ToolDescriptor>,
    pub handler: ToolHandler,
}

impl BoundTool {
    #[must_use]
    pub fn new(descriptor: ToolDescriptor, handler: ToolHandler) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            handler,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// The MCP `Tool` advertised in `tools/list`.
    #[must_use]
    pub fn to_mcp_tool(&self) -> Tool {
        let d = &self.descriptor;
        let mut tool = Tool::new(
            d.name.clone(),
            d.description.clone(),
            Arc::new(d.input_schema.clone()),
        );
        tool.annotations = Some((&d.annotations).into());
        tool
    }

    pub async fn call(&self, args: JsonObject) -> Result<CallToolResult, ToolCallError> {
        (self.handler)(args).await
    }
}

impl fmt::Debug for BoundTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundTool")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

/// Knobs applied when handlers are attached, independent of the persisted config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Overrides the persisted transport.
    pub transport: Option<Transport>,
    /// Overrides the persisted port.
    pub port: Option<u16>,
    /// Upper bound on upstream response bodies. `None` means unlimited.
    pub max_response_bytes: Option<usize>,
}

/// An app whose tools are ready to serve.
#[derive(Debug, Clone)]
pub struct RunnableApp {
    pub name: String,
    pub version: String,
    pub transport: Transport,
    pub port: u16,
    pub tools: Vec<BoundTool>,
}

impl RunnableApp {
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateToolName`] if two bound tools share a name.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        transport: Transport,
        port: Option<u16>,
        tools: Vec<BoundTool>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name().to_string()) {
                return Err(CatalogError::DuplicateToolName {
                    name: tool.name().to_string(),
                });
            }
        }
        Ok(Self {
            name: name.into(),
            version: version.into(),
            transport,
            port: port.unwrap_or(DEFAULT_HTTP_PORT),
            tools,
        })
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&BoundTool> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::descriptor;
    use futures::FutureExt as _;
    use rmcp::model::Content;
    use serde_json::json;

    fn echo_handler() -> ToolHandler {
        Arc::new(|args: JsonObject| {
            async move {
                Ok(CallToolResult::success(vec![Content::text(
                    serde_json::Value::Object(args).to_string(),
                )]))
            }
            .boxed()
        })
    }

    fn schema() -> serde_json::Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    #[tokio::test]
    async fn bound_tool_invokes_handler() {
        let tool = BoundTool::new(descriptor("echo", "GET", "/", schema()), echo_handler());
        let mut args = JsonObject::new();
        args.insert("query__q".to_string(), json!("x"));
        let result = tool.call(args).await.unwrap();
        assert_ne!(result.is_error, Some(true));
    }

    #[test]
    fn mcp_tool_carries_annotations_and_schema() {
        let mut d = descriptor("listPets", "GET", "/pets", schema());
        d.annotations.title = Some("List pets".to_string());
        d.annotations.read_only_hint = Some(true);
        let tool = BoundTool::new(d, echo_handler()).to_mcp_tool();
        assert_eq!(tool.name, "listPets");
        let annotations = tool.annotations.unwrap();
        assert_eq!(annotations.title.as_deref(), Some("List pets"));
        assert_eq!(annotations.read_only_hint, Some(true));
        assert_eq!(annotations.destructive_hint, None);
        assert_eq!(tool.input_schema.get("type"), Some(&json!("object")));
    }

    #[test]
    fn runnable_app_defaults_port_and_rejects_duplicates() {
        let a = BoundTool::new(descriptor("a", "GET", "/", schema()), echo_handler());
        let app = RunnableApp::new("demo", "1", Transport::Http, None, vec![a.clone()]).unwrap();
        assert_eq!(app.port, DEFAULT_HTTP_PORT);
        assert!(app.tool("a").is_some());

        let err = RunnableApp::new("demo", "1", Transport::Stdio, None, vec![a.clone(), a])
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateToolName { .. }));
    }
}
