//! MCP server surface over a [`RunnableApp`].
//!
//! Tool failures never reach the protocol layer as errors: they become `isError` results carrying
//! the failure message, and the server keeps serving.

use anyhow::Context as _;
use axum::Router;
use axum::routing::get;
use makemcp_core::{BoundTool, RunnableApp, ToolCallError, Transport};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt as _};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Inner {
    name: String,
    version: String,
    tools: Vec<BoundTool>,
    by_name: HashMap<String, usize>,
}

/// Cheap-to-clone MCP handler; every session shares the same bound tools.
#[derive(Debug, Clone)]
pub struct McpServer {
    inner: Arc<Inner>,
}

impl McpServer {
    #[must_use]
    pub fn new(app: RunnableApp) -> Self {
        let by_name = app
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        Self {
            inner: Arc::new(Inner {
                name: app.name,
                version: app.version,
                tools: app.tools,
                by_name,
            }),
        }
    }

    /// Tools in catalog order.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.inner.tools.iter().map(BoundTool::to_mcp_tool).collect()
    }

    fn tool(&self, name: &str) -> Option<&BoundTool> {
        self.inner.by_name.get(name).map(|&i| &self.inner.tools[i])
    }

    /// Run one tool call, racing it against `ct`.
    ///
    /// # Errors
    ///
    /// Returns `invalid_params` only for an unknown tool name; handler failures are reported as
    /// error results.
    pub async fn call(
        &self,
        name: &str,
        args: JsonObject,
        ct: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        let Some(tool) = self.tool(name) else {
            return Err(ErrorData::invalid_params(
                format!("Unknown tool '{name}'"),
                None,
            ));
        };

        let outcome = tokio::select! {
            () = ct.cancelled() => Err(ToolCallError::Cancelled),
            result = tool.call(args) => result,
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.inner.name.clone(),
                version: self.inner.version.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tools(),
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(
            &request.name,
            request.arguments.unwrap_or_default(),
            context.ct,
        )
        .await
    }
}

/// Serve over stdin/stdout until the client disconnects or `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the MCP handshake fails.
pub async fn serve_stdio(server: McpServer, shutdown: CancellationToken) -> anyhow::Result<()> {
    tracing::info!(app = %server.inner.name, tools = server.inner.tools.len(), "Serving MCP over stdio");
    let running = server
        .serve_with_ct(rmcp::transport::stdio(), shutdown)
        .await
        .context("start stdio MCP server")?;
    let reason = running.waiting().await.context("stdio MCP server task")?;
    tracing::info!(reason = ?reason, "Stdio MCP server stopped");
    Ok(())
}

/// `/mcp` (streamable HTTP) plus `/health`.
#[must_use]
pub fn router(server: McpServer, shutdown: &CancellationToken) -> Router {
    let mcp = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            cancellation_token: shutdown.child_token(),
            ..Default::default()
        },
    );

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest_service("/mcp", mcp)
}

/// Serve streamable HTTP on `0.0.0.0:port` until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails.
pub async fn serve_http(
    server: McpServer,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(
        app = %server.inner.name,
        tools = server.inner.tools.len(),
        addr = %addr,
        "Serving MCP over streamable HTTP at /mcp"
    );

    let app = router(server, &shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server")?;
    tracing::info!("HTTP MCP server stopped");
    Ok(())
}

/// Serve on the app's transport.
///
/// # Errors
///
/// As [`serve_stdio`] / [`serve_http`].
pub async fn serve(app: RunnableApp, shutdown: CancellationToken) -> anyhow::Result<()> {
    let transport = app.transport;
    let port = app.port;
    let server = McpServer::new(app);
    match transport {
        Transport::Stdio => serve_stdio(server, shutdown).await,
        Transport::Http => serve_http(server, port, shutdown).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt as _;
    use makemcp_core::{CallSite, ToolDescriptor, ToolHandler};
    use serde_json::{Value, json};
    use std::time::Duration;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: json!({"type": "object", "properties": {}, "required": []})
                .as_object()
                .cloned()
                .unwrap(),
            annotations: makemcp_core::ToolAnnotations {
                read_only_hint: Some(true),
                ..Default::default()
            },
            call_site: CallSite {
                method: "GET".to_string(),
                path: format!("/{name}"),
                params_by_location: makemcp_core::ParamsByLocation::default(),
                body_content_type: None,
                opaque_body: false,
            },
            source_fragment: Value::Null,
        }
    }

    fn app() -> RunnableApp {
        let ok: ToolHandler = Arc::new(|args: JsonObject| {
            async move {
                Ok(CallToolResult::success(vec![Content::text(
                    Value::Object(args).to_string(),
                )]))
            }
            .boxed()
        });
        let failing: ToolHandler = Arc::new(|_| {
            async {
                Err(ToolCallError::MissingPathParam {
                    name: "userId".to_string(),
                })
            }
            .boxed()
        });
        let slow: ToolHandler = Arc::new(|_| {
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(CallToolResult::success(vec![]))
            }
            .boxed()
        });
        RunnableApp::new(
            "demo",
            "1.0",
            Transport::Http,
            None,
            vec![
                BoundTool::new(descriptor("echo"), ok),
                BoundTool::new(descriptor("broken"), failing),
                BoundTool::new(descriptor("slow"), slow),
            ],
        )
        .unwrap()
    }

    fn as_json(result: &CallToolResult) -> Value {
        serde_json::to_value(result).unwrap()
    }

    #[test]
    fn lists_tools_with_annotations() {
        let server = McpServer::new(app());
        let tools = server.tools();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec!["echo", "broken", "slow"]);

        let v = serde_json::to_value(&tools[0]).unwrap();
        assert_eq!(v["annotations"]["readOnlyHint"], true);
        assert_eq!(v["inputSchema"]["type"], "object");

        let info = server.get_info();
        assert_eq!(info.server_info.name, "demo");
        assert_eq!(info.server_info.version, "1.0");
        assert!(info.capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn failures_become_error_results() {
        let server = McpServer::new(app());

        let ok = server
            .call("echo", json!({"a": 1}).as_object().cloned().unwrap(), CancellationToken::new())
            .await
            .unwrap();
        let ok = as_json(&ok);
        assert_ne!(ok["isError"], true);
        assert_eq!(ok["content"][0]["text"], r#"{"a":1}"#);

        let failed = as_json(
            &server
                .call("broken", JsonObject::new(), CancellationToken::new())
                .await
                .unwrap(),
        );
        assert_eq!(failed["isError"], true);
        assert!(
            failed["content"][0]["text"]
                .as_str()
                .unwrap()
                .contains("userId")
        );

        let unknown = server
            .call("nope", JsonObject::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(unknown.message.contains("nope"));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_call() {
        let server = McpServer::new(app());
        let ct = CancellationToken::new();
        let cancel = ct.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server.call("slow", JsonObject::new(), ct),
        )
        .await
        .expect("cancelled call should return promptly")
        .unwrap();
        let v = as_json(&result);
        assert_eq!(v["isError"], true);
        assert!(v["content"][0]["text"].as_str().unwrap().contains("cancel"));
    }

    #[tokio::test]
    async fn health_route_answers_ok() {
        let shutdown = CancellationToken::new();
        let app = router(McpServer::new(app()), &shutdown);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        });

        let body = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
