#![allow(dead_code)]

use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::AsyncBufReadExt as _;
use tokio_util::io::StreamReader;

/// Minimal MCP client for the streamable HTTP endpoint (`/mcp`). Test-only.
pub struct McpStreamableHttpSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl McpStreamableHttpSession {
    pub async fn connect(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        let init_resp = post_mcp(&client, &base_url, None, json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "makemcp-integration-tests", "version": "0" }
            }
        }))
        .await?;

        let session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init_msg = read_first_event_stream_json_message(init_resp).await?;
        anyhow::ensure!(init_msg.get("id") == Some(&json!(0)), "unexpected init id");

        let initialized_resp = post_mcp(
            &client,
            &base_url,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await?;

        anyhow::ensure!(
            initialized_resp.status().as_u16() == 202,
            "POST /mcp notifications/initialized returned {}",
            initialized_resp.status()
        );

        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    pub async fn request(
        &self,
        id: u64,
        method: &str,
        params: Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<Value> {
        let resp = post_mcp(
            &self.client,
            &self.base_url,
            Some(&self.session_id),
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }),
        )
        .await?;

        let msg = tokio::time::timeout(timeout_dur, read_first_event_stream_json_message(resp))
            .await
            .context("timeout waiting for event-stream response")??;

        Ok(msg)
    }

    pub async fn list_tools(&self, id: u64) -> anyhow::Result<Vec<Value>> {
        let msg = self
            .request(id, "tools/list", json!({}), Duration::from_secs(10))
            .await?;
        msg.pointer("/result/tools")
            .and_then(Value::as_array)
            .cloned()
            .context("tools/list missing result.tools")
    }

    pub async fn call_tool(&self, id: u64, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.request(
            id,
            "tools/call",
            json!({"name": name, "arguments": arguments}),
            Duration::from_secs(10),
        )
        .await
    }
}

/// `result.content[0].text` of a `tools/call` response.
pub fn tool_call_text(msg: &Value) -> anyhow::Result<&str> {
    msg.pointer("/result/content/0/text")
        .and_then(Value::as_str)
        .context("tools/call missing result.content[0].text")
}

/// Whether a `tools/call` response is flagged as a tool error.
pub fn tool_call_is_error(msg: &Value) -> bool {
    msg.pointer("/result/isError") == Some(&Value::Bool(true))
}

async fn post_mcp(
    client: &reqwest::Client,
    base_url: &str,
    session_id: Option<&str>,
    body: Value,
) -> anyhow::Result<reqwest::Response> {
    let mut req = client
        .post(format!("{}/mcp", base_url.trim_end_matches('/')))
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(session_id) = session_id {
        req = req.header("Mcp-Session-Id", session_id);
    }

    req.send()
        .await
        .context("POST /mcp")?
        .error_for_status()
        .context("POST /mcp status")
}

async fn read_first_event_stream_json_message(resp: reqwest::Response) -> anyhow::Result<Value> {
    let mut stream = resp.bytes_stream();
    let byte_stream = futures::stream::poll_fn(move |cx| stream.poll_next_unpin(cx))
        .map(|r| r.map_err(std::io::Error::other));
    let reader = StreamReader::new(byte_stream);
    let mut lines = tokio::io::BufReader::new(reader).lines();

    let mut data_lines: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();

        if line.is_empty() {
            if data_lines.is_empty() {
                continue;
            }
            let data = data_lines.join("\n");
            return serde_json::from_str(&data).context("parse event-stream data as JSON");
        }

        if let Some(v) = line.strip_prefix("data:") {
            // Priming events carry an empty data field.
            let v = v.trim();
            if !v.is_empty() {
                data_lines.push(v.to_string());
            }
        }
    }

    anyhow::bail!("event-stream ended without a JSON message")
}
