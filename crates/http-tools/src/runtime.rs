//! Request dispatcher: maps a flat, location-prefixed argument map onto an upstream HTTP request.
//!
//! Dispatch is split in two steps so the request shape can be checked without a network:
//! [`build_request`] is pure and produces a [`PreparedRequest`]; [`HttpDispatcher::execute`]
//! sends it through the shared client and formats the textual tool result.

use crate::safety::{
    OutboundLimits, read_response_body_limited_bytes, sanitize_reqwest_error, transport_error,
};
use crate::semantics::method_omits_body;
use base64::Engine as _;
use futures::FutureExt as _;
use makemcp_core::{
    CallSite, ParamLocation, ToolCallError, ToolHandler, path_placeholders, split_prefixed_key,
};
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Construction-time errors (bad base URL, bad method, client build failure).
#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid HTTP method '{0}'")]
    Method(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

/// Argument name used for opaque (non-object / non-JSON) request bodies.
pub const OPAQUE_BODY_ARG: &str = "payload";

/// A fully shaped upstream request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Option<PreparedBody>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PreparedRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }
}

/// Arguments split by location. Each entry keeps the key the value is sent under.
#[derive(Debug, Default)]
struct Partitioned<'a> {
    path: Vec<(&'a str, &'a Value)>,
    query: Vec<(&'a str, &'a Value)>,
    header: Vec<(&'a str, &'a Value)>,
    cookie: Vec<(&'a str, &'a Value)>,
    body: Vec<(&'a str, &'a Value)>,
}

fn partition(args: &JsonObject) -> Partitioned<'_> {
    let mut out = Partitioned::default();
    for (key, value) in args {
        let Some((location, name)) = split_prefixed_key(key) else {
            if key.contains(makemcp_core::LOCATION_SEPARATOR) {
                tracing::warn!(key = %key, "Unknown argument prefix; sending as query parameter");
            }
            out.query.push((key.as_str(), value));
            continue;
        };
        let bucket = match location {
            ParamLocation::Path => &mut out.path,
            ParamLocation::Query => &mut out.query,
            ParamLocation::Header => &mut out.header,
            ParamLocation::Cookie => &mut out.cookie,
            ParamLocation::Body => &mut out.body,
        };
        bucket.push((name, value));
    }
    out
}

/// Parse an HTTP method name (any casing).
///
/// # Errors
///
/// Returns [`HttpToolsError::Method`] if the name is not a valid method token.
pub fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| HttpToolsError::Method(method.to_string()))
}

/// Shape the upstream request for `call_site` from an MCP argument map.
///
/// # Errors
///
/// - [`ToolCallError::MissingPathParam`] if a `{placeholder}` is left unresolved
/// - [`ToolCallError::ArgumentType`] if a path/header/cookie value is not a scalar, or a header
///   name/value is not valid HTTP
/// - [`ToolCallError::Marshal`] if the JSON body cannot be encoded
pub fn build_request(
    base_url: &str,
    call_site: &CallSite,
    args: &JsonObject,
) -> std::result::Result<PreparedRequest, ToolCallError> {
    let method = parse_method(&call_site.method).map_err(|e| ToolCallError::ArgumentType {
        key: "method".to_string(),
        message: e.to_string(),
    })?;
    let parts = partition(args);

    let path = substitute_path(&call_site.path, &parts.path)?;
    let mut url = build_url(base_url, &path)?;
    append_query(&mut url, &parts.query);

    let mut headers: Vec<(HeaderName, HeaderValue)> = Vec::new();
    for (name, value) in &parts.header {
        let key = ParamLocation::Header.prefixed(name);
        let text = scalar_to_string(&key, value)?;
        let Some(text) = text else { continue };
        headers.push((header_name(&key, name)?, header_value(&key, &text)?));
    }

    let cookie = build_cookie_header(&parts.cookie)?;
    if let Some(cookie) = cookie {
        headers.push((COOKIE, cookie));
    }

    let body = if method_omits_body(&method) {
        if !parts.body.is_empty() {
            tracing::warn!(
                method = %method,
                path = %call_site.path,
                "Ignoring body arguments for a method that carries no body"
            );
        }
        None
    } else if call_site.opaque_body {
        opaque_body(call_site, &parts.body)?
    } else {
        json_body(call_site, &parts.body)?
    };

    if let Some(body) = &body {
        // The body's declared media type is the only Content-Type sent.
        if headers.iter().any(|(name, _)| name == CONTENT_TYPE) {
            tracing::warn!(
                content_type = %body.content_type,
                "Ignoring Content-Type header argument for a request with a body"
            );
            headers.retain(|(name, _)| name != CONTENT_TYPE);
        }
        headers.push((CONTENT_TYPE, header_value("Content-Type", &body.content_type)?));
    }

    Ok(PreparedRequest {
        method,
        url,
        headers,
        body,
    })
}

fn substitute_path(
    template: &str,
    path_args: &[(&str, &Value)],
) -> std::result::Result<String, ToolCallError> {
    let mut path = if template.starts_with('/') {
        template.to_string()
    } else {
        format!("/{template}")
    };

    for (name, value) in path_args {
        let key = ParamLocation::Path.prefixed(name);
        let Some(text) = scalar_to_string(&key, value)? else {
            continue;
        };
        // URL parsing collapses dot segments, even percent-encoded ones.
        if text == "." || text == ".." {
            return Err(ToolCallError::ArgumentType {
                key,
                message: format!("'{text}' is not allowed as a path segment value"),
            });
        }
        path = path.replace(&format!("{{{name}}}"), &encode_path_segment(&text));
    }

    match path_placeholders(&path) {
        Ok(remaining) => match remaining.into_iter().next() {
            Some(name) => Err(ToolCallError::MissingPathParam { name }),
            None => Ok(path),
        },
        Err(message) => Err(ToolCallError::ArgumentType {
            key: "path".to_string(),
            message,
        }),
    }
}

fn build_url(base_url: &str, path: &str) -> std::result::Result<Url, ToolCallError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    Url::parse(&url).map_err(|e| ToolCallError::Transport(format!("Invalid URL '{url}': {e}")))
}

fn append_query(url: &mut Url, query_args: &[(&str, &Value)]) {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, value) in query_args {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|v| !v.is_null()) {
                    pairs.push(((*key).to_string(), value_to_string(item)));
                }
            }
            other => pairs.push(((*key).to_string(), value_to_string(other))),
        }
    }
    if pairs.is_empty() {
        return;
    }

    let mut query = url.query().map(str::to_string).unwrap_or_default();
    for (key, value) in pairs {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&encode_query_component(&key));
        query.push('=');
        query.push_str(&encode_query_component(&value));
    }
    url.set_query(Some(&query));
}

fn build_cookie_header(
    cookie_args: &[(&str, &Value)],
) -> std::result::Result<Option<HeaderValue>, ToolCallError> {
    let mut pairs: Vec<String> = Vec::new();
    for (name, value) in cookie_args {
        let key = ParamLocation::Cookie.prefixed(name);
        if let Some(text) = scalar_to_string(&key, value)? {
            if text.contains(';') {
                return Err(ToolCallError::ArgumentType {
                    key,
                    message: "cookie values must not contain ';'".to_string(),
                });
            }
            pairs.push(format!("{name}={text}"));
        }
    }
    if pairs.is_empty() {
        return Ok(None);
    }
    header_value("Cookie", &pairs.join("; ")).map(Some)
}

fn json_body(
    call_site: &CallSite,
    body_args: &[(&str, &Value)],
) -> std::result::Result<Option<PreparedBody>, ToolCallError> {
    if body_args.is_empty() {
        return Ok(None);
    }
    let object: Map<String, Value> = body_args
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).clone()))
        .collect();
    let bytes = serde_json::to_vec(&Value::Object(object))?;
    let content_type = call_site
        .body_content_type
        .clone()
        .unwrap_or_else(|| mime::APPLICATION_JSON.essence_str().to_string());
    Ok(Some(PreparedBody {
        content_type,
        bytes,
    }))
}

fn opaque_body(
    call_site: &CallSite,
    body_args: &[(&str, &Value)],
) -> std::result::Result<Option<PreparedBody>, ToolCallError> {
    let payload = body_args
        .iter()
        .find(|(name, _)| *name == OPAQUE_BODY_ARG)
        .map(|(_, v)| *v);
    for (name, _) in body_args.iter().filter(|(n, _)| *n != OPAQUE_BODY_ARG) {
        tracing::warn!(arg = %name, "Ignoring body argument for an opaque request body");
    }

    let bytes = match payload {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.as_bytes().to_vec(),
        Some(other) => serde_json::to_vec(other)?,
    };
    let content_type = call_site
        .body_content_type
        .clone()
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.essence_str().to_string());
    Ok(Some(PreparedBody {
        content_type,
        bytes,
    }))
}

/// String form of a scalar argument; `None` for `null`.
fn scalar_to_string(key: &str, value: &Value) -> std::result::Result<Option<String>, ToolCallError> {
    match value {
        Value::Null => Ok(None),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(Some(value_to_string(value))),
        Value::Array(_) => Err(ToolCallError::ArgumentType {
            key: key.to_string(),
            message: "expected a string, number or boolean, got an array".to_string(),
        }),
        Value::Object(_) => Err(ToolCallError::ArgumentType {
            key: key.to_string(),
            message: "expected a string, number or boolean, got an object".to_string(),
        }),
    }
}

fn header_name(key: &str, name: &str) -> std::result::Result<HeaderName, ToolCallError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ToolCallError::ArgumentType {
        key: key.to_string(),
        message: format!("invalid header name '{name}': {e}"),
    })
}

fn header_value(key: &str, value: &str) -> std::result::Result<HeaderValue, ToolCallError> {
    HeaderValue::from_str(value).map_err(|e| ToolCallError::ArgumentType {
        key: key.to_string(),
        message: format!("invalid header value: {e}"),
    })
}

fn encode_query_component(s: &str) -> String {
    // NOTE: encodes '&' and '=' too so values cannot break the pair joining.
    percent_encode(s)
}

fn encode_path_segment(s: &str) -> String {
    percent_encode(s)
}

fn percent_encode(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

fn bytes_to_text_or_base64_json(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        s.to_string()
    } else {
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
        json!({
            "encoding": "base64",
            "mimeType": content_type,
            "data": b64
        })
        .to_string()
    }
}

/// Executes prepared requests for every tool of one app through a single shared client.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    base_url: String,
    limits: OutboundLimits,
    dev_mode: bool,
}

impl HttpDispatcher {
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if `base_url` is not an absolute `http(s)` URL or the
    /// client cannot be built.
    pub fn new(base_url: &str, limits: OutboundLimits, dev_mode: bool) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| HttpToolsError::Config(format!("Invalid baseUrl '{base_url}': {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(HttpToolsError::Config(format!(
                "Invalid baseUrl '{base_url}': unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        Ok(Self {
            client: limits.build_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            limits,
            dev_mode,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build and send the request for one invocation.
    ///
    /// # Errors
    ///
    /// Any [`ToolCallError`] from request shaping or execution.
    pub async fn call(
        &self,
        call_site: &CallSite,
        args: &JsonObject,
    ) -> std::result::Result<CallToolResult, ToolCallError> {
        let prepared = build_request(&self.base_url, call_site, args)?;
        self.execute(prepared).await
    }

    /// Send a prepared request and format the response as `HTTP {METHOD} {URL}\nStatus: ...`.
    ///
    /// Non-2xx statuses are not errors here; the caller sees them in the text.
    ///
    /// # Errors
    ///
    /// [`ToolCallError::Transport`] for connection/IO failures, or
    /// [`ToolCallError::ResponseTooLarge`] when the body exceeds the configured cap.
    pub async fn execute(
        &self,
        prepared: PreparedRequest,
    ) -> std::result::Result<CallToolResult, ToolCallError> {
        let PreparedRequest {
            method,
            url,
            headers,
            body,
        } = prepared;

        if self.dev_mode {
            tracing::info!(method = %method, url = %url, "Outbound request");
        } else {
            tracing::debug!(method = %method, url = %url, "Outbound request");
        }

        let mut request = self.client.request(method.clone(), url.clone());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body.bytes);
        }

        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string);
        let bytes =
            read_response_body_limited_bytes(response, self.limits.max_response_bytes).await?;

        if self.dev_mode {
            tracing::info!(
                method = %method,
                url = %url,
                status = status.as_u16(),
                bytes = bytes.len(),
                "Upstream response"
            );
        } else {
            tracing::debug!(
                method = %method,
                url = %url,
                status = status.as_u16(),
                bytes = bytes.len(),
                "Upstream response"
            );
        }

        let text = format!(
            "HTTP {method} {url}\nStatus: {}\nResponse: {}",
            status.as_u16(),
            bytes_to_text_or_base64_json(&bytes, content_type.as_deref())
        );
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Handler closure for one call site. The closure holds the shared dispatcher and its own
    /// call site only.
    #[must_use]
    pub fn handler(self: &Arc<Self>, call_site: CallSite) -> ToolHandler {
        let dispatcher = Arc::clone(self);
        let call_site = Arc::new(call_site);
        Arc::new(move |args: JsonObject| {
            let dispatcher = Arc::clone(&dispatcher);
            let call_site = Arc::clone(&call_site);
            async move { dispatcher.call(&call_site, &args).await }.boxed()
        })
    }
}

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        Self::Config(sanitize_reqwest_error(&value))
    }
}
