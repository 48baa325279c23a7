//! The `openapi` source adapter: build an app from a spec, decode it from JSON, and attach
//! HTTP handlers to its descriptors.

use crate::catalog::build_catalog;
use crate::error::{OpenApiToolsError, Result};
use crate::loader::{LoadedSpec, SpecLocation, load_spec};
use makemcp_core::persist::decode_app;
use makemcp_core::{
    App, BoundTool, CatalogError, RunnableApp, RuntimeOptions, SharedParams, SourceAdapter,
    SourceParams, SourceRegistry,
};
use makemcp_http_tools::runtime::parse_method;
use makemcp_http_tools::{HttpDispatcher, OutboundLimits};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// `sourceType` tag for apps built from `OpenAPI` documents.
pub const SOURCE_TYPE: &str = "openapi";

/// Source parameters persisted under `config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiParams {
    #[serde(flatten)]
    pub shared: SharedParams,
    pub base_url: String,
    pub spec_location: String,
}

impl SourceParams for OpenApiParams {
    const SOURCE_TYPE: &'static str = SOURCE_TYPE;

    fn shared(&self) -> &SharedParams {
        &self.shared
    }

    fn shared_mut(&mut self) -> &mut SharedParams {
        &mut self.shared
    }
}

pub type OpenApiApp = App<OpenApiParams>;

/// Load `spec_location`, derive the catalog, and assemble the app.
///
/// `base_url` wins over the document's `servers`; see [`resolve_base_url`].
///
/// # Errors
///
/// Spec-loading errors, [`OpenApiToolsError::BaseUrl`], or any catalog build error.
pub async fn build_from_spec(
    spec_location: &str,
    base_url: Option<&str>,
    shared: SharedParams,
) -> Result<OpenApiApp> {
    let client = OutboundLimits::default()
        .build_client()
        .map_err(|e| OpenApiToolsError::SpecFetch {
            url: spec_location.to_string(),
            message: e.to_string(),
        })?;
    let spec = load_spec(spec_location, &client).await?;
    build_from_loaded(&spec, base_url, shared)
}

/// Assemble an app from an already-parsed spec.
///
/// # Errors
///
/// As [`build_from_spec`], minus the loading errors.
pub fn build_from_loaded(
    spec: &LoadedSpec,
    base_url: Option<&str>,
    shared: SharedParams,
) -> Result<OpenApiApp> {
    let base_url = resolve_base_url(spec, base_url)?;
    let tools = build_catalog(spec)?;

    let params = OpenApiParams {
        shared,
        base_url,
        spec_location: spec.location.clone(),
    };
    let app = App::new(
        spec.openapi.info.title.clone(),
        spec.openapi.info.version.clone(),
        tools,
        params,
    )?;

    tracing::info!(
        app = %app.name,
        version = %app.version,
        tools = app.tools.len(),
        base_url = %app.config.base_url,
        "Built OpenAPI app"
    );
    Ok(app)
}

/// Pick the upstream base URL: the explicit one, else the first `servers[].url` with its
/// variables set to their defaults.
///
/// Relative server URLs are resolved against the document URL when the document was fetched over HTTP.
/// The result never ends with `/`.
///
/// # Errors
///
/// Returns [`OpenApiToolsError::BaseUrl`] when nothing usable is found.
pub fn resolve_base_url(spec: &LoadedSpec, explicit: Option<&str>) -> Result<String> {
    let candidate = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(url) => url.to_string(),
        None => {
            let Some(server) = spec.openapi.servers.first() else {
                return Err(OpenApiToolsError::BaseUrl(
                    "No base URL configured and none found in spec".to_string(),
                ));
            };
            let mut url = server.url.clone();
            if let Some(vars) = &server.variables {
                for (name, var) in vars {
                    url = url.replace(&format!("{{{name}}}"), &var.default);
                }
            }
            url
        }
    };

    let absolute = match Url::parse(&candidate) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
        Ok(url) => {
            return Err(OpenApiToolsError::BaseUrl(format!(
                "'{candidate}' has unsupported scheme '{}'",
                url.scheme()
            )));
        }
        Err(_) => match SpecLocation::classify(&spec.location) {
            SpecLocation::Url(mut spec_url) => {
                spec_url.set_fragment(None);
                spec_url.join(&candidate).map_err(|e| {
                    OpenApiToolsError::BaseUrl(format!(
                        "'{candidate}': {e} (set --base-url explicitly)"
                    ))
                })?
            }
            SpecLocation::File(_) => {
                return Err(OpenApiToolsError::BaseUrl(format!(
                    "'{candidate}' must be an absolute http(s) URL (set --base-url explicitly)"
                )));
            }
        },
    };

    Ok(absolute.as_str().trim_end_matches('/').to_string())
}

/// Decode a persisted `openapi` app.
///
/// # Errors
///
/// Returns [`CatalogError::ConfigDecode`] on shape mismatch.
pub fn decode(bytes: &[u8], origin: &str) -> makemcp_core::Result<OpenApiApp> {
    decode_app(bytes, origin)
}

/// Pair every descriptor with an HTTP handler. All handlers share one dispatcher (and so one
/// connection pool); each closure keeps only its own call site.
///
/// # Errors
///
/// Returns [`CatalogError::Source`] when the base URL or a method cannot be used.
pub fn attach_handlers(app: &OpenApiApp, options: &RuntimeOptions) -> makemcp_core::Result<RunnableApp> {
    let source_err = |message: String| CatalogError::Source {
        source_type: SOURCE_TYPE.to_string(),
        message,
    };

    let limits = OutboundLimits::with_max_response_bytes(options.max_response_bytes);
    let dispatcher = HttpDispatcher::new(&app.config.base_url, limits, app.shared().dev_mode)
        .map_err(|e| source_err(e.to_string()))?;
    let dispatcher = Arc::new(dispatcher);

    let mut tools = Vec::with_capacity(app.tools.len());
    for descriptor in &app.tools {
        parse_method(&descriptor.call_site.method)
            .map_err(|e| source_err(format!("tool '{}': {e}", descriptor.name)))?;
        let handler = dispatcher.handler(descriptor.call_site.clone());
        tools.push(BoundTool::new(descriptor.clone(), handler));
    }

    RunnableApp::new(
        app.name.clone(),
        app.version.clone(),
        options.transport.unwrap_or_else(|| app.transport()),
        options.port.or(app.shared().port),
        tools,
    )
}

/// [`SourceAdapter`] for `sourceType: "openapi"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApiSource;

impl SourceAdapter for OpenApiSource {
    fn source_type(&self) -> &'static str {
        SOURCE_TYPE
    }

    fn load(
        &self,
        bytes: &[u8],
        origin: &str,
        options: &RuntimeOptions,
    ) -> makemcp_core::Result<RunnableApp> {
        let app = decode(bytes, origin)?;
        attach_handlers(&app, options)
    }
}

/// Register the `openapi` adapter.
pub fn register(registry: &SourceRegistry) {
    registry.register(Arc::new(OpenApiSource));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_spec;
    use makemcp_core::Transport;
    use makemcp_core::persist::{encode_app, save_app};
    use makemcp_test_support::{EchoUpstream, write_fixture};
    use rmcp::model::JsonObject;
    use serde_json::{Value, json};

    const USERS: &str = include_str!("../tests/fixtures/users.yaml");

    fn args(v: Value) -> JsonObject {
        v.as_object().cloned().unwrap()
    }

    fn shared() -> SharedParams {
        SharedParams::new(SOURCE_TYPE)
    }

    #[test]
    fn base_url_prefers_explicit_and_trims_slash() {
        let spec = parse_spec(USERS, "users.yaml").unwrap();
        assert_eq!(
            resolve_base_url(&spec, Some("http://localhost:9000/v1/")).unwrap(),
            "http://localhost:9000/v1"
        );
        assert_eq!(resolve_base_url(&spec, None).unwrap(), "https://api.ex.com");
    }

    #[test]
    fn base_url_from_server_variables_and_relative_urls() {
        let templated = r#"
openapi: "3.0.0"
info: {title: t, version: "1"}
servers:
  - url: "https://{region}.ex.com/{basePath}"
    variables:
      region: {default: eu}
      basePath: {default: v2}
paths: {}
"#;
        let spec = parse_spec(templated, "t.yaml").unwrap();
        assert_eq!(resolve_base_url(&spec, None).unwrap(), "https://eu.ex.com/v2");

        let relative = r#"
openapi: "3.0.0"
info: {title: t, version: "1"}
servers:
  - url: /api/v3
paths: {}
"#;
        let spec = parse_spec(relative, "https://petstore.ex.com/specs/openapi.yaml").unwrap();
        assert_eq!(
            resolve_base_url(&spec, None).unwrap(),
            "https://petstore.ex.com/api/v3"
        );

        let spec = parse_spec(relative, "./openapi.yaml").unwrap();
        assert!(matches!(
            resolve_base_url(&spec, None),
            Err(OpenApiToolsError::BaseUrl(_))
        ));

        let none = "openapi: '3.0.0'\ninfo: {title: t, version: '1'}\npaths: {}\n";
        let spec = parse_spec(none, "n.yaml").unwrap();
        assert!(matches!(
            resolve_base_url(&spec, None),
            Err(OpenApiToolsError::BaseUrl(_))
        ));
    }

    #[test]
    fn builds_app_from_fixture() {
        let spec = parse_spec(USERS, "users.yaml").unwrap();
        let app = build_from_loaded(&spec, None, shared()).unwrap();
        assert_eq!(app.name, "Users API");
        assert_eq!(app.version, "1.2.0");
        assert_eq!(app.source_type, "openapi");
        assert_eq!(app.config.shared.source_type, "openapi");
        assert_eq!(app.config.spec_location, "users.yaml");

        let names: Vec<&str> = app.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "listUsers",
                "createUser",
                "getUser",
                "updateUser",
                "DELETE_/users/{userId}",
                "uploadAvatar"
            ]
        );

        let encoded: Value = serde_json::from_slice(&encode_app(&app).unwrap()).unwrap();
        assert_eq!(encoded["sourceType"], "openapi");
        assert_eq!(encoded["config"]["baseUrl"], "https://api.ex.com");
        assert_eq!(encoded["config"]["specLocation"], "users.yaml");
        assert_eq!(encoded["config"]["transport"], "stdio");
        assert_eq!(encoded["config"]["sourceType"], "openapi");
    }

    #[tokio::test]
    async fn build_from_spec_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path(), "users.yaml", USERS).unwrap();
        let location = path.display().to_string();

        let app = build_from_spec(&location, Some("http://127.0.0.1:1"), shared())
            .await
            .unwrap();
        assert_eq!(app.tools.len(), 6);
        assert_eq!(app.config.base_url, "http://127.0.0.1:1");

        let err = build_from_spec("/nonexistent/spec.yaml", None, shared())
            .await
            .unwrap_err();
        assert!(err.is_spec_load());
    }

    #[tokio::test]
    async fn round_trip_produces_identical_requests() {
        let upstream = EchoUpstream::start().await.unwrap();
        let spec = parse_spec(USERS, "users.yaml").unwrap();
        let mut shared = shared();
        shared.file = Some("users".to_string());
        let app = build_from_loaded(&spec, Some(upstream.base_url()), shared).unwrap();

        let direct = attach_handlers(&app, &RuntimeOptions::default()).unwrap();
        direct
            .tool("listUsers")
            .unwrap()
            .call(args(json!({"query__limit": 10})))
            .await
            .unwrap();
        direct
            .tool("updateUser")
            .unwrap()
            .call(args(json!({"path__userId": "u1", "body__name": "A", "body__email": "a@x"})))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = save_app(&app, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "users.json");

        let registry = SourceRegistry::default();
        register(&registry);
        let loaded = registry
            .load_file(&path, &RuntimeOptions::default())
            .unwrap();
        assert_eq!(loaded.tools.len(), app.tools.len());
        loaded
            .tool("listUsers")
            .unwrap()
            .call(args(json!({"query__limit": 10})))
            .await
            .unwrap();
        loaded
            .tool("updateUser")
            .unwrap()
            .call(args(json!({"path__userId": "u1", "body__name": "A", "body__email": "a@x"})))
            .await
            .unwrap();

        let seen = upstream.requests();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], seen[2]);
        assert_eq!(seen[1], seen[3]);
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].path_and_query(), "/users?limit=10");
        assert!(seen[0].body.is_empty());
        assert_eq!(seen[1].path, "/users/u1");
        assert_eq!(seen[1].header("content-type"), Some("application/json"));
        assert_eq!(
            seen[1].body_json().unwrap(),
            json!({"email": "a@x", "name": "A"})
        );

        // Save -> load -> save is byte-identical.
        let first = std::fs::read(&path).unwrap();
        let reloaded = decode(&first, "users.json").unwrap();
        assert_eq!(reloaded, app);
        assert_eq!(encode_app(&reloaded).unwrap(), first);
    }

    #[tokio::test]
    async fn opaque_body_is_sent_verbatim() {
        let upstream = EchoUpstream::start().await.unwrap();
        let spec = parse_spec(USERS, "users.yaml").unwrap();
        let app = build_from_loaded(&spec, Some(upstream.base_url()), shared()).unwrap();
        let runnable = attach_handlers(&app, &RuntimeOptions::default()).unwrap();

        runnable
            .tool("uploadAvatar")
            .unwrap()
            .call(args(json!({"path__userId": "u1", "body__payload": "PNGDATA"})))
            .await
            .unwrap();

        let req = upstream.last_request().unwrap();
        assert_eq!(req.method, "PUT");
        assert_eq!(req.path, "/users/u1/avatar");
        assert_eq!(req.header("content-type"), Some("image/png"));
        assert_eq!(req.body, b"PNGDATA");
    }

    #[test]
    fn runtime_options_override_persisted_transport() {
        let spec = parse_spec(USERS, "users.yaml").unwrap();
        let mut shared = shared();
        shared.port = Some(9100);
        let app = build_from_loaded(&spec, None, shared).unwrap();

        let default = attach_handlers(&app, &RuntimeOptions::default()).unwrap();
        assert_eq!(default.transport, Transport::Stdio);
        assert_eq!(default.port, 9100);

        let overridden = attach_handlers(
            &app,
            &RuntimeOptions {
                transport: Some(Transport::Http),
                port: Some(9200),
                max_response_bytes: None,
            },
        )
        .unwrap();
        assert_eq!(overridden.transport, Transport::Http);
        assert_eq!(overridden.port, 9200);
    }

    #[test]
    fn decode_rejects_wrong_shapes() {
        let spec = parse_spec(USERS, "users.yaml").unwrap();
        let app = build_from_loaded(&spec, None, shared()).unwrap();
        let mut value: Value = serde_json::from_slice(&encode_app(&app).unwrap()).unwrap();
        value["config"]
            .as_object_mut()
            .unwrap()
            .remove("baseUrl");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            decode(&bytes, "broken.json"),
            Err(CatalogError::ConfigDecode { .. })
        ));

        let registry = SourceRegistry::default();
        register(&registry);
        let mut other: Value = serde_json::from_slice(&encode_app(&app).unwrap()).unwrap();
        other["sourceType"] = json!("cli");
        let err = registry
            .load_bytes(
                &serde_json::to_vec(&other).unwrap(),
                "other.json",
                &RuntimeOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownSourceType(ref t) if t == "cli"));
    }

    #[test]
    fn attach_rejects_unusable_base_url() {
        let spec = parse_spec(USERS, "users.yaml").unwrap();
        let mut app = build_from_loaded(&spec, None, shared()).unwrap();
        app.config.base_url = "ftp://files.ex.com".to_string();
        let err = attach_handlers(&app, &RuntimeOptions::default()).unwrap_err();
        assert!(matches!(err, CatalogError::Source { ref source_type, .. } if source_type == "openapi"));
    }
}
