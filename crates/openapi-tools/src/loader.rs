//! Spec loader: reads an `OpenAPI` 3.x document from a file or an `http(s)` URL.
//!
//! The document is parsed twice over: once into a raw JSON tree (kept for `$ref` pointers and
//! verbatim operation fragments) and once into the typed `openapiv3` model. OpenAPI 3.1 keywords
//! the typed model rejects are normalised on the raw tree first.

use crate::error::{OpenApiToolsError, Result};
use makemcp_http_tools::safety::sanitize_reqwest_error;
use openapiv3::OpenAPI;
use reqwest::Client;
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use url::Url;

/// Where a spec comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecLocation {
    Url(Url),
    File(PathBuf),
}

impl SpecLocation {
    /// `http(s)` URLs are fetched; everything else is a filesystem path.
    #[must_use]
    pub fn classify(location: &str) -> Self {
        match Url::parse(location) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => SpecLocation::Url(url),
            _ => SpecLocation::File(PathBuf::from(location)),
        }
    }
}

/// A parsed spec plus the raw tree it came from.
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub location: String,
    pub raw: Value,
    pub openapi: OpenAPI,
}

impl LoadedSpec {
    #[must_use]
    pub fn is_url(&self) -> bool {
        matches!(SpecLocation::classify(&self.location), SpecLocation::Url(_))
    }
}

/// Read and parse a spec.
///
/// # Errors
///
/// Returns one of the spec-loading errors (`SpecFetch`, `SpecReadFile`, `SpecParse`,
/// `SpecUnsupported`, `SpecRef`).
pub async fn load_spec(location: &str, client: &Client) -> Result<LoadedSpec> {
    let content = match SpecLocation::classify(location) {
        SpecLocation::Url(url) => {
            tracing::info!("Fetching OpenAPI spec from {}", location);
            let resp = client.get(url).send().await.map_err(|e| {
                OpenApiToolsError::SpecFetch {
                    url: location.to_string(),
                    message: sanitize_reqwest_error(&e),
                }
            })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(OpenApiToolsError::SpecFetch {
                    url: location.to_string(),
                    message: format!("HTTP status {}", status.as_u16()),
                });
            }
            resp.text().await.map_err(|e| OpenApiToolsError::SpecFetch {
                url: location.to_string(),
                message: sanitize_reqwest_error(&e),
            })?
        }
        SpecLocation::File(path) => {
            tracing::info!("Loading OpenAPI spec from {}", path.display());
            std::fs::read_to_string(&path).map_err(|e| OpenApiToolsError::SpecReadFile {
                path: location.to_string(),
                source: e,
            })?
        }
    };

    parse_spec(&content, location)
}

/// Parse spec text (JSON or YAML).
///
/// # Errors
///
/// Returns `SpecParse`, `SpecUnsupported` or `SpecRef`.
pub fn parse_spec(content: &str, location: &str) -> Result<LoadedSpec> {
    let parse_err = |message: String| OpenApiToolsError::SpecParse {
        location: location.to_string(),
        message,
    };

    // JSON is a valid subset of YAML, so serde_yaml alone is enough.
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
    let mut raw = yaml_to_json(yaml).map_err(parse_err)?;

    check_version(&raw, location)?;
    normalize_openapi_31(&mut raw);
    if let Some(obj) = raw.as_object_mut() {
        obj.entry("paths").or_insert_with(|| Value::Object(Map::new()));
    }
    check_refs(&raw).map_err(|message| OpenApiToolsError::SpecRef {
        location: location.to_string(),
        message,
    })?;

    let openapi: OpenAPI =
        serde_json::from_value(raw.clone()).map_err(|e| parse_err(e.to_string()))?;

    Ok(LoadedSpec {
        location: location.to_string(),
        raw,
        openapi,
    })
}

fn check_version(raw: &Value, location: &str) -> Result<()> {
    let unsupported = |message: String| OpenApiToolsError::SpecUnsupported {
        location: location.to_string(),
        message,
    };

    if !raw.is_object() {
        return Err(unsupported("document is not a mapping".to_string()));
    }
    if let Some(v) = raw.get("swagger") {
        return Err(unsupported(format!(
            "Swagger {} documents are not supported (need OpenAPI 3.x)",
            value_label(v)
        )));
    }
    match raw.get("openapi") {
        Some(Value::String(v)) if v.trim().starts_with("3.") => Ok(()),
        Some(v) => Err(unsupported(format!(
            "OpenAPI version {} is not supported (need 3.x)",
            value_label(v)
        ))),
        None => Err(unsupported("missing 'openapi' version field".to_string())),
    }
}

fn value_label(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> std::result::Result<Value, String> {
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("non-finite number {f} is not representable"))?
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Y::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let key = match k {
                    Y::String(s) => s,
                    Y::Number(n) => n.to_string(),
                    Y::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported mapping key {other:?}")),
                };
                out.insert(key, yaml_to_json(v)?);
            }
            Value::Object(out)
        }
        Y::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// Rewrite OpenAPI 3.1 schema keywords into their 3.0 shape.
///
/// - `type: [a, b]` becomes the first non-`null` entry (`nullable: true` if `null` was listed)
/// - numeric `exclusiveMinimum` / `exclusiveMaximum` are dropped
fn normalize_openapi_31(value: &mut Value) {
    match value {
        Value::Object(obj) => {
            if let Some(Value::Array(types)) = obj.get("type") {
                let names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
                let nullable = names.contains(&"null");
                let first = names
                    .iter()
                    .find(|t| **t != "null")
                    .or_else(|| names.first())
                    .map(|t| (*t).to_string());
                match first {
                    Some(t) => {
                        obj.insert("type".to_string(), Value::String(t));
                    }
                    None => {
                        obj.remove("type");
                    }
                }
                if nullable {
                    obj.insert("nullable".to_string(), Value::Bool(true));
                }
            }
            for key in ["exclusiveMinimum", "exclusiveMaximum"] {
                if obj.get(key).is_some_and(Value::is_number) {
                    obj.remove(key);
                }
            }
            for child in obj.values_mut() {
                normalize_openapi_31(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_openapi_31),
        _ => {}
    }
}

/// Validate every `$ref` in the document: local, resolvable, and not an alias cycle.
fn check_refs(root: &Value) -> std::result::Result<(), String> {
    let mut refs: Vec<&str> = Vec::new();
    collect_refs(root, &mut refs);

    for reference in refs {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = reference;
        loop {
            if !seen.insert(current) {
                return Err(format!("Cyclic $ref detected while resolving: {reference}"));
            }
            let target = lookup_local_ref(root, current)?;
            // Follow pure aliases (`{"$ref": ...}` with nothing else) to detect cycles.
            match target.get("$ref").and_then(Value::as_str) {
                Some(next) if target.as_object().is_some_and(|o| o.len() == 1) => current = next,
                _ => break,
            }
        }
    }
    Ok(())
}

fn collect_refs<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::Object(obj) => {
            if let Some(Value::String(r)) = obj.get("$ref") {
                out.push(r);
            }
            for child in obj.values() {
                collect_refs(child, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

/// Look up a local `#/...` reference in `root`.
///
/// # Errors
///
/// Returns a message for external references, non-pointer fragments and dangling pointers.
pub(crate) fn lookup_local_ref<'a>(
    root: &'a Value,
    reference: &str,
) -> std::result::Result<&'a Value, String> {
    let Some(fragment) = reference.strip_prefix('#') else {
        return Err(format!(
            "External $ref '{reference}' is not supported (only local '#/...' references)"
        ));
    };
    if fragment.is_empty() {
        return Ok(root);
    }
    if !fragment.starts_with('/') {
        return Err(format!(
            "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}"
        ));
    }
    root.pointer(fragment)
        .ok_or_else(|| format!("Unresolved $ref '{reference}' (missing pointer '{fragment}')"))
}
