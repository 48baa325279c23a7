//! Tool catalog data model.
//!
//! An [`App`] is the persisted aggregate: app metadata, an ordered list of [`ToolDescriptor`]s and
//! the source parameters (`config`) whose concrete shape is chosen by the `sourceType` tag.

use crate::error::{CatalogError, Result};
use rmcp::model::JsonObject;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Separator between the location prefix and the upstream parameter name (`query__limit`).
pub const LOCATION_SEPARATOR: &str = "__";

/// Port used by the HTTP transport when none is configured.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Where an argument ends up in the upstream HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl ParamLocation {
    /// All locations, in the order descriptions list them.
    pub const ALL: [ParamLocation; 5] = [
        ParamLocation::Path,
        ParamLocation::Query,
        ParamLocation::Header,
        ParamLocation::Cookie,
        ParamLocation::Body,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
            ParamLocation::Body => "body",
        }
    }

    /// Parse a location prefix. Unknown prefixes return `None`.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "path" => Some(ParamLocation::Path),
            "query" => Some(ParamLocation::Query),
            "header" => Some(ParamLocation::Header),
            "cookie" => Some(ParamLocation::Cookie),
            "body" => Some(ParamLocation::Body),
            _ => None,
        }
    }

    /// The argument key for `name` at this location (`path__userId`).
    #[must_use]
    pub fn prefixed(self, name: &str) -> String {
        format!("{}{LOCATION_SEPARATOR}{name}", self.as_str())
    }

    /// Heading used for this location in tool descriptions.
    #[must_use]
    pub fn section_title(self) -> &'static str {
        match self {
            ParamLocation::Path => "Path Parameters",
            ParamLocation::Query => "Query Parameters",
            ParamLocation::Header => "Header Parameters",
            ParamLocation::Cookie => "Cookie Parameters",
            ParamLocation::Body => "Body Parameters",
        }
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a prefixed argument key into its location and upstream name.
///
/// Returns `None` for unprefixed keys, unknown prefixes and empty names.
#[must_use]
pub fn split_prefixed_key(key: &str) -> Option<(ParamLocation, &str)> {
    let (prefix, name) = key.split_once(LOCATION_SEPARATOR)?;
    let location = ParamLocation::from_prefix(prefix)?;
    if name.is_empty() {
        return None;
    }
    Some((location, name))
}

/// Channel over which the MCP server talks to its client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Stdio,
    Http,
}

impl Transport {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "http",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            other => Err(format!(
                "unsupported transport '{other}' (expected 'stdio' or 'http')"
            )),
        }
    }
}

/// MCP tool hints. Unset hints stay absent rather than `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

impl From<&ToolAnnotations> for rmcp::model::ToolAnnotations {
    fn from(a: &ToolAnnotations) -> Self {
        rmcp::model::ToolAnnotations {
            title: a.title.clone(),
            read_only_hint: a.read_only_hint,
            destructive_hint: a.destructive_hint,
            idempotent_hint: a.idempotent_hint,
            open_world_hint: a.open_world_hint,
        }
    }
}

/// Declared upstream parameter names, grouped by location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamsByLocation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookie: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<String>,
}

impl ParamsByLocation {
    #[must_use]
    pub fn get(&self, location: ParamLocation) -> &[String] {
        match location {
            ParamLocation::Path => &self.path,
            ParamLocation::Query => &self.query,
            ParamLocation::Header => &self.header,
            ParamLocation::Cookie => &self.cookie,
            ParamLocation::Body => &self.body,
        }
    }

    /// Record `name` under `location` unless it is already there.
    pub fn push(&mut self, location: ParamLocation, name: &str) {
        let bucket = match location {
            ParamLocation::Path => &mut self.path,
            ParamLocation::Query => &mut self.query,
            ParamLocation::Header => &mut self.header,
            ParamLocation::Cookie => &mut self.cookie,
            ParamLocation::Body => &mut self.body,
        };
        if !bucket.iter().any(|n| n == name) {
            bucket.push(name.to_string());
        }
    }
}

/// Everything needed to rebuild the upstream HTTP request for a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    /// HTTP method, upper-case.
    pub method: String,
    /// Literal path template, braces preserved (`/users/{userId}`).
    pub path: String,
    #[serde(default)]
    pub params_by_location: ParamsByLocation,
    /// Request body media type, when the operation declares a body.
    #[serde(default)]
    pub body_content_type: Option<String>,
    /// The body is exposed as a single `body__payload` argument and sent verbatim.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub opaque_body: bool,
}

/// The serializable record describing one MCP tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema (`type: object`) over location-prefixed argument keys.
    pub input_schema: JsonObject,
    #[serde(default)]
    pub annotations: ToolAnnotations,
    pub call_site: CallSite,
    /// The originating operation, kept verbatim for faithful round-trips.
    #[serde(default)]
    pub source_fragment: Value,
}

impl ToolDescriptor {
    /// Property names declared by the input schema.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|props| props.keys().map(String::as_str))
    }

    /// Names listed in the input schema's `required` array.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flat_map(|req| req.iter().filter_map(Value::as_str))
    }

    /// Check the catalog invariants for this descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidDescriptor`] when a property key is not location-prefixed,
    /// a required name has no property, or a path placeholder has no required `path__` property.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| CatalogError::InvalidDescriptor {
            tool: self.name.clone(),
            reason,
        };

        if self.input_schema.get("type").and_then(Value::as_str) != Some("object") {
            return Err(invalid("inputSchema.type must be \"object\"".to_string()));
        }

        let properties: HashSet<&str> = self.property_names().collect();
        for key in &properties {
            if !is_prefixed_property_key(key) {
                return Err(invalid(format!(
                    "property '{key}' is not of the form <location>__<name>"
                )));
            }
        }

        let required: HashSet<&str> = self.required_names().collect();
        if let Some(missing) = required.iter().find(|r| !properties.contains(*r)) {
            return Err(invalid(format!(
                "required name '{missing}' has no matching property"
            )));
        }

        let placeholders = path_placeholders(&self.call_site.path).map_err(invalid)?;
        for placeholder in placeholders {
            let key = ParamLocation::Path.prefixed(&placeholder);
            if !properties.contains(key.as_str()) || !required.contains(key.as_str()) {
                return Err(invalid(format!(
                    "path placeholder '{{{placeholder}}}' needs a required '{key}' property"
                )));
            }
        }

        Ok(())
    }
}

/// `^(path|query|header|cookie|body)__[^_].*$`
#[must_use]
pub fn is_prefixed_property_key(key: &str) -> bool {
    split_prefixed_key(key).is_some_and(|(_, name)| !name.starts_with('_'))
}

/// Extract `{placeholder}` names from a path template, in order of appearance.
///
/// # Errors
///
/// Returns a message when braces are unbalanced, nested, or enclose an empty name.
pub fn path_placeholders(template: &str) -> std::result::Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut current: Option<String> = None;

    for c in template.chars() {
        match (c, current.as_mut()) {
            ('{', None) => current = Some(String::new()),
            ('{', Some(_)) => {
                return Err(format!("nested '{{' in path template '{template}'"));
            }
            ('}', Some(name)) => {
                if name.is_empty() {
                    return Err(format!("empty placeholder in path template '{template}'"));
                }
                out.push(std::mem::take(name));
                current = None;
            }
            ('}', None) => {
                return Err(format!("unmatched '}}' in path template '{template}'"));
            }
            (c, Some(name)) => name.push(c),
            (_, None) => {}
        }
    }

    if current.is_some() {
        return Err(format!("unclosed '{{' in path template '{template}'"));
    }
    Ok(out)
}

/// Fields every source type carries in its `config` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedParams {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub config_only: bool,
    #[serde(default)]
    pub dev_mode: bool,
    /// Basename (without `.json`) for the persisted config.
    #[serde(default)]
    pub file: Option<String>,
    pub source_type: String,
}

impl SharedParams {
    #[must_use]
    pub fn new(source_type: &str) -> Self {
        Self {
            transport: Transport::default(),
            port: None,
            config_only: false,
            dev_mode: false,
            file: None,
            source_type: source_type.to_string(),
        }
    }

    /// Port for the HTTP transport, falling back to [`DEFAULT_HTTP_PORT`].
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_HTTP_PORT)
    }
}

/// Source-specific parameters stored under `config`.
///
/// Each source type provides one implementation; its `SOURCE_TYPE` is the persisted tag.
pub trait SourceParams:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    const SOURCE_TYPE: &'static str;

    fn shared(&self) -> &SharedParams;

    fn shared_mut(&mut self) -> &mut SharedParams;
}

/// The top-level catalog aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "C: DeserializeOwned"))]
pub struct App<C> {
    pub name: String,
    pub version: String,
    pub source_type: String,
    pub tools: Vec<ToolDescriptor>,
    pub config: C,
}

impl<C: SourceParams> App<C> {
    /// Assemble an app, checking that tool names are unique and every descriptor is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateToolName`] or [`CatalogError::InvalidDescriptor`].
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        tools: Vec<ToolDescriptor>,
        mut config: C,
    ) -> Result<Self> {
        C::SOURCE_TYPE.clone_into(&mut config.shared_mut().source_type);
        let app = Self {
            name: name.into(),
            version: version.into(),
            source_type: C::SOURCE_TYPE.to_string(),
            tools,
            config,
        };
        app.validate()?;
        Ok(app)
    }

    /// Check the aggregate invariants (tag/shape agreement, unique names, descriptor shape).
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.source_type != C::SOURCE_TYPE || self.config.shared().source_type != C::SOURCE_TYPE
        {
            return Err(CatalogError::ConfigDecode {
                origin: self.name.clone(),
                message: format!(
                    "sourceType '{}' (config: '{}') does not match '{}'",
                    self.source_type,
                    self.config.shared().source_type,
                    C::SOURCE_TYPE
                ),
            });
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(CatalogError::DuplicateToolName {
                    name: tool.name.clone(),
                });
            }
            tool.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn shared(&self) -> &SharedParams {
        self.config.shared()
    }

    #[must_use]
    pub fn transport(&self) -> Transport {
        self.shared().transport
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}
