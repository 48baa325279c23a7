//! Tool catalog builder: one [`ToolDescriptor`] per `OpenAPI` operation.

use crate::description::{ParamDoc, synthesize};
use crate::error::{OpenApiToolsError, Result};
use crate::loader::LoadedSpec;
use crate::resolver::OpenApiResolver;
use makemcp_core::{
    CallSite, CatalogError, ParamLocation, ParamsByLocation, ToolDescriptor, path_placeholders,
};
use makemcp_http_tools::runtime::OPAQUE_BODY_ARG;
use makemcp_http_tools::semantics::annotations_for_method;
use mime::Mime;
use openapiv3::{
    Operation, Parameter, ParameterSchemaOrContent, ReferenceOr, RequestBody, Schema, SchemaKind,
    Type,
};
use rmcp::model::JsonObject;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};

/// Build descriptors for every operation in the document, in order.
///
/// # Errors
///
/// Returns `CatalogError::DuplicateToolName` (wrapped) when two operations derive the same name,
/// or [`OpenApiToolsError::CatalogBuild`] for structural problems (unbalanced path braces,
/// unresolvable references).
pub fn build_catalog(spec: &LoadedSpec) -> Result<Vec<ToolDescriptor>> {
    let resolver = OpenApiResolver::new(&spec.raw);
    let mut tools: Vec<ToolDescriptor> = Vec::new();
    let mut names: HashSet<String> = HashSet::new();

    for (path, item) in &spec.openapi.paths.paths {
        let path_item = resolver.resolve_path_item(item)?;

        let methods = [
            ("get", &path_item.get),
            ("put", &path_item.put),
            ("post", &path_item.post),
            ("delete", &path_item.delete),
            ("options", &path_item.options),
            ("head", &path_item.head),
            ("patch", &path_item.patch),
            ("trace", &path_item.trace),
        ];

        for (method, operation) in methods {
            let Some(operation) = operation else {
                continue;
            };

            let input = OperationInput {
                path,
                method,
                operation,
                path_item_params: &path_item.parameters,
                fragment: operation_fragment(&spec.raw, path, method, operation),
            };
            let tool = build_descriptor(&resolver, &input)?;

            if !names.insert(tool.name.clone()) {
                return Err(CatalogError::DuplicateToolName { name: tool.name }.into());
            }
            tracing::debug!(
                tool = %tool.name,
                method = %tool.call_site.method,
                path = %tool.call_site.path,
                "Derived tool"
            );
            tools.push(tool);
        }
    }

    tracing::info!(
        spec = %spec.location,
        tools = tools.len(),
        "Built tool catalog from OpenAPI spec"
    );
    Ok(tools)
}

struct OperationInput<'a> {
    path: &'a str,
    method: &'a str,
    operation: &'a Operation,
    path_item_params: &'a [ReferenceOr<Parameter>],
    fragment: Value,
}

/// Name rule: `operationId` when set, else `{METHOD}_{path}` with the path verbatim.
#[must_use]
pub fn derive_tool_name(method: &str, path: &str, operation_id: Option<&str>) -> String {
    match operation_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => format!("{}_{path}", method.to_ascii_uppercase()),
    }
}

/// Accumulates input-schema properties, `required` names and description entries.
#[derive(Default)]
struct SchemaBuilder {
    properties: JsonObject,
    required: Vec<String>,
    by_location: ParamsByLocation,
    docs: Vec<ParamDoc>,
}

impl SchemaBuilder {
    fn contains(&self, location: ParamLocation, name: &str) -> bool {
        self.properties.contains_key(&location.prefixed(name))
    }

    fn add(
        &mut self,
        location: ParamLocation,
        name: &str,
        ty: &str,
        description: Option<&str>,
        required: bool,
    ) {
        let key = location.prefixed(name);
        let mut prop = json!({"type": ty, "location": location.as_str()});
        if let Some(d) = description.filter(|d| !d.trim().is_empty()) {
            prop["description"] = json!(d);
        }
        self.properties.insert(key.clone(), prop);
        if required && !self.required.contains(&key) {
            self.required.push(key);
        }
        self.by_location.push(location, name);
        self.docs.push(ParamDoc {
            location,
            name: name.to_string(),
            required,
            description: description.map(str::to_string),
        });
    }

    fn input_schema(&self) -> JsonObject {
        let mut schema = JsonObject::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone()),
        );
        schema.insert("required".to_string(), json!(self.required));
        schema
    }
}

fn build_descriptor(resolver: &OpenApiResolver<'_>, input: &OperationInput<'_>) -> Result<ToolDescriptor> {
    let op = input.operation;
    let name = derive_tool_name(input.method, input.path, op.operation_id.as_deref());
    let build_error = |message: String| {
        OpenApiToolsError::CatalogBuild(format!(
            "{} {}: {message}",
            input.method.to_ascii_uppercase(),
            input.path
        ))
    };
    let placeholders = path_placeholders(input.path).map_err(&build_error)?;

    let mut builder = SchemaBuilder::default();

    for param in merge_parameters(resolver, input.path_item_params, &op.parameters)? {
        let (location, data) = match &param {
            Parameter::Path { parameter_data, .. } => (ParamLocation::Path, parameter_data),
            Parameter::Query { parameter_data, .. } => (ParamLocation::Query, parameter_data),
            Parameter::Header { parameter_data, .. } => (ParamLocation::Header, parameter_data),
            Parameter::Cookie { parameter_data, .. } => (ParamLocation::Cookie, parameter_data),
        };
        // Template placeholders are always required, whatever the document says.
        let required = data.required
            || (location == ParamLocation::Path && placeholders.contains(&data.name));
        let ty = parameter_type(resolver, &data.format)?;
        builder.add(
            location,
            &data.name,
            &ty,
            data.description.as_deref(),
            required,
        );
    }

    for placeholder in &placeholders {
        if !builder.contains(ParamLocation::Path, placeholder) {
            builder.add(ParamLocation::Path, placeholder, "string", None, true);
        }
    }

    let (body_content_type, opaque_body) = match &op.request_body {
        Some(body) => {
            let body = resolver.resolve_request_body(body)?;
            add_body(resolver, &body, &mut builder)?
        }
        None => (None, false),
    };

    // `{location}___name` keys are ambiguous, so such names cannot become arguments.
    if let Some(doc) = builder.docs.iter().find(|d| d.name.starts_with('_')) {
        return Err(build_error(format!(
            "{} parameter '{}' starts with '_' and cannot be exposed as a tool argument",
            doc.location, doc.name
        )));
    }

    let input_schema = builder.input_schema();
    let description = synthesize(
        op.summary.as_deref(),
        op.description.as_deref(),
        &builder.docs,
        &input_schema,
    );

    let mut annotations = annotations_for_method(input.method, op.description.as_deref());
    annotations.title = Some(
        op.summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&name)
            .to_string(),
    );

    Ok(ToolDescriptor {
        name,
        description,
        input_schema,
        annotations,
        call_site: CallSite {
            method: input.method.to_ascii_uppercase(),
            path: input.path.to_string(),
            params_by_location: builder.by_location,
            body_content_type,
            opaque_body,
        },
        source_fragment: input.fragment.clone(),
    })
}

/// Path-item parameters first, then operation parameters; the operation wins on `(in, name)`.
fn merge_parameters(
    resolver: &OpenApiResolver<'_>,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<Parameter>> {
    fn key_for(p: &Parameter) -> (&'static str, String) {
        match p {
            Parameter::Path { parameter_data, .. } => ("path", parameter_data.name.clone()),
            Parameter::Query { parameter_data, .. } => ("query", parameter_data.name.clone()),
            Parameter::Header { parameter_data, .. } => ("header", parameter_data.name.clone()),
            Parameter::Cookie { parameter_data, .. } => ("cookie", parameter_data.name.clone()),
        }
    }

    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let rp = resolver.resolve_parameter(p)?;
        let k = key_for(&rp);
        if let Some(i) = index.get(&k).copied() {
            merged[i] = rp;
        } else {
            index.insert(k, merged.len());
            merged.push(rp);
        }
    }

    Ok(merged)
}

fn parameter_type(
    resolver: &OpenApiResolver<'_>,
    format: &ParameterSchemaOrContent,
) -> Result<String> {
    let schema = match format {
        ParameterSchemaOrContent::Schema(schema) => Some(schema.clone()),
        ParameterSchemaOrContent::Content(content) => {
            content.values().next().and_then(|m| m.schema.clone())
        }
    };
    match schema {
        Some(schema) => Ok(schema_type(&resolver.resolve_schema(&schema)?.item).to_string()),
        None => Ok("string".to_string()),
    }
}

/// JSON-schema `type` of an `OpenAPI` schema, `"string"` when the schema does not say.
fn schema_type(schema: &Schema) -> &str {
    match &schema.schema_kind {
        SchemaKind::Type(Type::String(_)) => "string",
        SchemaKind::Type(Type::Number(_)) => "number",
        SchemaKind::Type(Type::Integer(_)) => "integer",
        SchemaKind::Type(Type::Boolean(_)) => "boolean",
        SchemaKind::Type(Type::Array(_)) => "array",
        SchemaKind::Type(Type::Object(_)) | SchemaKind::AllOf { .. } => "object",
        SchemaKind::Any(any) => match any.typ.as_deref() {
            Some(t) => t,
            None if !any.properties.is_empty() => "object",
            None => "string",
        },
        _ => "string",
    }
}

type ObjectShape = (Vec<(String, ReferenceOr<Box<Schema>>)>, Vec<String>);

/// Object properties (in schema order) and required names, if `schema` is an object with
/// properties. `allOf` members are merged.
fn object_shape(resolver: &OpenApiResolver<'_>, schema: &Schema) -> Result<Option<ObjectShape>> {
    let shape = match &schema.schema_kind {
        SchemaKind::Type(Type::Object(obj)) => Some((
            obj.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            obj.required.clone(),
        )),
        SchemaKind::Any(any) if any.typ.as_deref().is_none_or(|t| t == "object") => Some((
            any.properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            any.required.clone(),
        )),
        SchemaKind::AllOf { all_of } => {
            let mut props: Vec<(String, ReferenceOr<Box<Schema>>)> = Vec::new();
            let mut required: Vec<String> = Vec::new();
            for member in all_of {
                let member = resolver.resolve_schema(member)?.item;
                let Some((p, r)) = object_shape(resolver, &member)? else {
                    return Ok(None);
                };
                for (name, prop) in p {
                    props.retain(|(n, _)| *n != name);
                    props.push((name, prop));
                }
                for name in r {
                    if !required.contains(&name) {
                        required.push(name);
                    }
                }
            }
            Some((props, required))
        }
        _ => None,
    };
    Ok(shape.filter(|(props, _)| !props.is_empty()))
}

fn is_json_media_type(media_type: &str) -> bool {
    media_type.parse::<Mime>().is_ok_and(|m| {
        m.type_() == mime::APPLICATION
            && (m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON))
    })
}

/// Add body properties; returns `(bodyContentType, opaqueBody)`.
fn add_body(
    resolver: &OpenApiResolver<'_>,
    body: &RequestBody,
    builder: &mut SchemaBuilder,
) -> Result<(Option<String>, bool)> {
    let json_media = body
        .content
        .iter()
        .find(|(media_type, _)| is_json_media_type(media_type));

    if let Some((media_type, media)) = json_media
        && let Some(schema_ref) = &media.schema
    {
        let resolved = resolver.resolve_schema(schema_ref)?;
        if let Some((props, required)) = object_shape(resolver, &resolved.item)? {
            for (name, prop_ref) in &props {
                let (ty, description) = body_property(resolver, prop_ref, &resolved.trail)?;
                builder.add(
                    ParamLocation::Body,
                    name,
                    &ty,
                    description.as_deref(),
                    required.contains(name),
                );
            }
            return Ok((Some(media_type.clone()), false));
        }
    }

    // Anything else travels as one opaque payload.
    let media_type = json_media
        .map(|(m, _)| m.clone())
        .or_else(|| body.content.keys().next().cloned());
    builder.add(
        ParamLocation::Body,
        OPAQUE_BODY_ARG,
        "string",
        body.description.as_deref(),
        body.required,
    );
    Ok((media_type, true))
}

/// Type and description for one body property. A property that refers back into the schema
/// being flattened becomes an opaque `object`.
fn body_property(
    resolver: &OpenApiResolver<'_>,
    prop: &ReferenceOr<Box<Schema>>,
    parent_trail: &HashSet<String>,
) -> Result<(String, Option<String>)> {
    if let ReferenceOr::Reference { reference } = prop
        && parent_trail.contains(reference)
    {
        return Ok(("object".to_string(), None));
    }

    let resolved = resolver.resolve_boxed_schema(prop)?;
    if !resolved.trail.is_disjoint(parent_trail) {
        return Ok(("object".to_string(), None));
    }
    Ok((
        schema_type(&resolved.item).to_string(),
        resolved.item.schema_data.description.clone(),
    ))
}

/// The operation as it appears in the raw document, or its typed form when the path item is
/// itself a `$ref`.
fn operation_fragment(raw: &Value, path: &str, method: &str, operation: &Operation) -> Value {
    raw.get("paths")
        .and_then(|paths| paths.get(path))
        .and_then(|item| item.get(method))
        .cloned()
        .unwrap_or_else(|| serde_json::to_value(operation).unwrap_or(Value::Null))
}
