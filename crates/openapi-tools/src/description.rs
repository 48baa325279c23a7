//! Tool description synthesis.
//!
//! Layout, sections separated by blank lines:
//! summary, description, one block per parameter location, an example input, and a closing line
//! on the `location__name` argument convention.

use makemcp_core::ParamLocation;
use rmcp::model::JsonObject;
use serde_json::{Map, Value, json};

const PREFIX_HINT: &str = "Arguments are named location__name, where location is path, query, \
header, cookie or body and name is the upstream parameter name (e.g. path__id, query__limit).";

/// One documented parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDoc {
    pub location: ParamLocation,
    pub name: String,
    pub required: bool,
    pub description: Option<String>,
}

/// Assemble the description for a tool.
#[must_use]
pub fn synthesize(
    summary: Option<&str>,
    description: Option<&str>,
    params: &[ParamDoc],
    input_schema: &JsonObject,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(summary) = non_empty(summary) {
        sections.push(summary.to_string());
    }
    if let Some(description) = non_empty(description) {
        sections.push(description.replace('\n', "\n\n"));
    }

    for location in ParamLocation::ALL {
        let lines: Vec<String> = params
            .iter()
            .filter(|p| p.location == location)
            .map(param_line)
            .collect();
        if !lines.is_empty() {
            sections.push(format!("{}:\n{}", location.section_title(), lines.join("\n")));
        }
    }

    sections.push(format!("Example input:\n{}", example_input(input_schema)));
    sections.push(PREFIX_HINT.to_string());
    sections.join("\n\n")
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn param_line(p: &ParamDoc) -> String {
    let flag = if p.required { "Required" } else { "Optional" };
    match non_empty(p.description.as_deref()) {
        Some(d) => format!("- {} ({flag}): {}", p.name, d.replace('\n', " ")),
        None => format!("- {} ({flag})", p.name),
    }
}

/// Pretty JSON object with a type-shaped placeholder for every schema property.
#[must_use]
pub fn example_input(input_schema: &JsonObject) -> String {
    let example: Map<String, Value> = input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(key, prop)| {
                    let ty = prop.get("type").and_then(Value::as_str).unwrap_or("string");
                    (key.clone(), placeholder_for(ty))
                })
                .collect()
        })
        .unwrap_or_default();
    let example = Value::Object(example);
    serde_json::to_string_pretty(&example).unwrap_or_else(|_| example.to_string())
}

fn placeholder_for(ty: &str) -> Value {
    match ty {
        "integer" | "number" => json!(42),
        "boolean" => json!(true),
        "array" => json!([]),
        "object" => json!({}),
        _ => json!("example string"),
    }
}
