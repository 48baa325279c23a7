//! HTTP semantics helpers.
//!
//! The main use-case today is generating tool annotations for HTTP-backed tools based on
//! RFC 9110-style method semantics.

use makemcp_core::ToolAnnotations;

/// Phrase in an operation description that marks the tool as interacting with an open world.
const OPEN_WORLD_PHRASE: &str = "open world";

/// Generate tool annotations based on HTTP method semantics.
///
/// Notes:
/// - Only hints that follow from the method are set; everything else stays absent.
/// - `openWorldHint` is only set when `description` mentions "open world" (any case).
/// - `title` is left for the caller.
#[must_use]
pub fn annotations_for_method(method: &str, description: Option<&str>) -> ToolAnnotations {
    let mut annotations = match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" | "OPTIONS" => ToolAnnotations {
            read_only_hint: Some(true),
            idempotent_hint: Some(true),
            ..ToolAnnotations::default()
        },
        "PUT" => ToolAnnotations {
            idempotent_hint: Some(true),
            ..ToolAnnotations::default()
        },
        "DELETE" => ToolAnnotations {
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
            ..ToolAnnotations::default()
        },
        // POST and PATCH may or may not be idempotent or destructive; do not guess.
        _ => ToolAnnotations::default(),
    };

    if description.is_some_and(mentions_open_world) {
        annotations.open_world_hint = Some(true);
    }
    annotations
}

fn mentions_open_world(description: &str) -> bool {
    description.to_lowercase().contains(OPEN_WORLD_PHRASE)
}

/// Methods that never carry a request body in the dispatcher.
#[must_use]
pub fn method_omits_body(method: &reqwest::Method) -> bool {
    method == reqwest::Method::GET || method == reqwest::Method::DELETE
}
