//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not automatically resolve
//! them. Only local refs (`#/...`) are supported; the loader has already rejected external ones.
//!
//! Resolution follows `$ref` chains and tracks every reference visited, so callers can tell when
//! a nested schema points back at something already on the resolution path.

use crate::error::{OpenApiToolsError, Result};
use crate::loader::lookup_local_ref;
use openapiv3::{Parameter, PathItem, ReferenceOr, RequestBody, Schema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

/// A resolved item and the `$ref`s followed to reach it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub item: T,
    pub trail: HashSet<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct OpenApiResolver<'a> {
    root: &'a Value,
}

impl<'a> OpenApiResolver<'a> {
    /// Create a resolver over the raw (normalised) document tree.
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Resolve a `$ref` for a parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub fn resolve_parameter(&self, param: &ReferenceOr<Parameter>) -> Result<Parameter> {
        self.resolve_reference_or(param).map(|r| r.item)
    }

    /// Resolve a `$ref` for a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub fn resolve_request_body(&self, body: &ReferenceOr<RequestBody>) -> Result<RequestBody> {
        self.resolve_reference_or(body).map(|r| r.item)
    }

    /// Resolve a `$ref` for a schema, keeping the trail of references followed.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub fn resolve_schema(&self, schema: &ReferenceOr<Schema>) -> Result<Resolved<Schema>> {
        self.resolve_reference_or(schema)
    }

    /// Resolve a boxed schema reference (as used for object properties and array items).
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub fn resolve_boxed_schema(
        &self,
        schema: &ReferenceOr<Box<Schema>>,
    ) -> Result<Resolved<Schema>> {
        match schema {
            ReferenceOr::Item(s) => Ok(Resolved {
                item: (**s).clone(),
                trail: HashSet::new(),
            }),
            ReferenceOr::Reference { reference } => {
                self.resolve_reference_or::<Schema>(&ReferenceOr::Reference {
                    reference: reference.clone(),
                })
            }
        }
    }

    /// Resolve a `$ref` for a path item.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub fn resolve_path_item(&self, item: &ReferenceOr<PathItem>) -> Result<PathItem> {
        self.resolve_reference_or(item).map(|r| r.item)
    }

    fn resolve_reference_or<T>(&self, r: &ReferenceOr<T>) -> Result<Resolved<T>>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(Resolved { item, trail: seen }),
                ReferenceOr::Reference { reference } => {
                    if !seen.insert(reference.clone()) {
                        return Err(OpenApiToolsError::CatalogBuild(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let value = lookup_local_ref(self.root, &reference)
                        .map_err(OpenApiToolsError::CatalogBuild)?;
                    cur = serde_json::from_value(value.clone()).map_err(|e| {
                        OpenApiToolsError::CatalogBuild(format!(
                            "Failed to deserialize referenced value '{reference}' as expected type: {e}"
                        ))
                    })?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "components": {
                "parameters": {
                    "Q": {"name": "q", "in": "query", "schema": {"type": "string"}},
                    "Alias": {"$ref": "#/components/parameters/Q"}
                },
                "schemas": {
                    "Loop1": {"$ref": "#/components/schemas/Loop2"},
                    "Loop2": {"$ref": "#/components/schemas/Loop1"},
                    "User": {"type": "object", "properties": {"name": {"type": "string"}}}
                }
            }
        })
    }

    #[test]
    fn follows_reference_chains() {
        let root = doc();
        let resolver = OpenApiResolver::new(&root);
        let p = resolver
            .resolve_parameter(&ReferenceOr::ref_("#/components/parameters/Alias"))
            .unwrap();
        assert_eq!(p.parameter_data_ref().name, "q");
    }

    #[test]
    fn trail_records_followed_refs() {
        let root = doc();
        let resolver = OpenApiResolver::new(&root);
        let s = resolver
            .resolve_schema(&ReferenceOr::ref_("#/components/schemas/User"))
            .unwrap();
        assert!(s.trail.contains("#/components/schemas/User"));

        let inline = resolver
            .resolve_schema(&ReferenceOr::Item(s.item.clone()))
            .unwrap();
        assert!(inline.trail.is_empty());
    }

    #[test]
    fn cycles_are_errors() {
        let root = doc();
        let resolver = OpenApiResolver::new(&root);
        let err = resolver
            .resolve_schema(&ReferenceOr::ref_("#/components/schemas/Loop1"))
            .unwrap_err();
        assert!(err.to_string().contains("Cyclic $ref"));
    }

    #[test]
    fn dangling_refs_are_errors() {
        let root = doc();
        let resolver = OpenApiResolver::new(&root);
        assert!(
            resolver
                .resolve_request_body(&ReferenceOr::ref_("#/components/requestBodies/Nope"))
                .is_err()
        );
    }
}
