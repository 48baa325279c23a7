//! Error types for `makemcp-openapi-tools`.

use makemcp_core::CatalogError;
use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {message}")]
    SpecParse { location: String, message: String },

    /// The document is not `OpenAPI` 3.x (e.g. Swagger 2.0, or no `openapi` field at all).
    #[error("OpenAPI error: unsupported document '{location}': {message}")]
    SpecUnsupported { location: String, message: String },

    /// A `$ref` is unresolvable, external, or part of a reference cycle.
    #[error("OpenAPI error: bad $ref in '{location}': {message}")]
    SpecRef { location: String, message: String },

    /// The spec violates an assumption the catalog builder relies on.
    #[error("Catalog build error: {0}")]
    CatalogBuild(String),

    /// No usable base URL (none given, none in `servers`, or not absolute).
    #[error("Invalid base URL: {0}")]
    BaseUrl(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl OpenApiToolsError {
    /// Whether this is one of the spec-loading failures.
    #[must_use]
    pub fn is_spec_load(&self) -> bool {
        matches!(
            self,
            Self::SpecFetch { .. }
                | Self::SpecReadFile { .. }
                | Self::SpecParse { .. }
                | Self::SpecUnsupported { .. }
                | Self::SpecRef { .. }
        )
    }
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
