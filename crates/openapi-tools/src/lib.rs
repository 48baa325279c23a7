//! `OpenAPI` 3.x to MCP tooling.
//!
//! - [`loader`]: read and parse a spec from a file or URL
//! - [`resolver`]: local `$ref` resolution with cycle detection
//! - [`catalog`]: derive one tool descriptor per operation
//! - [`adapter`]: the `openapi` source type (build, decode, attach handlers)

pub mod adapter;
pub mod catalog;
pub mod description;
pub mod error;
pub mod loader;
pub mod resolver;

pub use adapter::{
    OpenApiApp, OpenApiParams, OpenApiSource, SOURCE_TYPE, attach_handlers, build_from_loaded,
    build_from_spec, register, resolve_base_url,
};
pub use catalog::{build_catalog, derive_tool_name};
pub use error::{OpenApiToolsError, Result};
pub use loader::{LoadedSpec, SpecLocation, load_spec, parse_spec};
