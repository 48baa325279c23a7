//! Shared tool catalog model for makemcp.
//!
//! This crate owns the source-agnostic pieces:
//! - the persisted [`App`] / [`ToolDescriptor`] model,
//! - handler binding ([`BoundTool`], [`RunnableApp`]),
//! - JSON persistence and the `sourceType` adapter registry.

pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod model;
pub mod persist;
pub mod registry;

pub use error::{CatalogError, Result, ToolCallError};
pub use handler::{BoundTool, RunnableApp, RuntimeOptions, ToolHandler};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use model::{
    App, CallSite, DEFAULT_HTTP_PORT, LOCATION_SEPARATOR, ParamLocation, ParamsByLocation,
    SharedParams, SourceParams, ToolAnnotations, ToolDescriptor, Transport, path_placeholders,
    split_prefixed_key,
};
pub use registry::{SourceAdapter, SourceRegistry};
