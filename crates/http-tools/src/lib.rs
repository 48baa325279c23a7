//! HTTP dispatch runtime for makemcp tools.
//!
//! Source adapters use this crate to turn a descriptor's call site into a handler:
//! - [`runtime`] shapes and executes upstream requests,
//! - [`semantics`] derives tool annotations from the HTTP method,
//! - [`safety`] holds outbound limits and error redaction.
//!
//! It intentionally knows nothing about `OpenAPI`.

pub mod runtime;
pub mod safety;
pub mod semantics;

pub use runtime::{HttpDispatcher, HttpToolsError, PreparedBody, PreparedRequest, build_request};
pub use safety::{OutboundLimits, RedirectPolicy};
