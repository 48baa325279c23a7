//! Error types for `makemcp-core`.

use thiserror::Error;

/// Errors raised while assembling, persisting or rehydrating a tool catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Two tools ended up with the same name.
    #[error("Duplicate tool name '{name}'")]
    DuplicateToolName { name: String },

    /// A descriptor violates the catalog invariants (prefixed keys, required path params).
    #[error("Invalid tool descriptor '{tool}': {reason}")]
    InvalidDescriptor { tool: String, reason: String },

    /// No source adapter is registered for the `sourceType` tag of a config file.
    #[error("Unknown source type '{0}' (no adapter registered)")]
    UnknownSourceType(String),

    /// The config file does not match the shape expected by its source adapter.
    #[error("Failed to decode config '{origin}': {message}")]
    ConfigDecode { origin: String, message: String },

    #[error("Failed to encode config: {0}")]
    ConfigEncode(#[source] serde_json::Error),

    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Source-specific failure while re-attaching handlers (e.g. unusable base URL).
    #[error("{source_type} source error: {message}")]
    Source {
        source_type: String,
        message: String,
    },
}

impl CatalogError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn decode(origin: &str, message: impl std::fmt::Display) -> Self {
        Self::ConfigDecode {
            origin: origin.to_string(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by a single tool invocation.
///
/// These never stop the server; they are reported back to the MCP client as a failed tool call.
#[derive(Error, Debug)]
pub enum ToolCallError {
    #[error("Missing path parameter '{name}' (pass it as 'path__{name}')")]
    MissingPathParam { name: String },

    #[error("Invalid argument '{key}': {message}")]
    ArgumentType { key: String, message: String },

    #[error("Failed to marshal request body: {0}")]
    Marshal(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response too large: {0}")]
    ResponseTooLarge(String),

    #[error("Tool call cancelled")]
    Cancelled,
}

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
