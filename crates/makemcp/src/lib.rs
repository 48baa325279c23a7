//! `makemcp`: serve an `OpenAPI` 3.x API as an MCP server.
//!
//! The binary is a thin shell over this library so integration tests can drive the same code.

pub mod cli;
pub mod logging;
pub mod run;
pub mod server;

pub use server::McpServer;
