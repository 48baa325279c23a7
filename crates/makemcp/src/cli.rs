//! Command-line surface.

use crate::logging::LogFormat;
use clap::{Args, Parser, Subcommand};
use makemcp_core::{RuntimeOptions, SharedParams, Transport};
use makemcp_openapi_tools::SOURCE_TYPE as OPENAPI_SOURCE_TYPE;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "makemcp",
    version,
    about = "Turn an OpenAPI 3.x document into an MCP server",
    long_about = "Turn an OpenAPI 3.x document into an MCP server.\n\n\
                  Every operation becomes a tool that calls the upstream API. The derived tool \
                  catalog can be saved as JSON and served later with `makemcp load`."
)]
pub struct Cli {
    /// Log level or filter directive (`RUST_LOG` takes precedence).
    #[arg(long, global = true, env = "MAKEMCP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (logs go to stderr).
    #[arg(
        long,
        global = true,
        env = "MAKEMCP_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build tools from an OpenAPI document, optionally save them, and serve.
    Openapi(OpenApiArgs),
    /// Serve a previously saved tool catalog.
    Load(LoadArgs),
}

#[derive(Debug, Args)]
pub struct OpenApiArgs {
    /// Spec location: a file path or an http(s) URL.
    #[arg(long, env = "MAKEMCP_SPECS")]
    pub specs: String,

    /// Upstream base URL. Defaults to the document's first `servers` entry.
    #[arg(long, env = "MAKEMCP_BASE_URL")]
    pub base_url: Option<String>,

    /// MCP transport.
    #[arg(long, env = "MAKEMCP_TRANSPORT", default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Port for the http transport (default 8080).
    #[arg(long, env = "MAKEMCP_PORT")]
    pub port: Option<u16>,

    /// Write the config file and exit without serving.
    #[arg(long, env = "MAKEMCP_CONFIG_ONLY")]
    pub config_only: bool,

    /// Log every upstream request and response at info level.
    #[arg(long, env = "MAKEMCP_DEV_MODE")]
    pub dev_mode: bool,

    /// Config file basename; `.json` is appended. Setting it also saves the config.
    #[arg(long, env = "MAKEMCP_FILE")]
    pub file: Option<String>,

    #[command(flatten)]
    pub limits: LimitArgs,
}

impl OpenApiArgs {
    #[must_use]
    pub fn shared_params(&self) -> SharedParams {
        SharedParams {
            transport: self.transport,
            port: self.port,
            config_only: self.config_only,
            dev_mode: self.dev_mode,
            file: self.file.clone(),
            source_type: OPENAPI_SOURCE_TYPE.to_string(),
        }
    }

    /// Persist when asked to only write the config, or when a file name was chosen.
    #[must_use]
    pub fn persists(&self) -> bool {
        self.config_only || self.file.as_deref().is_some_and(|f| !f.trim().is_empty())
    }

    #[must_use]
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            transport: None,
            port: None,
            max_response_bytes: self.limits.max_response_bytes,
        }
    }
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Saved config file.
    pub config: PathBuf,

    /// Override the saved transport.
    #[arg(long, env = "MAKEMCP_TRANSPORT")]
    pub transport: Option<Transport>,

    /// Override the saved port.
    #[arg(long, env = "MAKEMCP_PORT")]
    pub port: Option<u16>,

    #[command(flatten)]
    pub limits: LimitArgs,
}

impl LoadArgs {
    #[must_use]
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            transport: self.transport,
            port: self.port,
            max_response_bytes: self.limits.max_response_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, Args)]
pub struct LimitArgs {
    /// Fail a tool call when the upstream response body exceeds this many bytes.
    #[arg(long, env = "MAKEMCP_MAX_RESPONSE_BYTES")]
    pub max_response_bytes: Option<usize>,
}
