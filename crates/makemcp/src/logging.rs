//! Tracing setup.
//!
//! Logs always go to stderr: in stdio mode stdout belongs to the MCP protocol.

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _, fmt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Build the filter: `RUST_LOG` wins, else `level` (a level name or full directive string).
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(level: &str, format: LogFormat) {
    if INITIALIZED.set(()).is_err() {
        return;
    }

    let filter = env_filter(level);
    let layer = match format {
        LogFormat::Pretty => fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    };

    // Another subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directives_fall_back_to_info() {
        let filter = env_filter("not a [valid directive");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn init_is_idempotent() {
        init("debug", LogFormat::Json);
        init("info", LogFormat::Pretty);
    }
}
