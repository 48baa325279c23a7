//! Subcommand drivers: build or load an app, walk it through its lifecycle, serve it.

use crate::cli::{Command, LoadArgs, OpenApiArgs};
use crate::server;
use anyhow::Context as _;
use makemcp_core::persist::save_app;
use makemcp_core::{Lifecycle, LifecycleState, RunnableApp, SourceRegistry, registry};
use makemcp_openapi_tools::{attach_handlers, build_from_spec};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Register every built-in source adapter with the process-wide registry.
pub fn register_sources() -> &'static SourceRegistry {
    let registry = registry::global();
    makemcp_openapi_tools::register(registry);
    registry
}

/// Run one subcommand to completion.
///
/// # Errors
///
/// Any build, persistence, load or serving failure.
pub async fn run(command: &Command, shutdown: CancellationToken) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    match command {
        Command::Openapi(args) => run_openapi(args, &cwd, shutdown).await,
        Command::Load(args) => run_load(args, register_sources(), shutdown).await,
    }
}

/// `openapi`: build the catalog, persist it if asked, then serve unless `--config-only`.
///
/// # Errors
///
/// Any build, persistence or serving failure. The lifecycle ends in `Failed`.
pub async fn run_openapi(
    args: &OpenApiArgs,
    out_dir: &Path,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut lifecycle = Lifecycle::new(args.specs.clone());
    let outcome = openapi_steps(args, out_dir, &mut lifecycle, shutdown).await;
    if let Err(e) = &outcome {
        lifecycle.fail(e);
    }
    outcome.map(|_| ())
}

/// Returns the config path when one was written.
async fn openapi_steps(
    args: &OpenApiArgs,
    out_dir: &Path,
    lifecycle: &mut Lifecycle,
    shutdown: CancellationToken,
) -> anyhow::Result<Option<PathBuf>> {
    let app = build_from_spec(&args.specs, args.base_url.as_deref(), args.shared_params())
        .await
        .with_context(|| format!("build tools from '{}'", args.specs))?;
    lifecycle.set_app(app.name.clone());
    lifecycle.advance(LifecycleState::CatalogBuilt);

    let mut saved = None;
    if args.persists() {
        let path = save_app(&app, out_dir).context("save config")?;
        lifecycle.advance(LifecycleState::Persisted);
        if args.config_only {
            // Nothing is served, so stdout is free for the result.
            println!("{}", path.display());
            lifecycle.advance(LifecycleState::Stopped);
            return Ok(Some(path));
        }
        saved = Some(path);
    }

    let runnable = attach_handlers(&app, &args.runtime_options()).context("attach handlers")?;
    lifecycle.advance(LifecycleState::HandlersAttached);
    serve(runnable, lifecycle, shutdown).await?;
    Ok(saved)
}

/// `load`: rehydrate a saved config through the registry and serve it.
///
/// # Errors
///
/// Unknown source type, decode failures, or serving failures.
pub async fn run_load(
    args: &LoadArgs,
    registry: &SourceRegistry,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut lifecycle = Lifecycle::new(args.config.display().to_string());
    let outcome = async {
        let runnable = registry
            .load_file(&args.config, &args.runtime_options())
            .with_context(|| format!("load config '{}'", args.config.display()))?;
        lifecycle.set_app(runnable.name.clone());
        lifecycle.advance(LifecycleState::CatalogBuilt);
        lifecycle.advance(LifecycleState::HandlersAttached);
        serve(runnable, &mut lifecycle, shutdown).await
    }
    .await;
    if let Err(e) = &outcome {
        lifecycle.fail(e);
    }
    outcome
}

async fn serve(
    app: RunnableApp,
    lifecycle: &mut Lifecycle,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    lifecycle.advance(LifecycleState::Serving);
    server::serve(app, shutdown).await?;
    lifecycle.advance(LifecycleState::Stopped);
    Ok(())
}
