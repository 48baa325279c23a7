#![allow(dead_code)]

use anyhow::Context as _;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::time::Duration;

pub use makemcp_test_support::{EchoUpstream, KillOnDrop, write_fixture};

pub const USERS_SPEC: &str = include_str!("../fixtures/users.yaml");

pub fn pick_unused_port() -> anyhow::Result<u16> {
    makemcp_test_support::pick_unused_port()
}

pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    makemcp_test_support::wait_http_ok(url, timeout_dur).await
}

fn makemcp(cwd: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_makemcp"));
    cmd.current_dir(cwd)
        .env_remove("RUST_LOG")
        .arg("--log-level")
        .arg("info");
    cmd
}

/// `makemcp openapi ... --transport http --port <port>`, plus any extra flags.
pub fn spawn_openapi_http(
    cwd: &Path,
    spec: &Path,
    base_url: &str,
    port: u16,
    extra: &[&str],
) -> anyhow::Result<Child> {
    makemcp(cwd)
        .arg("openapi")
        .arg("--specs")
        .arg(spec)
        .arg("--base-url")
        .arg(base_url)
        .arg("--transport")
        .arg("http")
        .arg("--port")
        .arg(port.to_string())
        .args(extra)
        .stdout(Stdio::null())
        .spawn()
        .context("spawn makemcp openapi")
}

/// `makemcp load <config> --transport http --port <port>`.
pub fn spawn_load_http(cwd: &Path, config: &Path, port: u16) -> anyhow::Result<Child> {
    makemcp(cwd)
        .arg("load")
        .arg(config)
        .arg("--transport")
        .arg("http")
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::null())
        .spawn()
        .context("spawn makemcp load")
}

/// Run `makemcp` to completion with `args` and capture its output.
pub fn run_to_completion(cwd: &Path, args: &[&str]) -> anyhow::Result<Output> {
    makemcp(cwd).args(args).output().context("run makemcp")
}

pub async fn start_http(child: Child, port: u16) -> anyhow::Result<KillOnDrop> {
    let guard = KillOnDrop(child);
    wait_http_ok(
        &format!("http://127.0.0.1:{port}/health"),
        Duration::from_secs(20),
    )
    .await?;
    Ok(guard)
}
