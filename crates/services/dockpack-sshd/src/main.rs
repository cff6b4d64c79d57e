//! `dockpack-sshd` binary entrypoint: loads configuration, installs the
//! tracing subscriber, and runs the process supervisor (C10) to
//! completion.

use anyhow::Result;
use dockpack_common::AppConfig;
use dockpack_common::tracing_setup::setup_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing(false);
    let config = AppConfig::load()?;
    dockpack_sshd::supervisor::run(config).await
}
