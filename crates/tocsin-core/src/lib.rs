pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod filter;
pub mod notify;
pub mod reminder;
pub mod render;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::info;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;
    info!(verbose = cli.verbose, quiet = cli.quiet, "starting tocsin");

    let mut cfg = config::Config::load(cli.tocsinrc.as_deref())?;
    cfg.apply_overrides(
        cli.rc_overrides
            .into_iter()
            .map(|kv| (kv.key, kv.value)),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;
    let store = store::TaskStore::open(&data_dir)
        .with_context(|| format!("failed to open task store at {}", data_dir.display()))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(commands::dispatch(cli.command, &cfg, store))?;

    info!("done");
    Ok(())
}
