pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod modal;
pub mod notify;
pub mod prefs;
pub mod reminder;
pub mod render;
pub mod runtime;
pub mod shell;
pub mod storage;
pub mod store;
pub mod task;
pub mod vdom;
pub mod view;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::{
  GarageError,
  Result
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskgarage"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.garagerc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let session = commands::Session {
    cfg:        &cfg,
    data_dir:   &data_dir,
    assume_yes: cli.yes
  };
  commands::dispatch(
    &session,
    cli
      .command
      .unwrap_or(cli::Command::Shell)
  )?;

  info!("done");
  Ok(())
}
