pub mod board;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod edit;
pub mod filter;
pub mod git_status;
pub mod http;
pub mod render;
pub mod sync;
pub mod tags;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub async fn run(
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
    "starting taskdeck"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let base_url = cfg.base_url()?;
  let store = http::HttpTaskStore::new(
    &base_url,
    cfg.request_timeout()?
  )
  .with_context(|| {
    format!(
      "failed to set up client for \
       {base_url}"
    )
  })?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  let mut cache = cache::TaskCache::new();
  commands::dispatch(
    &store,
    &mut cache,
    &renderer,
    inv
  )
  .await?;

  info!("done");
  Ok(())
}
