mod cli;
mod commands;
mod config;
mod logging;
mod persistence;
mod render;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = config::load_file_config(cli.global.config.as_deref())?;
    let settings = config::resolve(file, &cli.global)?;
    logging::initialize(settings.log, settings.log_level);

    match cli.command {
        Command::Normalize { payload, output } => commands::normalize(&settings, &payload, &output),
        Command::History => commands::history(&settings),
        Command::Submit { prompt, output } => {
            runtime()?.block_on(commands::submit(&settings, prompt, &output))
        }
        Command::Watch { job_id, output } => {
            runtime()?.block_on(commands::watch(&settings, job_id, &output))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the async runtime")
}
