use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogDestination;

/// Follow code-generation jobs stage by stage and collect their files.
#[derive(Debug, Parser)]
#[command(name = "stagewatch", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Config file (default: ./stagewatch.ron if it exists).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the generation service.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Directory for archives and job history.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Follow jobs by polling only.
    #[arg(long, global = true)]
    pub no_push: bool,

    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    #[arg(long, value_enum, global = true)]
    pub log: Option<LogDestination>,

    /// off, error, warn, info, debug or trace.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Build the zip archive once the files are available.
    #[arg(long)]
    pub archive: bool,

    /// Print the content of every generated file.
    #[arg(long)]
    pub preview: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a prompt and follow the job until it finishes.
    Submit {
        prompt: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Follow a job that was submitted earlier.
    Watch {
        job_id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Normalize a saved result payload (a raw result or a whole job-status response).
    Normalize {
        payload: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List finished jobs recorded in the output directory.
    History,
}
