//! `stagewatch.ron` configuration file and its merge with command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use stagewatch_core::{ClassifierConfig, StageWeights};
use stagewatch_engine::{ApiSettings, EngineConfig};

use crate::cli::GlobalArgs;
use crate::logging::LogDestination;

pub const DEFAULT_CONFIG_FILE: &str = "stagewatch.ron";
const DEFAULT_OUTPUT_DIR: &str = "stagewatch-output";

/// Contents of the config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub push_enabled: Option<bool>,
    pub keepalive_secs: Option<u64>,
    pub infer_unattributed: Option<bool>,
    /// Planning, backend, frontend, testing, deployment; must sum to 100.
    pub stage_weights: Option<StageWeights>,
    pub output_dir: Option<PathBuf>,
    pub log: Option<LogDestination>,
    pub log_level: Option<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub engine: EngineConfig,
    pub output_dir: PathBuf,
    pub log: LogDestination,
    pub log_level: LevelFilter,
}

/// Reads the config file named on the command line, or `stagewatch.ron` if present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(err) => return Err(err).with_context(|| format!("reading config file {}", path.display())),
    };
    parse_file_config(&content).with_context(|| format!("parsing config file {}", path.display()))
}

pub fn parse_file_config(content: &str) -> Result<FileConfig> {
    Ok(ron::from_str(content)?)
}

/// Applies command-line overrides on top of the file values and the built-in defaults.
pub fn resolve(file: FileConfig, args: &GlobalArgs) -> Result<AppSettings> {
    let defaults = ApiSettings::default();
    let api = ApiSettings {
        base_url: args.api_url.clone().or(file.api_url).unwrap_or(defaults.base_url),
        connect_timeout: file
            .connect_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout),
        request_timeout: file
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
    };

    let engine_defaults = EngineConfig::default();
    let poll_interval = args
        .poll_interval_ms
        .or(file.poll_interval_ms)
        .map(Duration::from_millis)
        .unwrap_or(engine_defaults.poll_interval);
    if poll_interval.is_zero() {
        bail!("poll interval must be greater than zero");
    }
    let keepalive_interval = file
        .keepalive_secs
        .map(Duration::from_secs)
        .unwrap_or(engine_defaults.keepalive_interval);
    if keepalive_interval.is_zero() {
        bail!("keepalive interval must be greater than zero");
    }

    let log_level = match args.log_level.as_deref().or(file.log_level.as_deref()) {
        Some(raw) => LevelFilter::from_str(raw).with_context(|| format!("unknown log level {raw:?}"))?,
        None => LevelFilter::Info,
    };

    let engine = EngineConfig {
        api,
        poll_interval,
        push_enabled: !args.no_push && file.push_enabled.unwrap_or(engine_defaults.push_enabled),
        keepalive_interval,
        classifier: ClassifierConfig {
            infer_unattributed: file
                .infer_unattributed
                .unwrap_or(engine_defaults.classifier.infer_unattributed),
        },
        weights: file.stage_weights.unwrap_or_default(),
        clock: Arc::new(|| chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
    };

    Ok(AppSettings {
        engine,
        output_dir: args
            .output_dir
            .clone()
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        log: args.log.or(file.log).unwrap_or_default(),
        log_level,
    })
}
