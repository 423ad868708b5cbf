use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use stagewatch_core::{ClassifierConfig, JobStatusReport, RawEvent, StageWeights};
use thiserror::Error;

/// Failure talking to the job HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Failure of the push transport. Never fatal to a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("could not open push channel: {0}")]
    Connect(String),
    #[error("push transport failed: {0}")]
    Transport(String),
    #[error("push protocol error: {0}")]
    Protocol(String),
}

/// What the Ingestion Channel Manager emits, merged from push and poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Raw(RawEvent),
    Polled(JobStatusReport),
    PushDegraded { reason: String },
    /// Both channels have stopped; nothing follows.
    Closed,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct EngineConfig {
    pub api: ApiSettings,
    pub poll_interval: Duration,
    pub push_enabled: bool,
    /// How often the push channel sends a keepalive ping.
    pub keepalive_interval: Duration,
    pub classifier: ClassifierConfig,
    pub weights: StageWeights,
    /// Produces RFC 3339 timestamps for job creation times.
    pub clock: Clock,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            poll_interval: Duration::from_millis(2500),
            push_enabled: true,
            keepalive_interval: Duration::from_secs(20),
            classifier: ClassifierConfig::default(),
            weights: StageWeights::default(),
            clock: Arc::new(|| String::new()),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api", &self.api)
            .field("poll_interval", &self.poll_interval)
            .field("push_enabled", &self.push_enabled)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("classifier", &self.classifier)
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}
