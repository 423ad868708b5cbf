use std::collections::BTreeMap;
use std::fmt;

use crate::{JobStatus, Stage};

/// Transport an event arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Push,
    Poll,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Push => f.write_str("push"),
            Channel::Poll => f.write_str("poll"),
        }
    }
}

/// Status string attached to a backend log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Running,
    Completed,
    Failed,
}

impl ReportedStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" | "in_progress" | "started" => Some(ReportedStatus::Running),
            "completed" | "complete" | "done" | "success" => Some(ReportedStatus::Completed),
            "failed" | "failure" | "error" => Some(ReportedStatus::Failed),
            _ => None,
        }
    }
}

/// Unclassified event as delivered by one of the channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub message: String,
    /// Agent or stage name as reported by the backend.
    pub agent: Option<String>,
    pub status: Option<ReportedStatus>,
    /// Explicit per-stage progress values keyed by the backend's stage names.
    pub progress: BTreeMap<String, u32>,
    /// Set only on the authoritative job-level terminal event.
    pub job_status: Option<JobStatus>,
    pub timestamp: Option<String>,
    pub channel: Channel,
}

impl RawEvent {
    pub fn new(channel: Channel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent: None,
            status: None,
            progress: BTreeMap::new(),
            job_status: None,
            timestamp: None,
            channel,
        }
    }

    /// The backend's final word on the job, e.g. from a completed/failed status poll.
    pub fn job_terminal(channel: Channel, status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            job_status: Some(status),
            ..Self::new(channel, message)
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_status(mut self, status: ReportedStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_progress(mut self, key: impl Into<String>, value: u32) -> Self {
        self.progress.insert(key.into(), value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Started,
    Thinking,
    Executing,
    PercentHint(u8),
    Completed,
    Failed,
}

impl SignalKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, SignalKind::Completed | SignalKind::Failed)
    }
}

/// Classified, stage-scoped status update. `stage == None` means the whole job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub stage: Option<Stage>,
    pub kind: SignalKind,
    pub raw_text: String,
    pub channel: Channel,
    /// Attributed by the unattributed-work fallback rather than by a stage mention.
    pub inferred: bool,
}

impl Signal {
    pub fn for_stage(stage: Stage, kind: SignalKind, event: &RawEvent) -> Self {
        Self {
            stage: Some(stage),
            kind,
            raw_text: event.message.clone(),
            channel: event.channel,
            inferred: false,
        }
    }

    pub fn for_job(kind: SignalKind, event: &RawEvent) -> Self {
        Self {
            stage: None,
            kind,
            raw_text: event.message.clone(),
            channel: event.channel,
            inferred: false,
        }
    }

    pub fn is_job_terminal(&self) -> bool {
        self.stage.is_none() && self.kind.is_terminal()
    }
}
